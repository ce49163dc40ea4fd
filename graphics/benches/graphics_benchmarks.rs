use std::sync::Arc;

use ash::vk;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use ember_graphics::backend::conversion::{decompose_vk_format, get_vk_format, supported_formats};
use ember_graphics::sync::{AccessState, ResourceStateTracker, TextureAccess, TextureLayout};
use ember_graphics::types::PrimitiveType;
use ember_graphics::{
    Buffer, BufferDescriptor, BufferUsage, DeviceParameters, DummyBackend, GraphicsDevice,
    IndexFormat, ResourceId, Shader, ShaderDescriptor, ShaderReflection, ShaderStageSource,
    ShaderStages, Texture, TextureDescriptor, TextureFormat, TextureUsage,
};

struct Scene {
    device: Arc<GraphicsDevice>,
    backend: Arc<DummyBackend>,
    target: Arc<Texture>,
    albedo: Arc<Texture>,
    shader: Arc<Shader>,
    indices: Arc<Buffer>,
    vertices: Arc<Buffer>,
}

fn scene() -> Scene {
    let backend = Arc::new(DummyBackend::new());
    let device = GraphicsDevice::with_backend(backend.clone(), DeviceParameters::new()).unwrap();
    let target = device
        .create_texture(&TextureDescriptor::new_2d(
            1920,
            1080,
            TextureFormat::RGBA8_UNORM,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        ))
        .unwrap();
    let albedo = device
        .create_texture(&TextureDescriptor::new_2d(
            256,
            256,
            TextureFormat::RGBA8_UNORM,
            TextureUsage::TEXTURE_BINDING,
        ))
        .unwrap();
    let shader = device
        .create_shader(
            &ShaderDescriptor::new(
                ShaderReflection::new()
                    .with_texture("albedo", 0, 0, ShaderStages::FRAGMENT)
                    .with_fragment_output(0),
            )
            .with_stage(ShaderStageSource::vertex(vec![0u32; 5], "main"))
            .with_stage(ShaderStageSource::fragment(vec![0u32; 5], "main")),
        )
        .unwrap();
    let indices = device
        .create_buffer(&BufferDescriptor::new(1024, BufferUsage::INDEX))
        .unwrap();
    let vertices = device
        .create_buffer(&BufferDescriptor::new(4096, BufferUsage::VERTEX))
        .unwrap();
    Scene {
        device,
        backend,
        target,
        albedo,
        shader,
        indices,
        vertices,
    }
}

// ---------------------------------------------------------------------------
// Recording
// ---------------------------------------------------------------------------

fn bench_record_draws(c: &mut Criterion) {
    let scene = scene();
    let mut ctx = scene.device.create_context();

    c.bench_function("context_record_1000_draws", |b| {
        b.iter(|| {
            ctx.begin();
            ctx.set_render_targets(&[scene.target.clone()], None);
            ctx.bind_shader(&scene.shader);
            ctx.bind_texture(&scene.albedo, "albedo");
            ctx.bind_vertex_buffer(0, &scene.vertices, 0);
            ctx.bind_index_buffer(&scene.indices, IndexFormat::Uint16, 0);
            for i in 0..1000 {
                ctx.draw_indexed(PrimitiveType::Triangles, (i % 64) * 6, 6, 0);
            }
            black_box(ctx.log().pass_batches().len());
            ctx.discard();
        });
    });
}

fn bench_record_and_replay(c: &mut Criterion) {
    let scene = scene();
    let mut ctx = scene.device.create_context();

    c.bench_function("context_replay_1000_draws", |b| {
        b.iter(|| {
            scene.device.begin_frame().unwrap();
            ctx.begin();
            ctx.set_render_targets(&[scene.target.clone()], None);
            ctx.clear_render_target(0, [0.0, 0.0, 0.0, 1.0]);
            ctx.bind_shader(&scene.shader);
            ctx.bind_texture(&scene.albedo, "albedo");
            ctx.bind_vertex_buffer(0, &scene.vertices, 0);
            ctx.bind_index_buffer(&scene.indices, IndexFormat::Uint16, 0);
            for i in 0..1000 {
                if i % 100 == 0 {
                    ctx.set_blend(i % 200 == 0);
                }
                ctx.draw_indexed(PrimitiveType::Triangles, 0, 6, i as i32);
            }
            ctx.end().unwrap();
            scene.device.end_frame().unwrap();
            black_box(scene.backend.take_recorded().len());
        });
    });
}

// ---------------------------------------------------------------------------
// State tracking
// ---------------------------------------------------------------------------

fn bench_tracker_read_after_read(c: &mut Criterion) {
    let scene = scene();
    let textures: Vec<_> = (0..1000)
        .map(|_| {
            scene
                .device
                .create_texture(&TextureDescriptor::new_2d(
                    4,
                    4,
                    TextureFormat::RGBA8_UNORM,
                    TextureUsage::TEXTURE_BINDING,
                ))
                .unwrap()
        })
        .collect();
    let ids: Vec<ResourceId> = textures.iter().map(|t| t.id()).collect();
    let sampled = TextureAccess::Sampled(vk::PipelineStageFlags::FRAGMENT_SHADER).state();
    let attachment = AccessState::resting(TextureLayout::ColorAttachment);

    c.bench_function("tracker_require_1000_resources", |b| {
        b.iter_with_setup(
            || {
                let mut tracker = ResourceStateTracker::new();
                for &id in &ids {
                    tracker.set_state(id, attachment);
                }
                tracker
            },
            |mut tracker| {
                let mut barriers = 0;
                for _ in 0..2 {
                    for &id in &ids {
                        if tracker.require(id, sampled).is_some() {
                            barriers += 1;
                        }
                    }
                }
                black_box(barriers);
            },
        );
    });
}

// ---------------------------------------------------------------------------
// Format conversion
// ---------------------------------------------------------------------------

fn bench_format_round_trip(c: &mut Criterion) {
    let formats: Vec<_> = supported_formats().collect();

    c.bench_function("format_table_round_trip", |b| {
        b.iter(|| {
            for &format in &formats {
                let vk_format = get_vk_format(black_box(format)).unwrap();
                black_box(decompose_vk_format(vk_format).unwrap());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_record_draws,
    bench_record_and_replay,
    bench_tracker_read_after_read,
    bench_format_round_trip,
);
criterion_main!(benches);
