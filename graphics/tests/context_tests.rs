//! Integration tests for command recording and replay.
//!
//! Most tests run on the dummy backend, which keeps every native command
//! `end()` records so the exact stream can be checked. Tests that only need
//! host-visible memory also run on Vulkan when a device is present.
//!
//! # Test Categories
//!
//! - **Clear Tests**: pending clears and their replay
//! - **Batching Tests**: when draws share or split pass and pipeline batches
//! - **Barrier Tests**: read-after-read elision
//! - **Layout Tests**: in-pass and resting layouts of attachments, storage
//!   images and presented images
//! - **Binding Tests**: default resource substitution
//! - **Copy Tests**: mapped writes versus staged uploads
//! - **Replay Tests**: shape of the native command stream
//!
//! ```bash
//! cargo test --test context_tests
//! ```

mod common;

use std::sync::Arc;

use rstest::rstest;

use ash::vk;
use vk::Handle;
use common::{
    Backend, TestContext, buffer_barrier_positions, count, draw_quad, final_layout,
    image_barrier_count, names, names_without_barriers,
};
use ember_graphics::backend::{ClearValue, DescriptorResource};
use ember_graphics::context::CopyKind;
use ember_graphics::resources::BindingKind;
use ember_graphics::sync::{AccessState, TextureLayout};
use ember_graphics::types::{BlendFactor, BlendOp, CompareFunction, Extent3d};
use ember_graphics::{
    BufferDescriptor, BufferUsage, GpuCommand, ShaderReflection, ShaderStages, TextureDescriptor,
    TextureFormat, TextureUsage,
};

const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];
const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];

// ============================================================================
// Clear Tests
// ============================================================================

/// Replacing the render targets moves unconsumed clears into the log, one
/// per cleared target, in call order.
#[test]
fn test_replaced_targets_log_pending_clears() {
    let t = TestContext::dummy();
    let a = t.color_target(64, 64);
    let b = t.color_target(64, 64);
    let c = t.color_target(64, 64);

    let mut ctx = t.context();
    ctx.begin();
    ctx.set_render_targets(&[a.clone()], None);
    ctx.clear_render_target(0, RED);
    ctx.set_render_targets(&[b.clone(), c.clone()], None);
    ctx.clear_render_target(1, GREEN);
    ctx.set_render_targets(&[a.clone()], None);
    // No clear pending on the last set.
    ctx.set_render_targets(&[b.clone()], None);

    let clears: Vec<_> = ctx
        .log()
        .clears()
        .map(|clear| (clear.target().id(), clear.color()))
        .collect();
    assert_eq!(clears, vec![(a.id(), Some(RED)), (c.id(), Some(GREEN))]);
    assert!(ctx.log().pass_batches().is_empty());
    ctx.discard();
}

#[test]
fn test_clears_without_draws_replay_as_image_clears() {
    let t = TestContext::dummy();
    let color = t.color_target(32, 32);
    let depth = t.depth_target(32, 32);

    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[color.clone()], Some(&depth));
        ctx.clear_render_target(0, RED);
        ctx.clear_depth_stencil_buffer(1.0, 0);
    });

    assert_eq!(count(&commands, "BeginRenderPass"), 0);
    assert!(commands.iter().any(|command| matches!(
        command,
        GpuCommand::ClearColorImage { image, color: value }
            if *image == color.image() && *value == RED
    )));
    let aspect = commands.iter().find_map(|command| match command {
        GpuCommand::ClearDepthStencilImage { image, aspect, .. } if *image == depth.image() => {
            Some(*aspect)
        }
        _ => None,
    });
    assert_eq!(
        aspect,
        Some(vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL)
    );
}

#[test]
fn test_clear_consumed_by_draw_becomes_load_op() {
    let t = TestContext::dummy();
    let target = t.color_target(16, 16);
    let shader = t.plain_shader();
    let indices = t.index_buffer();

    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[target.clone()], None);
        ctx.clear_render_target(0, GREEN);
        ctx.bind_shader(&shader);
        draw_quad(ctx, &indices);
    });

    assert_eq!(count(&commands, "ClearColorImage"), 0);
    let clear_values = commands.iter().find_map(|command| match command {
        GpuCommand::BeginRenderPass { clear_values, .. } => Some(clear_values.clone()),
        _ => None,
    });
    assert_eq!(clear_values, Some(vec![ClearValue::Color(GREEN)]));
}

#[test]
fn test_dispatch_lands_after_pending_clears() {
    let t = TestContext::dummy();
    let target = t.color_target(16, 16);
    let compute = t.compute_shader(ShaderReflection::new());

    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[target.clone()], None);
        ctx.clear_render_target(0, RED);
        ctx.bind_shader(&compute);
        ctx.dispatch(4, 4, 1);
    });

    let names = names(&commands);
    let clear = names.iter().position(|n| *n == "ClearColorImage");
    let dispatch = names.iter().position(|n| *n == "Dispatch");
    assert!(clear.is_some() && dispatch.is_some());
    assert!(clear < dispatch);
}

// ============================================================================
// Batching Tests
// ============================================================================

/// What happens between two otherwise identical draws.
#[derive(Debug, Clone, Copy)]
enum Between {
    Nothing,
    Marker,
    BlendChange,
    ShaderChange,
    TargetChange,
    Clear,
    Copy,
}

#[rstest]
#[case::nothing(Between::Nothing, 1, 1)]
#[case::marker(Between::Marker, 1, 1)]
#[case::blend_change(Between::BlendChange, 1, 2)]
#[case::shader_change(Between::ShaderChange, 1, 2)]
#[case::target_change(Between::TargetChange, 2, 2)]
#[case::clear(Between::Clear, 2, 2)]
#[case::copy(Between::Copy, 2, 2)]
fn test_batch_splitting(
    #[case] between: Between,
    #[case] expected_passes: usize,
    #[case] expected_pipelines: usize,
) {
    let t = TestContext::dummy();
    let target = t.color_target(64, 64);
    let other_target = t.color_target(64, 64);
    let shader = t.plain_shader();
    let other_shader = t.plain_shader();
    let indices = t.index_buffer();
    let src = t.vertex_buffer();
    let dst = t.vertex_buffer();

    let mut passes = 0;
    let mut pipelines = 0;
    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[target.clone()], None);
        ctx.bind_shader(&shader);
        draw_quad(ctx, &indices);

        match between {
            Between::Nothing => {}
            Between::Marker => {
                ctx.push_marker("second draw");
                ctx.pop_marker();
            }
            Between::BlendChange => {
                ctx.set_blend(true);
                ctx.set_blend_func(
                    BlendFactor::SrcAlpha,
                    BlendFactor::OneMinusSrcAlpha,
                    BlendOp::Add,
                    None,
                );
            }
            Between::ShaderChange => ctx.bind_shader(&other_shader),
            Between::TargetChange => ctx.set_render_targets(&[other_target.clone()], None),
            Between::Clear => ctx.clear_render_target(0, RED),
            Between::Copy => ctx.copy_buffer(&dst, &src, 64),
        }
        draw_quad(ctx, &indices);

        passes = ctx.log().pass_batches().len();
        pipelines = ctx
            .log()
            .pass_batches()
            .iter()
            .map(|pass| pass.pipeline_batches().len())
            .sum();
    });

    assert_eq!(passes, expected_passes);
    assert_eq!(pipelines, expected_pipelines);
    assert_eq!(count(&commands, "BeginRenderPass"), expected_passes);
    assert_eq!(count(&commands, "BindPipeline"), expected_pipelines);
    assert_eq!(count(&commands, "DrawIndexed"), 2);
}

#[test]
fn test_consecutive_dispatches_share_a_compute_batch() {
    let t = TestContext::dummy();
    let compute = t.compute_shader(ShaderReflection::new());

    let commands = t.record_frame(|ctx| {
        ctx.bind_shader(&compute);
        ctx.dispatch(1, 1, 1);
        ctx.dispatch(2, 1, 1);
        assert_eq!(ctx.log().pass_batches().len(), 1);
        assert_eq!(ctx.log().pass_batches()[0].invoke_count(), 2);
    });

    assert_eq!(count(&commands, "BindPipeline"), 1);
    assert_eq!(count(&commands, "Dispatch"), 2);
    assert_eq!(count(&commands, "BeginRenderPass"), 0);
}

#[test]
fn test_render_area_is_smallest_target() {
    let t = TestContext::dummy();
    let large = t.color_target(512, 512);
    let small = t.color_target(256, 256);
    let shader = t.graphics_shader(
        ShaderReflection::new()
            .with_fragment_output(0)
            .with_fragment_output(1),
    );
    let indices = t.index_buffer();

    let mut area = Extent3d::default();
    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[large.clone(), small.clone()], None);
        ctx.bind_shader(&shader);
        draw_quad(ctx, &indices);
        area = ctx.log().pass_batches()[0].render_area();
    });

    assert_eq!((area.width, area.height), (256, 256));
    let extent = commands.iter().find_map(|command| match command {
        GpuCommand::BeginRenderPass { area, .. } => Some(area.extent),
        _ => None,
    });
    assert_eq!(
        extent,
        Some(vk::Extent2D {
            width: 256,
            height: 256
        })
    );
}

// ============================================================================
// Barrier Tests
// ============================================================================

#[rstest]
#[case::same_pass(false)]
#[case::separate_passes(true)]
fn test_repeated_sampling_transitions_once(#[case] separate_passes: bool) {
    let t = TestContext::dummy();
    let first = t.color_target(32, 32);
    let second = t.color_target(32, 32);
    let sampled = t.sampled_texture();
    let shader = t.textured_shader();
    let indices = t.index_buffer();

    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[first.clone()], None);
        ctx.bind_shader(&shader);
        ctx.bind_texture(&sampled, "albedo");
        draw_quad(ctx, &indices);
        if separate_passes {
            ctx.set_render_targets(&[second.clone()], None);
        }
        draw_quad(ctx, &indices);
    });

    assert_eq!(count(&commands, "DrawIndexed"), 2);
    assert_eq!(image_barrier_count(&commands, &sampled), 1);
}

#[test]
fn test_sampling_across_frames_needs_no_barrier() {
    let t = TestContext::dummy();
    let target = t.color_target(32, 32);
    let sampled = t.sampled_texture();
    let shader = t.textured_shader();
    let indices = t.index_buffer();

    let frame = || {
        t.record_frame(|ctx| {
            ctx.set_render_targets(&[target.clone()], None);
            ctx.bind_shader(&shader);
            ctx.bind_texture(&sampled, "albedo");
            draw_quad(ctx, &indices);
        })
    };

    assert_eq!(image_barrier_count(&frame(), &sampled), 1);
    assert_eq!(image_barrier_count(&frame(), &sampled), 0);
}

#[test]
fn test_render_then_sample_transitions_target() {
    let t = TestContext::dummy();
    let offscreen = t.color_target(32, 32);
    let backbuffer = t.color_target(32, 32);
    let plain = t.plain_shader();
    let textured = t.textured_shader();
    let indices = t.index_buffer();

    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[offscreen.clone()], None);
        ctx.bind_shader(&plain);
        draw_quad(ctx, &indices);

        ctx.set_render_targets(&[backbuffer.clone()], None);
        ctx.bind_shader(&textured);
        ctx.bind_texture(&offscreen, "albedo");
        draw_quad(ctx, &indices);
    });

    // Into the attachment layout, then to its resting sampled layout. The
    // sampling draw reads it where it rests.
    assert_eq!(image_barrier_count(&commands, &offscreen), 2);
}

#[test]
fn test_memory_barrier_closes_the_stream() {
    let t = TestContext::dummy();
    let compute = t.compute_shader(ShaderReflection::new());

    let commands = t.record_frame(|ctx| {
        ctx.bind_shader(&compute);
        ctx.dispatch(1, 1, 1);
        ctx.add_memory_barrier();
    });

    match commands.last() {
        Some(GpuCommand::PipelineBarrier { memory, .. }) => assert_eq!(memory.len(), 1),
        other => panic!("expected a trailing memory barrier, got {:?}", other),
    }
}

// ============================================================================
// Layout Tests
// ============================================================================

/// A depth buffer tested without writes can be sampled in the same pass. It
/// stays in the read-only depth layout and the descriptor says so too.
#[test]
fn test_sampled_read_only_depth_keeps_attachment_layout() {
    let t = TestContext::dummy();
    let color = t.color_target(32, 32);
    let depth = t
        .device
        .create_texture(&TextureDescriptor::new_2d(
            32,
            32,
            TextureFormat::DEPTH24_STENCIL8,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
        ))
        .unwrap();
    let shader = t.textured_shader();
    let indices = t.index_buffer();
    t.backend().take_descriptor_writes();

    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[color.clone()], Some(&depth));
        ctx.set_depth_test(true, false, CompareFunction::Less);
        ctx.bind_shader(&shader);
        ctx.bind_texture(&depth, "albedo");
        draw_quad(ctx, &indices);
    });

    let writes = t.backend().take_descriptor_writes();
    let layout = writes.iter().find_map(|write| match write.resource {
        DescriptorResource::Image { view, layout, .. } if view == depth.view() => Some(layout),
        _ => None,
    });
    assert_eq!(layout, Some(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL));

    let begin = names(&commands)
        .iter()
        .position(|n| *n == "BeginRenderPass")
        .unwrap();
    assert_eq!(image_barrier_count(&commands[..begin], &depth), 1);
    assert_eq!(
        final_layout(&commands[..begin], &depth),
        Some(TextureLayout::DepthStencilReadOnly)
    );
    // Rests where samplers expect it after the pass.
    assert_eq!(
        final_layout(&commands, &depth),
        Some(TextureLayout::ShaderReadOnly)
    );
}

#[test]
fn test_stencil_only_target() {
    let t = TestContext::dummy();
    let color = t.color_target(16, 16);
    let stencil = t
        .device
        .create_texture(&TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::S8_UINT,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        ))
        .unwrap();
    let readback = t
        .device
        .create_buffer(&BufferDescriptor::new(
            256,
            BufferUsage::MAP_READ | BufferUsage::COPY_DST,
        ))
        .unwrap();

    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[color.clone()], Some(&stencil));
        ctx.clear_stencil_buffer(0x80);
        ctx.copy_texture_to_buffer(&readback, &stencil);
    });

    let clear = commands.iter().find_map(|command| match command {
        GpuCommand::ClearDepthStencilImage {
            image,
            aspect,
            stencil: value,
            ..
        } if *image == stencil.image() => Some((*aspect, *value)),
        _ => None,
    });
    assert_eq!(clear, Some((vk::ImageAspectFlags::STENCIL, 0x80)));

    let copy_aspect = commands.iter().find_map(|command| match command {
        GpuCommand::CopyImageToBuffer { region, .. } => Some(region.image_subresource.aspect_mask),
        _ => None,
    });
    assert_eq!(copy_aspect, Some(vk::ImageAspectFlags::STENCIL));
}

#[test]
#[should_panic(expected = "assertion failed")]
fn test_stencil_only_texture_is_not_a_color_target() {
    let t = TestContext::dummy();
    let stencil = t
        .device
        .create_texture(&TextureDescriptor::new_2d(
            16,
            16,
            TextureFormat::S8_UINT,
            TextureUsage::RENDER_ATTACHMENT,
        ))
        .unwrap();

    let mut ctx = t.context();
    ctx.begin();
    ctx.set_render_targets(&[stencil], None);
}

/// How the presentable image is written.
#[derive(Debug, Clone, Copy)]
enum PresentWrite {
    Blit,
    Render,
}

#[rstest]
#[case::blit(PresentWrite::Blit)]
#[case::render(PresentWrite::Render)]
fn test_presentable_image_rests_in_present_layout(#[case] write: PresentWrite) {
    let t = TestContext::dummy();
    let scene = t.color_target(64, 64);
    let shader = t.plain_shader();
    let indices = t.index_buffer();
    let swapchain = t
        .device
        .wrap_external_texture(
            &TextureDescriptor::new_2d(
                64,
                64,
                TextureFormat::BGRA8_UNORM,
                TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_DST | TextureUsage::PRESENT,
            ),
            vk::Image::from_raw(0xdead_0001),
            vk::ImageView::from_raw(0xdead_0002),
            TextureLayout::Undefined,
        )
        .unwrap();

    let commands = t.record_frame(|ctx| match write {
        PresentWrite::Blit => ctx.blit(&scene, &swapchain),
        PresentWrite::Render => {
            ctx.set_render_targets(&[swapchain.clone()], None);
            ctx.bind_shader(&shader);
            draw_quad(ctx, &indices);
        }
    });

    assert_eq!(
        final_layout(&commands, &swapchain),
        Some(TextureLayout::PresentSrc)
    );
    assert!(matches!(
        commands.last(),
        Some(GpuCommand::PipelineBarrier { images, .. })
            if images.iter().any(|b| b.image == swapchain.image())
    ));
}

#[test]
fn test_storage_image_dispatch_uses_general_layout() {
    let t = TestContext::dummy();
    let image = t
        .device
        .create_texture(&TextureDescriptor::new_2d(
            32,
            32,
            TextureFormat::RGBA8_UNORM,
            TextureUsage::STORAGE_BINDING,
        ))
        .unwrap();
    let compute = t.compute_shader(ShaderReflection::new().with_storage_texture(
        "output",
        0,
        0,
        ShaderStages::COMPUTE,
    ));
    t.backend().take_descriptor_writes();

    let commands = t.record_frame(|ctx| {
        ctx.bind_shader(&compute);
        ctx.bind_texture(&image, "output");
        ctx.dispatch(4, 4, 1);
    });

    let dispatch = names(&commands)
        .iter()
        .position(|n| *n == "Dispatch")
        .unwrap();
    assert_eq!(
        final_layout(&commands[..dispatch], &image),
        Some(TextureLayout::General)
    );

    let writes = t.backend().take_descriptor_writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].kind, BindingKind::StorageTexture);
    assert!(matches!(
        writes[0].resource,
        DescriptorResource::Image { layout, .. } if layout == vk::ImageLayout::GENERAL
    ));
}

/// A storage buffer written by one dispatch is read by the next one only
/// after a barrier between them.
#[test]
fn test_storage_buffer_barrier_between_dispatches() {
    let t = TestContext::dummy();
    let data = t
        .device
        .create_buffer(&BufferDescriptor::new(1024, BufferUsage::STORAGE))
        .unwrap();
    let compute = t.compute_shader(ShaderReflection::new().with_storage_buffer(
        "particles",
        0,
        0,
        ShaderStages::COMPUTE,
    ));

    let commands = t.record_frame(|ctx| {
        ctx.bind_shader(&compute);
        ctx.bind_buffer(&data, "particles");
        ctx.dispatch(64, 1, 1);
        ctx.dispatch(64, 1, 1);
    });

    let names = names(&commands);
    let dispatches: Vec<_> = names
        .iter()
        .enumerate()
        .filter(|(_, n)| **n == "Dispatch")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(dispatches.len(), 2);

    let barriers = buffer_barrier_positions(&commands, data.slot(0).raw());
    assert_eq!(barriers.len(), 1);
    assert!(dispatches[0] < barriers[0] && barriers[0] < dispatches[1]);
}

// ============================================================================
// Binding Tests
// ============================================================================

#[test]
fn test_unbound_texture_gets_missing_texture() {
    let t = TestContext::dummy();
    let target = t.color_target(16, 16);
    let shader = t.textured_shader();
    let indices = t.index_buffer();
    t.backend().take_descriptor_writes();

    t.record_frame(|ctx| {
        ctx.set_render_targets(&[target.clone()], None);
        ctx.bind_shader(&shader);
        draw_quad(ctx, &indices);
    });

    let writes = t.backend().take_descriptor_writes();
    assert_eq!(writes.len(), 1);
    let missing = t.device.missing_texture();
    assert_eq!(writes[0].binding, 0);
    assert_eq!(writes[0].kind, BindingKind::SampledTexture);
    assert!(matches!(
        writes[0].resource,
        DescriptorResource::Image { view, sampler, .. }
            if view == missing.view() && sampler == missing.sampler()
    ));
}

#[test]
fn test_unbound_uniform_gets_missing_buffer() {
    let t = TestContext::dummy();
    let target = t.color_target(16, 16);
    let shader = t.graphics_shader(
        ShaderReflection::new()
            .with_uniform_buffer("camera", 0, 0, ember_graphics::ShaderStages::VERTEX)
            .with_fragment_output(0),
    );
    let indices = t.index_buffer();
    t.backend().take_descriptor_writes();

    t.record_frame(|ctx| {
        ctx.set_render_targets(&[target.clone()], None);
        ctx.bind_shader(&shader);
        ctx.bind_buffer(&indices, "not_declared");
        draw_quad(ctx, &indices);
    });

    let writes = t.backend().take_descriptor_writes();
    assert_eq!(writes.len(), 1);
    let missing = t.device.missing_buffer().slot(0).raw();
    assert!(matches!(
        writes[0].resource,
        DescriptorResource::Buffer { buffer, .. } if buffer == missing
    ));
}

#[test]
fn test_identical_bindings_reuse_descriptor_set() {
    let t = TestContext::dummy();
    let target = t.color_target(16, 16);
    let sampled = t.sampled_texture();
    let shader = t.textured_shader();
    let indices = t.index_buffer();

    for _ in 0..3 {
        t.record_frame(|ctx| {
            ctx.set_render_targets(&[target.clone()], None);
            ctx.bind_shader(&shader);
            ctx.bind_texture(&sampled, "albedo");
            draw_quad(ctx, &indices);
        });
    }

    let stats = t.backend().stats();
    assert_eq!(stats.descriptor_sets, 1);
    assert_eq!(stats.render_passes, 1);
    assert_eq!(stats.framebuffers, 1);
    assert_eq!(stats.pipelines, 1);
    assert_eq!(t.device.cache_stats().descriptor_sets, 1);
}

// ============================================================================
// Copy Tests
// ============================================================================

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_mappable_copy_writes_through(#[case] backend: Backend) {
    let Some(t) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };
    let buffer = t
        .device
        .create_buffer(&BufferDescriptor::new(
            64,
            BufferUsage::UNIFORM | BufferUsage::MAP_READ | BufferUsage::MAP_WRITE,
        ))
        .unwrap();
    let staging_before = t.dummy.as_ref().map(|d| d.stats().staging_buffers);

    let data: Vec<u8> = (0..64).collect();
    let mut ctx = t.context();
    ctx.begin();
    ctx.copy_to_buffer(&buffer, 0, &data).unwrap();
    assert_eq!(ctx.log().copies().count(), 0);
    ctx.discard();

    assert_eq!(
        t.dummy.as_ref().map(|d| d.stats().staging_buffers),
        staging_before
    );

    let mut readback = vec![0u8; 64];
    ctx.read_buffer(&buffer, 0, &mut readback).unwrap();
    assert_eq!(readback, data);
}

#[test]
fn test_device_local_copy_goes_through_staging() {
    let t = TestContext::dummy();
    let buffer = t
        .device
        .create_buffer(&BufferDescriptor::new(
            64,
            BufferUsage::UNIFORM | BufferUsage::COPY_DST,
        ))
        .unwrap();
    let staging_before = t.backend().stats().staging_buffers;

    let commands = t.record_frame(|ctx| {
        ctx.copy_slice_to_buffer(&buffer, 0, &[1.0f32; 16]).unwrap();
        let kinds: Vec<_> = ctx.log().copies().map(|copy| copy.kind()).collect();
        assert_eq!(kinds, vec![CopyKind::BufferToBuffer]);
    });

    assert_eq!(t.backend().stats().staging_buffers, staging_before + 1);
    let copies: Vec<_> = commands
        .iter()
        .filter_map(|command| match command {
            GpuCommand::CopyBuffer { dst, region, .. } => Some((*dst, region.size)),
            _ => None,
        })
        .collect();
    assert_eq!(copies, vec![(buffer.slot(0).raw(), 64)]);
}

#[test]
fn test_texture_readback_copy() {
    let t = TestContext::dummy();
    let source = t.color_target(4, 4);
    let readback = t
        .device
        .create_buffer(&BufferDescriptor::new(
            64,
            BufferUsage::MAP_READ | BufferUsage::COPY_DST,
        ))
        .unwrap();

    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[source.clone()], None);
        ctx.clear_render_target(0, RED);
        ctx.copy_texture_to_buffer(&readback, &source);
    });

    let names = names_without_barriers(&commands);
    assert_eq!(names, vec!["ClearColorImage", "CopyImageToBuffer"]);
}

#[test]
fn test_blit_between_targets() {
    let t = TestContext::dummy();
    let src = t.color_target(64, 64);
    let dst = t.color_target(32, 32);

    let commands = t.record_frame(|ctx| ctx.blit(&src, &dst));

    let filter = commands.iter().find_map(|command| match command {
        GpuCommand::BlitImage { filter, .. } => Some(*filter),
        _ => None,
    });
    assert_eq!(filter, Some(vk::Filter::LINEAR));
}

// ============================================================================
// Replay Tests
// ============================================================================

#[test]
fn test_single_draw_command_stream() {
    let t = TestContext::dummy();
    let target = t.color_target(16, 16);
    let shader = t.plain_shader();
    let indices = t.index_buffer();

    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[target.clone()], None);
        ctx.bind_shader(&shader);
        draw_quad(ctx, &indices);
    });

    assert_eq!(
        names_without_barriers(&commands),
        vec![
            "BeginRenderPass",
            "BindPipeline",
            "BindIndexBuffer",
            "SetViewport",
            "SetScissor",
            "SetStencilReference",
            "DrawIndexed",
            "EndRenderPass",
        ]
    );
}

#[test]
fn test_markers_wrap_the_pass() {
    let t = TestContext::dummy();
    let target = t.color_target(16, 16);
    let shader = t.plain_shader();
    let indices = t.index_buffer();

    let commands = t.record_frame(|ctx| {
        ctx.push_marker("shadow pass");
        ctx.set_render_targets(&[target.clone()], None);
        ctx.bind_shader(&shader);
        draw_quad(ctx, &indices);
        ctx.pop_marker();
    });

    let names = names_without_barriers(&commands);
    assert_eq!(names.first(), Some(&"BeginLabel"));
    assert_eq!(names.last(), Some(&"EndLabel"));
    assert!(matches!(&commands[0], GpuCommand::BeginLabel(name) if name == "shadow pass"));
}

#[test]
fn test_gpu_timer_brackets_the_stream() {
    let t = TestContext::dummy();
    let timer = t.device.create_gpu_timer().unwrap();
    let compute = t.compute_shader(ShaderReflection::new());

    let mut ctx = t.context();
    ctx.set_gpu_timer(Some(Arc::clone(&timer)));
    t.device.begin_frame().unwrap();
    ctx.begin();
    ctx.bind_shader(&compute);
    ctx.dispatch(1, 1, 1);
    ctx.end().unwrap();
    t.device.end_frame().unwrap();

    let names = names(&t.backend().take_recorded());
    assert_eq!(&names[..2], &["ResetQueryPool", "WriteTimestamp"]);
    assert_eq!(names.last(), Some(&"WriteTimestamp"));
    assert!(t.device.read_gpu_timer(&timer).unwrap().as_nanos() > 0);
}

#[test]
fn test_vertex_buffers_bound_in_runs() {
    let t = TestContext::dummy();
    let target = t.color_target(16, 16);
    let shader = t.plain_shader();
    let indices = t.index_buffer();
    let a = t.vertex_buffer();
    let b = t.vertex_buffer();
    let c = t.vertex_buffer();

    let commands = t.record_frame(|ctx| {
        ctx.set_render_targets(&[target.clone()], None);
        ctx.bind_shader(&shader);
        ctx.bind_vertex_buffer(0, &a, 0);
        ctx.bind_vertex_buffer(1, &b, 16);
        ctx.bind_vertex_buffer(3, &c, 0);
        draw_quad(ctx, &indices);
    });

    let runs: Vec<_> = commands
        .iter()
        .filter_map(|command| match command {
            GpuCommand::BindVertexBuffers {
                first_binding,
                offsets,
                ..
            } => Some((*first_binding, offsets.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(runs, vec![(0, vec![0, 16]), (3, vec![0])]);
}

#[test]
fn test_discarded_context_records_nothing() {
    let t = TestContext::dummy();
    let target = t.color_target(16, 16);
    let shader = t.plain_shader();
    let indices = t.index_buffer();

    let mut ctx = t.context();
    ctx.begin();
    ctx.set_render_targets(&[target.clone()], None);
    ctx.bind_shader(&shader);
    draw_quad(&mut ctx, &indices);
    ctx.discard();

    assert!(!ctx.is_recording());
    assert!(ctx.log().is_empty());
    assert!(t.backend().recorded().is_empty());
}

/// A replay that fails partway leaves the shared resource states untouched,
/// so the next frame still transitions from where the GPU really is.
#[test]
fn test_failed_replay_keeps_resource_states() {
    let t = TestContext::dummy();
    let src = t.color_target(16, 16);
    let dst = t.color_target(16, 16);
    let target = t.color_target(16, 16);
    let shader = t.plain_shader();
    let indices = t.index_buffer();

    let mut ctx = t.context();
    t.backend().set_fail_pipelines(true);
    t.device.begin_frame().unwrap();
    ctx.begin();
    ctx.blit(&src, &dst);
    ctx.set_render_targets(&[target.clone()], None);
    ctx.bind_shader(&shader);
    draw_quad(&mut ctx, &indices);
    assert!(ctx.end().is_err());
    t.device.end_frame().unwrap();

    assert!(t.backend().take_recorded().is_empty());
    {
        let tracker = t.device.state_tracker().lock();
        assert_eq!(tracker.state(src.id()), AccessState::INITIAL);
        assert_eq!(tracker.state(dst.id()), AccessState::INITIAL);
    }

    t.backend().set_fail_pipelines(false);
    let commands = t.record_frame(|ctx| ctx.blit(&src, &dst));
    let old_layout = commands.iter().find_map(|command| match command {
        GpuCommand::PipelineBarrier { images, .. } => images
            .iter()
            .find(|b| b.image == dst.image())
            .map(|b| b.old_layout),
        _ => None,
    });
    assert_eq!(old_layout, Some(TextureLayout::Undefined));
}

#[rstest]
#[case::dummy(Backend::Dummy)]
#[case::vulkan(Backend::Vulkan)]
fn test_empty_frames(#[case] backend: Backend) {
    let Some(t) = TestContext::new(backend) else {
        eprintln!("Backend {:?} not available, skipping", backend);
        return;
    };

    let frames = t.device.frames_in_flight() * 2 + 1;
    for _ in 0..frames {
        let commands = t.record_frame(|_| {});
        assert!(commands.is_empty());
    }
    assert_eq!(t.device.frame_index(), frames);
    t.device.wait_idle().unwrap();
}
