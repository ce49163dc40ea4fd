//! Common utilities for graphics integration tests.
//!
//! Every test builds a [`TestContext`] for a backend. The dummy backend is
//! always available and exposes the native commands it was asked to record,
//! so most tests inspect the exact command stream produced by `end()`.

#![allow(dead_code)]

use std::sync::Arc;

use ember_graphics::sync::TextureLayout;
use ember_graphics::{
    BackendType, Buffer, BufferDescriptor, BufferUsage, DeviceParameters, DummyBackend,
    GpuCommand, GraphicsContext, GraphicsDevice, Shader, ShaderDescriptor, ShaderReflection,
    ShaderStageSource, ShaderStages, Texture, TextureDescriptor, TextureFormat, TextureUsage,
};

// ============================================================================
// Backend Enumeration
// ============================================================================

/// Available GPU backends for testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Dummy backend (records commands, no GPU).
    Dummy,
    /// Vulkan backend (native via ash).
    Vulkan,
}

impl Backend {
    /// Check if this backend is compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Dummy => true,
            #[cfg(feature = "vulkan-backend")]
            Backend::Vulkan => true,
            #[cfg(not(feature = "vulkan-backend"))]
            Backend::Vulkan => false,
        }
    }
}

// ============================================================================
// Test Context
// ============================================================================

/// A device plus, for the dummy backend, a handle on the backend itself.
pub struct TestContext {
    pub device: Arc<GraphicsDevice>,
    pub dummy: Option<Arc<DummyBackend>>,
}

impl TestContext {
    /// Create a test context, or `None` when the backend cannot run here.
    pub fn new(backend: Backend) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        if !backend.is_available() {
            return None;
        }

        match backend {
            Backend::Dummy => {
                let dummy = Arc::new(DummyBackend::new());
                let device =
                    GraphicsDevice::with_backend(dummy.clone(), DeviceParameters::new()).ok()?;
                Some(Self {
                    device,
                    dummy: Some(dummy),
                })
            }
            Backend::Vulkan => {
                let params = DeviceParameters::new()
                    .with_backend(BackendType::Vulkan)
                    .with_application_name("ember-graphics tests");
                match GraphicsDevice::new(params) {
                    Ok(device) => Some(Self {
                        device,
                        dummy: None,
                    }),
                    Err(e) => {
                        eprintln!("Vulkan device unavailable: {}", e);
                        None
                    }
                }
            }
        }
    }

    /// Dummy-only context.
    pub fn dummy() -> Self {
        Self::new(Backend::Dummy).expect("dummy backend is always available")
    }

    pub fn backend(&self) -> &DummyBackend {
        self.dummy
            .as_deref()
            .expect("command inspection needs the dummy backend")
    }

    pub fn context(&self) -> GraphicsContext {
        self.device.create_context()
    }

    /// Run `record` inside one frame and return the native commands it produced.
    pub fn record_frame(&self, record: impl FnOnce(&mut GraphicsContext)) -> Vec<GpuCommand> {
        let mut ctx = self.context();
        self.device.begin_frame().expect("begin frame");
        ctx.begin();
        record(&mut ctx);
        ctx.end().expect("end");
        self.device.end_frame().expect("end frame");
        self.dummy
            .as_ref()
            .map(|dummy| dummy.take_recorded())
            .unwrap_or_default()
    }

    pub fn color_target(&self, width: u32, height: u32) -> Arc<Texture> {
        self.device
            .create_texture(
                &TextureDescriptor::new_2d(
                    width,
                    height,
                    TextureFormat::RGBA8_UNORM,
                    TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                )
                .with_label("color target"),
            )
            .expect("color target")
    }

    pub fn depth_target(&self, width: u32, height: u32) -> Arc<Texture> {
        self.device
            .create_texture(&TextureDescriptor::new_2d(
                width,
                height,
                TextureFormat::DEPTH24_STENCIL8,
                TextureUsage::RENDER_ATTACHMENT,
            ))
            .expect("depth target")
    }

    /// A texture only ever sampled, left in its initial state.
    pub fn sampled_texture(&self) -> Arc<Texture> {
        self.device
            .create_texture(&TextureDescriptor::new_2d(
                8,
                8,
                TextureFormat::RGBA8_UNORM,
                TextureUsage::TEXTURE_BINDING,
            ))
            .expect("sampled texture")
    }

    pub fn index_buffer(&self) -> Arc<Buffer> {
        self.device
            .create_buffer(&BufferDescriptor::new(
                64,
                BufferUsage::INDEX | BufferUsage::COPY_DST,
            ))
            .expect("index buffer")
    }

    pub fn vertex_buffer(&self) -> Arc<Buffer> {
        self.device
            .create_buffer(&BufferDescriptor::new(
                256,
                BufferUsage::VERTEX | BufferUsage::COPY_DST,
            ))
            .expect("vertex buffer")
    }

    /// Graphics shader with no resources.
    pub fn plain_shader(&self) -> Arc<Shader> {
        self.graphics_shader(ShaderReflection::new().with_fragment_output(0))
    }

    /// Graphics shader sampling one texture named `albedo`.
    pub fn textured_shader(&self) -> Arc<Shader> {
        self.graphics_shader(
            ShaderReflection::new()
                .with_texture("albedo", 0, 0, ShaderStages::FRAGMENT)
                .with_fragment_output(0),
        )
    }

    pub fn graphics_shader(&self, reflection: ShaderReflection) -> Arc<Shader> {
        self.device
            .create_shader(
                &ShaderDescriptor::new(reflection)
                    .with_label("test shader")
                    .with_stage(ShaderStageSource::vertex(FAKE_SPIRV.to_vec(), "main"))
                    .with_stage(ShaderStageSource::fragment(FAKE_SPIRV.to_vec(), "main")),
            )
            .expect("graphics shader")
    }

    pub fn compute_shader(&self, reflection: ShaderReflection) -> Arc<Shader> {
        self.device
            .create_shader(
                &ShaderDescriptor::new(reflection)
                    .with_label("test compute")
                    .with_stage(ShaderStageSource::compute(FAKE_SPIRV.to_vec(), "main")),
            )
            .expect("compute shader")
    }
}

/// Placeholder module words. Only the dummy backend accepts these.
pub const FAKE_SPIRV: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];

// ============================================================================
// Command Stream Helpers
// ============================================================================

/// Names of the recorded commands, in order.
pub fn names(commands: &[GpuCommand]) -> Vec<&'static str> {
    commands.iter().map(GpuCommand::name).collect()
}

/// Names of the recorded commands without barriers.
pub fn names_without_barriers(commands: &[GpuCommand]) -> Vec<&'static str> {
    commands
        .iter()
        .filter(|c| !matches!(c, GpuCommand::PipelineBarrier { .. }))
        .map(GpuCommand::name)
        .collect()
}

pub fn count(commands: &[GpuCommand], name: &str) -> usize {
    commands.iter().filter(|c| c.name() == name).count()
}

/// Number of image barriers touching `texture`.
pub fn image_barrier_count(commands: &[GpuCommand], texture: &Texture) -> usize {
    commands
        .iter()
        .map(|command| match command {
            GpuCommand::PipelineBarrier { images, .. } => {
                images.iter().filter(|b| b.image == texture.image()).count()
            }
            _ => 0,
        })
        .sum()
}

/// Layout the last barrier touching `texture` moves it into.
pub fn final_layout(commands: &[GpuCommand], texture: &Texture) -> Option<TextureLayout> {
    commands
        .iter()
        .filter_map(|command| match command {
            GpuCommand::PipelineBarrier { images, .. } => images
                .iter()
                .rev()
                .find(|b| b.image == texture.image())
                .map(|b| b.new_layout),
            _ => None,
        })
        .last()
}

/// Index of every barrier command covering the given buffer.
pub fn buffer_barrier_positions(commands: &[GpuCommand], buffer: ash::vk::Buffer) -> Vec<usize> {
    commands
        .iter()
        .enumerate()
        .filter(|(_, command)| match command {
            GpuCommand::PipelineBarrier { buffers, .. } => {
                buffers.iter().any(|b| b.buffer == buffer)
            }
            _ => false,
        })
        .map(|(i, _)| i)
        .collect()
}

/// Record one indexed draw of six indices.
pub fn draw_quad(ctx: &mut GraphicsContext, indices: &Arc<Buffer>) {
    ctx.bind_index_buffer(indices, ember_graphics::IndexFormat::Uint16, 0);
    ctx.draw_indexed(ember_graphics::types::PrimitiveType::Triangles, 0, 6, 0);
}
