//! GPU backend abstraction layer.
//!
//! The recording core never calls Vulkan directly. It creates native objects
//! and records native commands through the [`GpuBackend`] trait.
//!
//! # Available Backends
//!
//! - [`dummy`]: creates fake handles and keeps every recorded command for
//!   inspection. Used by the test suite and as the fallback when no Vulkan
//!   device is available.
//! - `vulkan` (feature `vulkan-backend`): native Vulkan using ash and
//!   gpu-allocator.

mod command;
pub mod conversion;
pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
#[cfg(feature = "vulkan-backend")]
use gpu_allocator::vulkan::Allocation;
use parking_lot::Mutex;

use crate::cache::{FramebufferKey, GraphicsPipelineKey, RenderPassKey};
use crate::device::{BackendType, DeviceParameters};
use crate::error::GraphicsError;
use crate::resources::{Shader, ShaderDescriptor, ShaderStage};
use crate::types::{BufferDescriptor, Extent3d, TextureDescriptor};

pub use command::{ClearValue, DescriptorResource, DescriptorWrite, GpuCommand};
pub use dummy::DummyBackend;

#[cfg(feature = "vulkan-backend")]
use vulkan::{DeferredDestructor, DeferredResource};

/// Handle to a GPU buffer allocation.
pub enum GpuBuffer {
    /// Dummy backend buffer. Mappable buffers keep their contents in host memory.
    Dummy {
        buffer: vk::Buffer,
        memory: Option<Mutex<Vec<u8>>>,
    },
    /// Vulkan backend buffer
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        buffer: vk::Buffer,
        allocation: Mutex<Option<Allocation>>,
        /// Host writes are visible without an explicit flush.
        coherent: bool,
        deferred: Arc<DeferredDestructor>,
    },
}

impl GpuBuffer {
    /// Native buffer handle.
    pub fn raw(&self) -> vk::Buffer {
        match self {
            Self::Dummy { buffer, .. } => *buffer,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { buffer, .. } => *buffer,
        }
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { buffer, memory } => f
                .debug_struct("GpuBuffer::Dummy")
                .field("buffer", buffer)
                .field("mapped", &memory.is_some())
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan {
                buffer, coherent, ..
            } => f
                .debug_struct("GpuBuffer::Vulkan")
                .field("buffer", buffer)
                .field("coherent", coherent)
                .finish_non_exhaustive(),
        }
    }
}

/// Handle to a GPU image with its default view and sampler.
pub enum GpuTexture {
    /// Dummy backend (no GPU allocation)
    Dummy {
        image: vk::Image,
        view: vk::ImageView,
        sampler: vk::Sampler,
    },
    /// An image owned by someone else, typically a swap chain. Never destroyed here.
    External {
        image: vk::Image,
        view: vk::ImageView,
    },
    /// Vulkan backend texture
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        image: vk::Image,
        view: vk::ImageView,
        sampler: vk::Sampler,
        allocation: Mutex<Option<Allocation>>,
        deferred: Arc<DeferredDestructor>,
    },
}

impl GpuTexture {
    pub fn image(&self) -> vk::Image {
        match self {
            Self::Dummy { image, .. } | Self::External { image, .. } => *image,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { image, .. } => *image,
        }
    }

    pub fn view(&self) -> vk::ImageView {
        match self {
            Self::Dummy { view, .. } | Self::External { view, .. } => *view,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { view, .. } => *view,
        }
    }

    /// Sampler used when the texture is bound to a sampled slot. Null for
    /// external images.
    pub fn sampler(&self) -> vk::Sampler {
        match self {
            Self::Dummy { sampler, .. } => *sampler,
            Self::External { .. } => vk::Sampler::null(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { sampler, .. } => *sampler,
        }
    }
}

impl std::fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy { image, view, .. } => f
                .debug_struct("GpuTexture::Dummy")
                .field("image", image)
                .field("view", view)
                .finish_non_exhaustive(),
            Self::External { image, view } => f
                .debug_struct("GpuTexture::External")
                .field("image", image)
                .field("view", view)
                .finish(),
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { image, view, .. } => f
                .debug_struct("GpuTexture::Vulkan")
                .field("image", image)
                .field("view", view)
                .finish_non_exhaustive(),
        }
    }
}

/// A compiled shader stage.
#[derive(Debug)]
pub struct GpuShaderModule {
    pub stage: ShaderStage,
    pub module: vk::ShaderModule,
    pub entry_point: CString,
}

/// Shader modules plus the layouts derived from reflection.
pub enum GpuShader {
    Dummy {
        pipeline_layout: vk::PipelineLayout,
        set_layouts: Vec<vk::DescriptorSetLayout>,
    },
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        pipeline_layout: vk::PipelineLayout,
        set_layouts: Vec<vk::DescriptorSetLayout>,
        modules: Vec<GpuShaderModule>,
        deferred: Arc<DeferredDestructor>,
    },
}

impl GpuShader {
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        match self {
            Self::Dummy {
                pipeline_layout, ..
            } => *pipeline_layout,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan {
                pipeline_layout, ..
            } => *pipeline_layout,
        }
    }

    /// One layout per descriptor set index, including empty sets.
    pub fn set_layouts(&self) -> &[vk::DescriptorSetLayout] {
        match self {
            Self::Dummy { set_layouts, .. } => set_layouts,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { set_layouts, .. } => set_layouts,
        }
    }

    pub fn modules(&self) -> &[GpuShaderModule] {
        match self {
            Self::Dummy { .. } => &[],
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { modules, .. } => modules,
        }
    }
}

impl std::fmt::Debug for GpuShader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuShader")
            .field("pipeline_layout", &self.pipeline_layout())
            .field("set_layouts", &self.set_layouts().len())
            .finish_non_exhaustive()
    }
}

/// A timestamp query pool.
pub enum GpuQueryPool {
    Dummy {
        pool: vk::QueryPool,
        count: u32,
    },
    #[cfg(feature = "vulkan-backend")]
    Vulkan {
        device: ash::Device,
        pool: vk::QueryPool,
        count: u32,
        deferred: Arc<DeferredDestructor>,
    },
}

impl GpuQueryPool {
    pub fn raw(&self) -> vk::QueryPool {
        match self {
            Self::Dummy { pool, .. } => *pool,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { pool, .. } => *pool,
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            Self::Dummy { count, .. } => *count,
            #[cfg(feature = "vulkan-backend")]
            Self::Vulkan { count, .. } => *count,
        }
    }
}

impl std::fmt::Debug for GpuQueryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuQueryPool")
            .field("pool", &self.raw())
            .field("count", &self.count())
            .finish()
    }
}

// ============================================================================
// Vulkan Resource Cleanup (Drop implementations)
// ============================================================================

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuBuffer {
    fn drop(&mut self) {
        if let GpuBuffer::Vulkan {
            device,
            buffer,
            allocation,
            deferred,
            ..
        } = self
        {
            deferred.queue(DeferredResource::Buffer {
                device: device.clone(),
                buffer: *buffer,
                allocation: allocation.lock().take(),
            });
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuTexture {
    fn drop(&mut self) {
        if let GpuTexture::Vulkan {
            device,
            image,
            view,
            sampler,
            allocation,
            deferred,
        } = self
        {
            deferred.queue(DeferredResource::Texture {
                device: device.clone(),
                image: *image,
                view: *view,
                sampler: *sampler,
                allocation: allocation.lock().take(),
            });
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuShader {
    fn drop(&mut self) {
        if let GpuShader::Vulkan {
            device,
            pipeline_layout,
            set_layouts,
            modules,
            deferred,
        } = self
        {
            deferred.queue(DeferredResource::Shader {
                device: device.clone(),
                pipeline_layout: *pipeline_layout,
                set_layouts: std::mem::take(set_layouts),
                modules: modules.drain(..).map(|m| m.module).collect(),
            });
        }
    }
}

#[cfg(feature = "vulkan-backend")]
impl Drop for GpuQueryPool {
    fn drop(&mut self) {
        if let GpuQueryPool::Vulkan {
            device,
            pool,
            deferred,
            ..
        } = self
        {
            deferred.queue(DeferredResource::QueryPool {
                device: device.clone(),
                pool: *pool,
            });
        }
    }
}

/// GPU backend trait for abstracting native object creation and command
/// recording.
///
/// Every `create_*` method is only called on a cache miss or on explicit
/// resource creation; `destroy_*` methods may defer the actual destruction
/// until the GPU is done with the object.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create one buffer allocation.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, GraphicsError>;

    /// Create a host-visible transfer source holding `data`.
    fn create_staging_buffer(&self, data: &[u8]) -> Result<GpuBuffer, GraphicsError>;

    /// Create an image with its view and sampler.
    fn create_texture(
        &self,
        descriptor: &TextureDescriptor,
        format: vk::Format,
    ) -> Result<GpuTexture, GraphicsError>;

    /// Upload the initial contents of a texture and leave it in
    /// shader-read-only layout. Blocks until the upload completes.
    fn upload_texture(
        &self,
        texture: &GpuTexture,
        aspect: vk::ImageAspectFlags,
        extent: Extent3d,
        data: &[u8],
    ) -> Result<(), GraphicsError>;

    /// Create shader modules, descriptor set layouts and the pipeline layout.
    fn create_shader(&self, descriptor: &ShaderDescriptor) -> Result<GpuShader, GraphicsError>;

    fn create_query_pool(&self, count: u32) -> Result<GpuQueryPool, GraphicsError>;

    fn create_render_pass(&self, key: &RenderPassKey) -> Result<vk::RenderPass, GraphicsError>;

    fn create_framebuffer(&self, key: &FramebufferKey) -> Result<vk::Framebuffer, GraphicsError>;

    fn create_graphics_pipeline(
        &self,
        shader: &Shader,
        key: &GraphicsPipelineKey,
    ) -> Result<vk::Pipeline, GraphicsError>;

    fn create_compute_pipeline(&self, shader: &Shader) -> Result<vk::Pipeline, GraphicsError>;

    fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, GraphicsError>;

    fn write_descriptor_set(&self, writes: &[DescriptorWrite]);

    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    fn free_descriptor_set(&self, set: vk::DescriptorSet);

    /// Copy `data` into a mappable buffer and flush it if the memory is not
    /// host-coherent.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8])
    -> Result<(), GraphicsError>;

    /// Invalidate a mappable buffer and copy its contents into `data`.
    fn read_buffer(
        &self,
        buffer: &GpuBuffer,
        offset: u64,
        data: &mut [u8],
    ) -> Result<(), GraphicsError>;

    /// Read back timestamp query results, in ticks.
    fn read_timestamps(
        &self,
        pool: &GpuQueryPool,
        first: u32,
        count: u32,
    ) -> Result<Vec<u64>, GraphicsError>;

    /// Nanoseconds per timestamp tick.
    fn timestamp_period(&self) -> f32;

    /// Whether `BeginLabel`/`EndLabel` reach a debugging layer.
    fn supports_debug_labels(&self) -> bool;

    /// Record commands into the current frame's command buffer.
    fn record(&self, commands: &[GpuCommand]) -> Result<(), GraphicsError>;

    /// Wait for `frame_slot` to be free on the GPU, release objects deferred
    /// in it and start recording its command buffer.
    fn begin_frame(&self, frame_slot: usize) -> Result<(), GraphicsError>;

    /// Finish the current command buffer and submit it.
    fn end_frame(&self) -> Result<(), GraphicsError>;

    /// Block until the GPU is idle.
    fn wait_idle(&self) -> Result<(), GraphicsError>;
}

/// Selects and creates the backend requested by `params`.
///
/// [`BackendType::Auto`] tries Vulkan first and falls back to the dummy
/// backend if no Vulkan device can be created.
pub fn create_backend(params: &DeviceParameters) -> Result<Arc<dyn GpuBackend>, GraphicsError> {
    match params.backend {
        BackendType::Dummy => {
            log::info!("Using dummy backend");
            Ok(Arc::new(DummyBackend::new()))
        }
        #[cfg(feature = "vulkan-backend")]
        BackendType::Vulkan => {
            let backend = vulkan::VulkanBackend::new(params)?;
            log::info!("Using Vulkan backend (ash)");
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "vulkan-backend"))]
        BackendType::Vulkan => Err(GraphicsError::FeatureNotSupported(
            "ember-graphics was built without the vulkan-backend feature".to_string(),
        )),
        BackendType::Auto => {
            #[cfg(feature = "vulkan-backend")]
            {
                match vulkan::VulkanBackend::new(params) {
                    Ok(backend) => {
                        log::info!("Using Vulkan backend (ash)");
                        return Ok(Arc::new(backend));
                    }
                    Err(e) => {
                        log::warn!("Failed to create Vulkan backend: {}", e);
                    }
                }
            }

            log::info!("Using dummy backend");
            Ok(Arc::new(DummyBackend::new()))
        }
    }
}
