//! # Ember Graphics
//!
//! Command recording and resource synchronization on top of Vulkan.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GraphicsDevice`] - Owns the backend, the object caches and the frame loop
//! - [`GraphicsContext`] - Immediate-style recording API that batches draws
//!   into render passes and replays them with minimal barriers at `end()`
//! - [`sync::ResourceStateTracker`] - Current access state of every resource,
//!   with read-after-read barrier elision
//! - [`cache`] - Render pass, framebuffer, pipeline and descriptor set caches
//! - Multiple backend support: Vulkan and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use ember_graphics::{DeviceParameters, GraphicsDevice};
//!
//! let device = GraphicsDevice::new(DeviceParameters::default())?;
//! let mut ctx = device.create_context();
//!
//! device.begin_frame()?;
//! ctx.begin();
//! ctx.set_render_targets(&[color.clone()], Some(&depth));
//! ctx.clear_render_target(0, [0.0, 0.0, 0.0, 1.0]);
//! ctx.bind_shader(&shader);
//! ctx.bind_texture(&albedo, "albedo");
//! ctx.bind_vertex_buffer(0, &vertices, 0);
//! ctx.bind_index_buffer(&indices, IndexFormat::Uint16, 0);
//! ctx.draw_indexed(PrimitiveType::Triangles, 0, 36, 0);
//! ctx.end()?;
//! device.end_frame()?;
//! ```

pub mod backend;
pub mod cache;
pub mod context;
pub mod device;
pub mod error;
pub mod profiling;
pub mod resources;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use backend::{DummyBackend, GpuBackend, GpuCommand};
pub use context::GraphicsContext;
pub use device::{BackendType, CacheStats, DeviceParameters, GraphicsDevice, MAX_FRAMES_IN_FLIGHT};
pub use error::GraphicsError;
pub use profiling::GpuTimer;
pub use resources::{
    Buffer, ResourceId, Shader, ShaderDescriptor, ShaderReflection, ShaderStage,
    ShaderStageSource, ShaderStages, Texture,
};
pub use types::{
    BufferDescriptor, BufferUsage, Extent3d, IndexFormat, PipelineState, SamplerDescriptor,
    TextureDescriptor, TextureFormat, TextureUsage,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_device() {
        let device = GraphicsDevice::new(DeviceParameters::new().with_backend(BackendType::Dummy))
            .unwrap();
        assert_eq!(device.backend().name(), "Dummy Backend");
        assert_eq!(device.cache_stats(), CacheStats::default());
    }
}
