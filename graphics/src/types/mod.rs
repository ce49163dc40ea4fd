//! Common types and descriptors for graphics resources.
//!
//! This module contains format descriptions, usage flags, fixed-function
//! state enums and descriptor structs used throughout the graphics system.

mod buffer;
mod common;
mod sampler;
mod state;
mod texture;

pub use buffer::{BufferDescriptor, BufferUsage, IndexFormat};
pub use common::{Extent3d, Rect, Viewport};
pub use sampler::{AddressMode, FilterMode, SamplerDescriptor};
pub use state::{
    BlendComponent, BlendFactor, BlendOp, BlendState, ColorWrites, CompareFunction, CullMode,
    DepthState, FillMode, FrontFace, PipelineState, PrimitiveType, StencilOp, StencilState,
};
pub use texture::{
    DataType, PixelLayout, TextureDescriptor, TextureFormat, TextureUsage,
};
