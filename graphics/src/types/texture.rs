//! Texture types and descriptors.

use super::{Extent3d, SamplerDescriptor};
use bitflags::bitflags;

/// Channel layout of a texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    /// Single red channel.
    R,
    /// Red and green channels.
    Rg,
    /// Red, green and blue channels.
    Rgb,
    /// Red, green, blue and alpha channels.
    Rgba,
    /// Blue, green, red and alpha channels (common swap-chain order).
    Bgra,
    /// Depth only.
    Depth,
    /// Depth with an 8-bit stencil channel.
    DepthStencil,
    /// Stencil only.
    Stencil,
}

/// Numeric interpretation of each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Unsigned normalized to `[0, 1]`.
    Unorm,
    /// Signed normalized to `[-1, 1]`.
    Snorm,
    /// Unsigned integer.
    Uint,
    /// Signed integer.
    Sint,
    /// IEEE floating point.
    Float,
    /// Unsigned normalized with sRGB encoding.
    Srgb,
}

/// A texture format described as `(layout, bits per channel, data type)`.
///
/// For depth/stencil formats `bits_per_channel` is the depth precision; the
/// stencil channel is always 8 bits. The native format is obtained through
/// [`get_vk_format`](crate::backend::conversion::get_vk_format), which rejects
/// combinations that have no Vulkan equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureFormat {
    /// Channel layout.
    pub layout: PixelLayout,
    /// Bits per channel.
    pub bits_per_channel: u8,
    /// Channel data type.
    pub data_type: DataType,
}

impl TextureFormat {
    /// 8-bit RGBA, unsigned normalized.
    pub const RGBA8_UNORM: Self = Self::new(PixelLayout::Rgba, 8, DataType::Unorm);
    /// 8-bit RGBA, sRGB.
    pub const RGBA8_SRGB: Self = Self::new(PixelLayout::Rgba, 8, DataType::Srgb);
    /// 8-bit BGRA, unsigned normalized.
    pub const BGRA8_UNORM: Self = Self::new(PixelLayout::Bgra, 8, DataType::Unorm);
    /// 8-bit BGRA, sRGB.
    pub const BGRA8_SRGB: Self = Self::new(PixelLayout::Bgra, 8, DataType::Srgb);
    /// 16-bit RGBA, float.
    pub const RGBA16_FLOAT: Self = Self::new(PixelLayout::Rgba, 16, DataType::Float);
    /// 32-bit RGBA, float.
    pub const RGBA32_FLOAT: Self = Self::new(PixelLayout::Rgba, 32, DataType::Float);
    /// 8-bit red, unsigned normalized.
    pub const R8_UNORM: Self = Self::new(PixelLayout::R, 8, DataType::Unorm);
    /// 32-bit red, float.
    pub const R32_FLOAT: Self = Self::new(PixelLayout::R, 32, DataType::Float);
    /// 16-bit depth.
    pub const DEPTH16_UNORM: Self = Self::new(PixelLayout::Depth, 16, DataType::Unorm);
    /// 32-bit float depth.
    pub const DEPTH32_FLOAT: Self = Self::new(PixelLayout::Depth, 32, DataType::Float);
    /// 24-bit depth with 8-bit stencil.
    pub const DEPTH24_STENCIL8: Self = Self::new(PixelLayout::DepthStencil, 24, DataType::Unorm);
    /// 32-bit float depth with 8-bit stencil.
    pub const DEPTH32_FLOAT_STENCIL8: Self =
        Self::new(PixelLayout::DepthStencil, 32, DataType::Float);
    /// 8-bit stencil only.
    pub const S8_UINT: Self = Self::new(PixelLayout::Stencil, 8, DataType::Uint);

    /// Create a format from its three components.
    pub const fn new(layout: PixelLayout, bits_per_channel: u8, data_type: DataType) -> Self {
        Self {
            layout,
            bits_per_channel,
            data_type,
        }
    }

    /// Whether the format has a depth channel.
    pub fn has_depth(&self) -> bool {
        matches!(self.layout, PixelLayout::Depth | PixelLayout::DepthStencil)
    }

    /// Whether the format has a stencil channel.
    pub fn has_stencil(&self) -> bool {
        matches!(
            self.layout,
            PixelLayout::DepthStencil | PixelLayout::Stencil
        )
    }

    /// Whether this is a depth and/or stencil format.
    pub fn is_depth_stencil(&self) -> bool {
        self.has_depth() || self.has_stencil()
    }

    /// Number of channels.
    pub fn channel_count(&self) -> u32 {
        match self.layout {
            PixelLayout::R | PixelLayout::Depth | PixelLayout::Stencil => 1,
            PixelLayout::Rg | PixelLayout::DepthStencil => 2,
            PixelLayout::Rgb => 3,
            PixelLayout::Rgba | PixelLayout::Bgra => 4,
        }
    }

    /// Size of one texel in bytes, as laid out in a tightly packed upload.
    pub fn bytes_per_texel(&self) -> u32 {
        match self.layout {
            // Buffer copies address the depth aspect only.
            PixelLayout::DepthStencil => 4,
            _ => self.channel_count() * u32::from(self.bits_per_channel) / 8,
        }
    }
}

impl Default for TextureFormat {
    fn default() -> Self {
        Self::RGBA8_UNORM
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in shaders.
        const TEXTURE_BINDING = 1 << 2;
        /// Texture can be used as a storage image.
        const STORAGE_BINDING = 1 << 3;
        /// Texture can be a render target or depth/stencil target.
        const RENDER_ATTACHMENT = 1 << 4;
        /// Texture is a swap-chain image and rests in the present layout.
        const PRESENT = 1 << 5;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a 2D texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of the texture.
    pub size: Extent3d,
    /// Number of mip levels.
    pub mip_level_count: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
    /// Sampler used when the texture is bound for sampling.
    pub sampler: SamplerDescriptor,
}

impl TextureDescriptor {
    /// Create a 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            mip_level_count: 1,
            format,
            usage,
            sampler: SamplerDescriptor::default(),
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the number of mip levels.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count.max(1);
        self
    }

    /// Set the sampler the texture is bound with.
    pub fn with_sampler(mut self, sampler: SamplerDescriptor) -> Self {
        self.sampler = sampler;
        self
    }
}
