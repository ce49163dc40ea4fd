//! GPU texture resource.

use std::sync::Arc;

use ash::vk;

use super::{ResourceId, RetiredResources};
use crate::backend::GpuTexture;
use crate::backend::conversion::aspect_mask;
use crate::sync::TextureLayout;
use crate::types::{Extent3d, TextureDescriptor, TextureFormat, TextureUsage};

/// A GPU texture resource.
///
/// Textures are created by [`GraphicsDevice::create_texture`](crate::GraphicsDevice::create_texture)
/// or wrapped around externally owned images (swap-chain images) with
/// [`GraphicsDevice::wrap_external_texture`](crate::GraphicsDevice::wrap_external_texture).
///
/// # Example
///
/// ```ignore
/// let texture = device.create_texture(&TextureDescriptor::new_2d(
///     1920, 1080,
///     TextureFormat::RGBA8_UNORM,
///     TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
/// ))?;
/// println!("Texture size: {}x{}", texture.width(), texture.height());
/// ```
pub struct Texture {
    id: ResourceId,
    descriptor: TextureDescriptor,
    vk_format: vk::Format,
    gpu: GpuTexture,
    retired: Arc<RetiredResources>,
}

impl Texture {
    pub(crate) fn new(
        descriptor: TextureDescriptor,
        vk_format: vk::Format,
        gpu: GpuTexture,
        retired: Arc<RetiredResources>,
    ) -> Self {
        Self {
            id: ResourceId::next(),
            descriptor,
            vk_format,
            gpu,
            retired,
        }
    }

    /// Identity used by the resource state tracker and the caches.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Get the texture descriptor.
    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    /// Get the texture size.
    pub fn size(&self) -> Extent3d {
        self.descriptor.size
    }

    /// Get the texture width.
    pub fn width(&self) -> u32 {
        self.descriptor.size.width
    }

    /// Get the texture height.
    pub fn height(&self) -> u32 {
        self.descriptor.size.height
    }

    /// Get the texture format.
    pub fn format(&self) -> TextureFormat {
        self.descriptor.format
    }

    /// Get the usage flags.
    pub fn usage(&self) -> TextureUsage {
        self.descriptor.usage
    }

    /// Get the texture label, if set.
    pub fn label(&self) -> Option<&str> {
        self.descriptor.label.as_deref()
    }

    /// Native format.
    pub fn vk_format(&self) -> vk::Format {
        self.vk_format
    }

    /// Aspects covered by views and barriers of this texture.
    pub fn aspect_mask(&self) -> vk::ImageAspectFlags {
        aspect_mask(self.descriptor.format)
    }

    /// Backend texture.
    pub fn gpu(&self) -> &GpuTexture {
        &self.gpu
    }

    pub fn image(&self) -> vk::Image {
        self.gpu.image()
    }

    pub fn view(&self) -> vk::ImageView {
        self.gpu.view()
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.gpu.sampler()
    }

    /// Layout the texture is left in after a pass or a transfer writes it.
    ///
    /// `None` means the usage allows no layout other than the one the writer
    /// used, so the texture stays where it is.
    pub fn resting_layout(&self) -> Option<TextureLayout> {
        let usage = self.descriptor.usage;
        if usage.contains(TextureUsage::PRESENT) {
            Some(TextureLayout::PresentSrc)
        } else if usage.contains(TextureUsage::TEXTURE_BINDING) {
            Some(TextureLayout::ShaderReadOnly)
        } else if usage.contains(TextureUsage::STORAGE_BINDING) {
            Some(TextureLayout::General)
        } else {
            None
        }
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.retired.retire(self.id);
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id)
            .field("size", &self.descriptor.size)
            .field("format", &self.descriptor.format)
            .field("usage", &self.descriptor.usage)
            .field("label", &self.descriptor.label)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn texture(usage: TextureUsage, format: TextureFormat) -> Texture {
        Texture::new(
            TextureDescriptor::new_2d(16, 16, format, usage),
            vk::Format::UNDEFINED,
            GpuTexture::Dummy {
                image: vk::Image::from_raw(1),
                view: vk::ImageView::from_raw(2),
                sampler: vk::Sampler::from_raw(3),
            },
            Arc::default(),
        )
    }

    #[test]
    fn test_resting_layout_by_usage() {
        let present = texture(
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::PRESENT | TextureUsage::TEXTURE_BINDING,
            TextureFormat::BGRA8_UNORM,
        );
        assert_eq!(present.resting_layout(), Some(TextureLayout::PresentSrc));

        let sampled = texture(
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
            TextureFormat::RGBA8_UNORM,
        );
        assert_eq!(sampled.resting_layout(), Some(TextureLayout::ShaderReadOnly));

        let storage = texture(TextureUsage::STORAGE_BINDING, TextureFormat::RGBA32_FLOAT);
        assert_eq!(storage.resting_layout(), Some(TextureLayout::General));

        let attachment_only = texture(TextureUsage::RENDER_ATTACHMENT, TextureFormat::DEPTH32_FLOAT);
        assert_eq!(attachment_only.resting_layout(), None);
    }

    #[test]
    fn test_depth_aspect() {
        let depth = texture(TextureUsage::RENDER_ATTACHMENT, TextureFormat::DEPTH24_STENCIL8);
        assert_eq!(
            depth.aspect_mask(),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
