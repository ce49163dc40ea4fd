//! Texture layouts and resource access states.

use ash::vk;

use crate::resources::ShaderStages;

/// Access bits that write memory.
const WRITE_ACCESS: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::SHADER_WRITE.as_raw()
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags::HOST_WRITE.as_raw()
        | vk::AccessFlags::MEMORY_WRITE.as_raw(),
);

/// Every shader stage a sampled or storage resource can be read from.
const ALL_SHADER_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags::COMPUTE_SHADER.as_raw(),
);

/// Vulkan image layout states that textures can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureLayout {
    /// Initial state, contents undefined.
    #[default]
    Undefined,
    /// Optimal for color attachment writes.
    ColorAttachment,
    /// Optimal for depth/stencil attachment writes.
    DepthStencilAttachment,
    /// Depth/stencil read-only (sampling + depth testing).
    DepthStencilReadOnly,
    /// Optimal for shader sampling.
    ShaderReadOnly,
    /// Optimal for transfer source operations.
    TransferSrc,
    /// Optimal for transfer destination operations.
    TransferDst,
    /// Optimal for presentation to swapchain.
    PresentSrc,
    /// General layout, used for storage images.
    General,
}

impl TextureLayout {
    /// Convert to Vulkan image layout.
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            Self::Undefined => vk::ImageLayout::UNDEFINED,
            Self::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            Self::DepthStencilAttachment => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            Self::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            Self::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            Self::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            Self::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            Self::PresentSrc => vk::ImageLayout::PRESENT_SRC_KHR,
            Self::General => vk::ImageLayout::GENERAL,
        }
    }

    /// Check if this is a depth/stencil layout.
    pub fn is_depth_stencil(self) -> bool {
        matches!(
            self,
            Self::DepthStencilAttachment | Self::DepthStencilReadOnly
        )
    }
}

/// Last-known access of a resource: layout (textures only), access mask and
/// pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessState {
    pub layout: TextureLayout,
    pub access: vk::AccessFlags,
    pub stages: vk::PipelineStageFlags,
}

impl AccessState {
    /// State of a resource nobody has touched yet.
    pub const INITIAL: Self = Self {
        layout: TextureLayout::Undefined,
        access: vk::AccessFlags::empty(),
        stages: vk::PipelineStageFlags::TOP_OF_PIPE,
    };

    pub fn new(
        layout: TextureLayout,
        access: vk::AccessFlags,
        stages: vk::PipelineStageFlags,
    ) -> Self {
        Self {
            layout,
            access,
            stages,
        }
    }

    /// Whether the access only reads. An empty access is not a read.
    pub fn is_read_only(&self) -> bool {
        !self.access.is_empty() && !self.access.intersects(WRITE_ACCESS)
    }

    /// Whether the access writes memory.
    pub fn is_write(&self) -> bool {
        self.access.intersects(WRITE_ACCESS)
    }

    /// State a texture is left in when it rests in `layout` between passes.
    ///
    /// Readable resting layouts are made visible to every shader stage so the
    /// next sampler does not need another barrier.
    pub fn resting(layout: TextureLayout) -> Self {
        match layout {
            TextureLayout::ShaderReadOnly => {
                Self::new(layout, vk::AccessFlags::SHADER_READ, ALL_SHADER_STAGES)
            }
            TextureLayout::General => Self::new(
                layout,
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                ALL_SHADER_STAGES,
            ),
            TextureLayout::PresentSrc => TextureAccess::Present.state(),
            TextureLayout::TransferSrc => TextureAccess::TransferSrc.state(),
            TextureLayout::TransferDst => TextureAccess::TransferDst.state(),
            TextureLayout::ColorAttachment => TextureAccess::ColorAttachment.state(),
            TextureLayout::DepthStencilAttachment => TextureAccess::DepthStencilAttachment.state(),
            TextureLayout::DepthStencilReadOnly => TextureAccess::DepthStencilReadOnly.state(),
            TextureLayout::Undefined => Self::INITIAL,
        }
    }
}

/// Map shader stages to the pipeline stages they execute in.
pub fn shader_stage_flags(stages: ShaderStages) -> vk::PipelineStageFlags {
    let mut result = vk::PipelineStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        result |= vk::PipelineStageFlags::VERTEX_SHADER;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        result |= vk::PipelineStageFlags::FRAGMENT_SHADER;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        result |= vk::PipelineStageFlags::COMPUTE_SHADER;
    }
    if result.is_empty() {
        result = ALL_SHADER_STAGES;
    }
    result
}

/// How a texture is about to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureAccess {
    ColorAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    /// Sampled from the given shader stages.
    Sampled(vk::PipelineStageFlags),
    /// Sampled while it is also the read-only depth/stencil attachment.
    SampledDepthStencil(vk::PipelineStageFlags),
    /// Read and written as a storage image from the given shader stages.
    Storage(vk::PipelineStageFlags),
    TransferSrc,
    TransferDst,
    Present,
}

impl TextureAccess {
    pub fn state(self) -> AccessState {
        match self {
            Self::ColorAttachment => AccessState::new(
                TextureLayout::ColorAttachment,
                vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            ),
            Self::DepthStencilAttachment => AccessState::new(
                TextureLayout::DepthStencilAttachment,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            ),
            Self::DepthStencilReadOnly => AccessState::new(
                TextureLayout::DepthStencilReadOnly,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            ),
            Self::Sampled(stages) => AccessState::new(
                TextureLayout::ShaderReadOnly,
                vk::AccessFlags::SHADER_READ,
                stages,
            ),
            Self::SampledDepthStencil(stages) => AccessState::new(
                TextureLayout::DepthStencilReadOnly,
                vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
                    | stages,
            ),
            Self::Storage(stages) => AccessState::new(
                TextureLayout::General,
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                stages,
            ),
            Self::TransferSrc => AccessState::new(
                TextureLayout::TransferSrc,
                vk::AccessFlags::TRANSFER_READ,
                vk::PipelineStageFlags::TRANSFER,
            ),
            Self::TransferDst => AccessState::new(
                TextureLayout::TransferDst,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            Self::Present => AccessState::new(
                TextureLayout::PresentSrc,
                vk::AccessFlags::empty(),
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            ),
        }
    }
}

/// How a buffer is about to be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    Vertex,
    Index,
    Uniform(vk::PipelineStageFlags),
    Storage(vk::PipelineStageFlags),
    TransferSrc,
    TransferDst,
    HostRead,
}

impl BufferAccess {
    pub fn state(self) -> AccessState {
        let (access, stages) = match self {
            Self::Vertex => (
                vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
                vk::PipelineStageFlags::VERTEX_INPUT,
            ),
            Self::Index => (
                vk::AccessFlags::INDEX_READ,
                vk::PipelineStageFlags::VERTEX_INPUT,
            ),
            Self::Uniform(stages) => (vk::AccessFlags::UNIFORM_READ, stages),
            Self::Storage(stages) => (
                vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
                stages,
            ),
            Self::TransferSrc => (
                vk::AccessFlags::TRANSFER_READ,
                vk::PipelineStageFlags::TRANSFER,
            ),
            Self::TransferDst => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            Self::HostRead => (vk::AccessFlags::HOST_READ, vk::PipelineStageFlags::HOST),
        };
        AccessState::new(TextureLayout::Undefined, access, stages)
    }
}
