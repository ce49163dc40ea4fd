//! Type conversions between Ember types and Vulkan types.
//!
//! Every translation is an exhaustive match. Values that have no native
//! counterpart are reported as [`GraphicsError::UnsupportedEnumValue`] instead
//! of being mapped to a fallback.

use ash::vk;

use crate::error::GraphicsError;
use crate::resources::{BindingKind, ShaderStages, VertexFormat};
use crate::types::{
    AddressMode, BlendComponent, BlendFactor, BlendOp, BlendState, BufferUsage, ColorWrites,
    CompareFunction, CullMode, DataType, FillMode, FilterMode, FrontFace, IndexFormat,
    PixelLayout, PrimitiveType, StencilOp, StencilState, TextureFormat, TextureUsage,
};

/// Every supported `(layout, bits per channel, data type)` triple and its
/// native format. Each triple and each native format appears once.
static FORMAT_TABLE: &[(PixelLayout, u8, DataType, vk::Format)] = &[
    // R
    (PixelLayout::R, 8, DataType::Unorm, vk::Format::R8_UNORM),
    (PixelLayout::R, 8, DataType::Snorm, vk::Format::R8_SNORM),
    (PixelLayout::R, 8, DataType::Uint, vk::Format::R8_UINT),
    (PixelLayout::R, 8, DataType::Sint, vk::Format::R8_SINT),
    (PixelLayout::R, 8, DataType::Srgb, vk::Format::R8_SRGB),
    (PixelLayout::R, 16, DataType::Unorm, vk::Format::R16_UNORM),
    (PixelLayout::R, 16, DataType::Snorm, vk::Format::R16_SNORM),
    (PixelLayout::R, 16, DataType::Uint, vk::Format::R16_UINT),
    (PixelLayout::R, 16, DataType::Sint, vk::Format::R16_SINT),
    (PixelLayout::R, 16, DataType::Float, vk::Format::R16_SFLOAT),
    (PixelLayout::R, 32, DataType::Uint, vk::Format::R32_UINT),
    (PixelLayout::R, 32, DataType::Sint, vk::Format::R32_SINT),
    (PixelLayout::R, 32, DataType::Float, vk::Format::R32_SFLOAT),
    // RG
    (PixelLayout::Rg, 8, DataType::Unorm, vk::Format::R8G8_UNORM),
    (PixelLayout::Rg, 8, DataType::Snorm, vk::Format::R8G8_SNORM),
    (PixelLayout::Rg, 8, DataType::Uint, vk::Format::R8G8_UINT),
    (PixelLayout::Rg, 8, DataType::Sint, vk::Format::R8G8_SINT),
    (PixelLayout::Rg, 16, DataType::Unorm, vk::Format::R16G16_UNORM),
    (PixelLayout::Rg, 16, DataType::Uint, vk::Format::R16G16_UINT),
    (PixelLayout::Rg, 16, DataType::Sint, vk::Format::R16G16_SINT),
    (PixelLayout::Rg, 16, DataType::Float, vk::Format::R16G16_SFLOAT),
    (PixelLayout::Rg, 32, DataType::Uint, vk::Format::R32G32_UINT),
    (PixelLayout::Rg, 32, DataType::Sint, vk::Format::R32G32_SINT),
    (PixelLayout::Rg, 32, DataType::Float, vk::Format::R32G32_SFLOAT),
    // RGB
    (PixelLayout::Rgb, 8, DataType::Unorm, vk::Format::R8G8B8_UNORM),
    (PixelLayout::Rgb, 8, DataType::Srgb, vk::Format::R8G8B8_SRGB),
    (PixelLayout::Rgb, 16, DataType::Float, vk::Format::R16G16B16_SFLOAT),
    (PixelLayout::Rgb, 32, DataType::Uint, vk::Format::R32G32B32_UINT),
    (PixelLayout::Rgb, 32, DataType::Sint, vk::Format::R32G32B32_SINT),
    (PixelLayout::Rgb, 32, DataType::Float, vk::Format::R32G32B32_SFLOAT),
    // RGBA
    (PixelLayout::Rgba, 8, DataType::Unorm, vk::Format::R8G8B8A8_UNORM),
    (PixelLayout::Rgba, 8, DataType::Snorm, vk::Format::R8G8B8A8_SNORM),
    (PixelLayout::Rgba, 8, DataType::Uint, vk::Format::R8G8B8A8_UINT),
    (PixelLayout::Rgba, 8, DataType::Sint, vk::Format::R8G8B8A8_SINT),
    (PixelLayout::Rgba, 8, DataType::Srgb, vk::Format::R8G8B8A8_SRGB),
    (PixelLayout::Rgba, 16, DataType::Unorm, vk::Format::R16G16B16A16_UNORM),
    (PixelLayout::Rgba, 16, DataType::Snorm, vk::Format::R16G16B16A16_SNORM),
    (PixelLayout::Rgba, 16, DataType::Uint, vk::Format::R16G16B16A16_UINT),
    (PixelLayout::Rgba, 16, DataType::Sint, vk::Format::R16G16B16A16_SINT),
    (PixelLayout::Rgba, 16, DataType::Float, vk::Format::R16G16B16A16_SFLOAT),
    (PixelLayout::Rgba, 32, DataType::Uint, vk::Format::R32G32B32A32_UINT),
    (PixelLayout::Rgba, 32, DataType::Sint, vk::Format::R32G32B32A32_SINT),
    (PixelLayout::Rgba, 32, DataType::Float, vk::Format::R32G32B32A32_SFLOAT),
    // BGRA
    (PixelLayout::Bgra, 8, DataType::Unorm, vk::Format::B8G8R8A8_UNORM),
    (PixelLayout::Bgra, 8, DataType::Srgb, vk::Format::B8G8R8A8_SRGB),
    // Depth / stencil
    (PixelLayout::Depth, 16, DataType::Unorm, vk::Format::D16_UNORM),
    (PixelLayout::Depth, 32, DataType::Float, vk::Format::D32_SFLOAT),
    (PixelLayout::DepthStencil, 24, DataType::Unorm, vk::Format::D24_UNORM_S8_UINT),
    (PixelLayout::DepthStencil, 32, DataType::Float, vk::Format::D32_SFLOAT_S8_UINT),
    (PixelLayout::Stencil, 8, DataType::Uint, vk::Format::S8_UINT),
];

/// All entries of the format table, as engine formats.
pub fn supported_formats() -> impl Iterator<Item = TextureFormat> {
    FORMAT_TABLE
        .iter()
        .map(|&(layout, bits, data_type, _)| TextureFormat::new(layout, bits, data_type))
}

/// Native format for an engine format.
pub fn get_vk_format(format: TextureFormat) -> Result<vk::Format, GraphicsError> {
    FORMAT_TABLE
        .iter()
        .find(|&&(layout, bits, data_type, _)| {
            layout == format.layout
                && bits == format.bits_per_channel
                && data_type == format.data_type
        })
        .map(|&(.., vk_format)| vk_format)
        .ok_or(GraphicsError::UnsupportedEnumValue {
            kind: "TextureFormat",
            value: encode_format_triple(format),
        })
}

/// Engine format for a native format. Inverse of [`get_vk_format`].
pub fn decompose_vk_format(format: vk::Format) -> Result<TextureFormat, GraphicsError> {
    FORMAT_TABLE
        .iter()
        .find(|&&(.., vk_format)| vk_format == format)
        .map(|&(layout, bits, data_type, _)| TextureFormat::new(layout, bits, data_type))
        .ok_or(GraphicsError::UnsupportedEnumValue {
            kind: "vk::Format",
            value: i64::from(format.as_raw()),
        })
}

// layout << 16 | bits << 8 | data type, so the error names the exact triple.
fn encode_format_triple(format: TextureFormat) -> i64 {
    ((format.layout as i64) << 16)
        | (i64::from(format.bits_per_channel) << 8)
        | format.data_type as i64
}

/// Image aspect flags for a format.
pub fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    let mut aspect = vk::ImageAspectFlags::empty();
    if format.has_depth() {
        aspect |= vk::ImageAspectFlags::DEPTH;
    }
    if format.has_stencil() {
        aspect |= vk::ImageAspectFlags::STENCIL;
    }
    if aspect.is_empty() {
        aspect = vk::ImageAspectFlags::COLOR;
    }
    aspect
}

/// Convert BufferUsage flags to Vulkan buffer usage flags.
pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut result = vk::BufferUsageFlags::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        result |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= vk::BufferUsageFlags::TRANSFER_DST;
    }

    // MAP_READ / MAP_WRITE select the memory location, not a usage bit.
    result
}

/// Convert TextureUsage flags to Vulkan image usage flags.
pub fn convert_texture_usage(usage: TextureUsage, format: TextureFormat) -> vk::ImageUsageFlags {
    let mut result = vk::ImageUsageFlags::empty();

    if usage.contains(TextureUsage::COPY_SRC) {
        result |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::COPY_DST) {
        result |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(TextureUsage::TEXTURE_BINDING) {
        result |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE_BINDING) {
        result |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
        if format.is_depth_stencil() {
            result |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        } else {
            result |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
    }

    result
}

/// Convert FilterMode to Vulkan filter.
pub fn convert_filter_mode(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Nearest => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

/// Convert FilterMode to Vulkan mipmap filter mode.
pub fn convert_mipmap_filter_mode(mode: FilterMode) -> vk::SamplerMipmapMode {
    match mode {
        FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
        FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

/// Convert AddressMode to Vulkan sampler address mode.
pub fn convert_address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
    }
}

/// Convert CompareFunction to Vulkan compare op.
pub fn convert_compare_function(func: CompareFunction) -> vk::CompareOp {
    match func {
        CompareFunction::Never => vk::CompareOp::NEVER,
        CompareFunction::Less => vk::CompareOp::LESS,
        CompareFunction::Equal => vk::CompareOp::EQUAL,
        CompareFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareFunction::Greater => vk::CompareOp::GREATER,
        CompareFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareFunction::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn convert_blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::SrcAlphaSaturated => vk::BlendFactor::SRC_ALPHA_SATURATE,
    }
}

/// Convert a blend equation. `BlendOp::None` has no native equation.
pub fn convert_blend_op(op: BlendOp) -> Result<vk::BlendOp, GraphicsError> {
    match op {
        BlendOp::None => Err(GraphicsError::UnsupportedEnumValue {
            kind: "BlendOp",
            value: op as i64,
        }),
        BlendOp::Add => Ok(vk::BlendOp::ADD),
        BlendOp::Subtract => Ok(vk::BlendOp::SUBTRACT),
        BlendOp::ReverseSubtract => Ok(vk::BlendOp::REVERSE_SUBTRACT),
        BlendOp::Min => Ok(vk::BlendOp::MIN),
        BlendOp::Max => Ok(vk::BlendOp::MAX),
    }
}

pub fn convert_color_writes(writes: ColorWrites) -> vk::ColorComponentFlags {
    let mut result = vk::ColorComponentFlags::empty();
    if writes.contains(ColorWrites::RED) {
        result |= vk::ColorComponentFlags::R;
    }
    if writes.contains(ColorWrites::GREEN) {
        result |= vk::ColorComponentFlags::G;
    }
    if writes.contains(ColorWrites::BLUE) {
        result |= vk::ColorComponentFlags::B;
    }
    if writes.contains(ColorWrites::ALPHA) {
        result |= vk::ColorComponentFlags::A;
    }
    result
}

/// Convert blend state to a Vulkan color blend attachment state.
pub fn convert_blend_state(
    state: &BlendState,
    writes: ColorWrites,
) -> Result<vk::PipelineColorBlendAttachmentState, GraphicsError> {
    let attachment = vk::PipelineColorBlendAttachmentState::default()
        .color_write_mask(convert_color_writes(writes))
        .blend_enable(state.enabled);
    if !state.enabled {
        return Ok(attachment);
    }

    let component = |c: &BlendComponent| -> Result<_, GraphicsError> {
        Ok((
            convert_blend_factor(c.src),
            convert_blend_factor(c.dst),
            convert_blend_op(c.op)?,
        ))
    };
    let (src_color, dst_color, color_op) = component(&state.color)?;
    let (src_alpha, dst_alpha, alpha_op) = component(&state.alpha)?;

    Ok(attachment
        .src_color_blend_factor(src_color)
        .dst_color_blend_factor(dst_color)
        .color_blend_op(color_op)
        .src_alpha_blend_factor(src_alpha)
        .dst_alpha_blend_factor(dst_alpha)
        .alpha_blend_op(alpha_op))
}

pub fn convert_stencil_op(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrementClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrementClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

/// Stencil face state. The reference is left at zero; it is dynamic.
pub fn convert_stencil_state(state: &StencilState) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: convert_stencil_op(state.fail_op),
        pass_op: convert_stencil_op(state.pass_op),
        depth_fail_op: convert_stencil_op(state.depth_fail_op),
        compare_op: convert_compare_function(state.compare),
        compare_mask: u32::from(state.read_mask),
        write_mask: u32::from(state.write_mask),
        reference: 0,
    }
}

pub fn convert_cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

/// Convert front face winding.
///
/// Windings are defined with clip-space +Y up. The Y-flipped viewport keeps
/// them unchanged in framebuffer space, so the mapping is direct.
pub fn convert_front_face(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub fn convert_fill_mode(mode: FillMode) -> vk::PolygonMode {
    match mode {
        FillMode::Solid => vk::PolygonMode::FILL,
        FillMode::Wireframe => vk::PolygonMode::LINE,
    }
}

pub fn convert_primitive_type(primitive: PrimitiveType) -> vk::PrimitiveTopology {
    match primitive {
        PrimitiveType::Points => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveType::Lines => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveType::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveType::Triangles => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveType::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
    }
}

pub fn convert_index_format(format: IndexFormat) -> vk::IndexType {
    match format {
        IndexFormat::Uint16 => vk::IndexType::UINT16,
        IndexFormat::Uint32 => vk::IndexType::UINT32,
    }
}

/// Convert vertex attribute format to Vulkan format.
pub fn convert_vertex_format(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float32 => vk::Format::R32_SFLOAT,
        VertexFormat::Float32x2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float32x3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float32x4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::Uint32 => vk::Format::R32_UINT,
        VertexFormat::Uint32x4 => vk::Format::R32G32B32A32_UINT,
        VertexFormat::Sint32 => vk::Format::R32_SINT,
        VertexFormat::Unorm8x4 => vk::Format::R8G8B8A8_UNORM,
        VertexFormat::Snorm8x4 => vk::Format::R8G8B8A8_SNORM,
    }
}

/// Convert our shader stage flags to Vulkan stage flags.
pub fn convert_shader_stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    let mut result = vk::ShaderStageFlags::empty();
    if stages.contains(ShaderStages::VERTEX) {
        result |= vk::ShaderStageFlags::VERTEX;
    }
    if stages.contains(ShaderStages::FRAGMENT) {
        result |= vk::ShaderStageFlags::FRAGMENT;
    }
    if stages.contains(ShaderStages::COMPUTE) {
        result |= vk::ShaderStageFlags::COMPUTE;
    }
    result
}

pub fn convert_binding_kind(kind: BindingKind) -> vk::DescriptorType {
    match kind {
        BindingKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        BindingKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        BindingKind::SampledTexture => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        BindingKind::StorageTexture => vk::DescriptorType::STORAGE_IMAGE,
    }
}

/// Translate a native image layout that arrived from outside the engine
/// (for example the initial layout of an externally created image).
pub fn decompose_image_layout(
    layout: vk::ImageLayout,
) -> Result<crate::sync::TextureLayout, GraphicsError> {
    use crate::sync::TextureLayout;
    Ok(match layout {
        vk::ImageLayout::UNDEFINED => TextureLayout::Undefined,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => TextureLayout::ColorAttachment,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => TextureLayout::DepthStencilAttachment,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => TextureLayout::DepthStencilReadOnly,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => TextureLayout::ShaderReadOnly,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => TextureLayout::TransferSrc,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => TextureLayout::TransferDst,
        vk::ImageLayout::PRESENT_SRC_KHR => TextureLayout::PresentSrc,
        vk::ImageLayout::GENERAL => TextureLayout::General,
        other => {
            return Err(GraphicsError::UnsupportedEnumValue {
                kind: "vk::ImageLayout",
                value: i64::from(other.as_raw()),
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_has_no_duplicates() {
        let mut triples = HashSet::new();
        let mut natives = HashSet::new();
        for &(layout, bits, data_type, vk_format) in FORMAT_TABLE {
            assert!(triples.insert((layout, bits, data_type)));
            assert!(natives.insert(vk_format));
        }
    }

    #[test]
    fn test_known_formats() {
        assert_eq!(
            get_vk_format(TextureFormat::RGBA8_UNORM).unwrap(),
            vk::Format::R8G8B8A8_UNORM
        );
        assert_eq!(
            get_vk_format(TextureFormat::DEPTH24_STENCIL8).unwrap(),
            vk::Format::D24_UNORM_S8_UINT
        );
        assert_eq!(
            decompose_vk_format(vk::Format::B8G8R8A8_SRGB).unwrap(),
            TextureFormat::BGRA8_SRGB
        );
    }

    #[test]
    fn test_unknown_triple_is_an_error() {
        let bogus = TextureFormat::new(PixelLayout::Bgra, 32, DataType::Snorm);
        assert!(matches!(
            get_vk_format(bogus),
            Err(GraphicsError::UnsupportedEnumValue { kind: "TextureFormat", .. })
        ));
    }

    #[test]
    fn test_unknown_native_format_carries_value() {
        let err = decompose_vk_format(vk::Format::BC7_UNORM_BLOCK).unwrap_err();
        assert_eq!(
            err,
            GraphicsError::UnsupportedEnumValue {
                kind: "vk::Format",
                value: i64::from(vk::Format::BC7_UNORM_BLOCK.as_raw()),
            }
        );
    }

    #[test]
    fn test_blend_op_none_is_rejected() {
        assert!(convert_blend_op(BlendOp::None).is_err());
        assert_eq!(convert_blend_op(BlendOp::Max).unwrap(), vk::BlendOp::MAX);
    }

    #[test]
    fn test_disabled_blend_ignores_ops() {
        let state = BlendState {
            enabled: false,
            color: BlendComponent {
                op: BlendOp::None,
                ..BlendComponent::REPLACE
            },
            alpha: BlendComponent::REPLACE,
        };
        let attachment = convert_blend_state(&state, ColorWrites::ALL).unwrap();
        assert_eq!(attachment.blend_enable, vk::FALSE);
        assert_eq!(attachment.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    /// Signed area of a clip-space triangle after the native viewport
    /// transform, using the rasterizer's facing formula. Positive means
    /// counter-clockwise.
    fn framebuffer_area(viewport: vk::Viewport, points: [(f32, f32); 3]) -> f32 {
        let to_framebuffer = |(x, y): (f32, f32)| {
            (
                viewport.width / 2.0 * x + viewport.x + viewport.width / 2.0,
                viewport.height / 2.0 * y + viewport.y + viewport.height / 2.0,
            )
        };
        let f = points.map(to_framebuffer);
        let mut sum = 0.0;
        for i in 0..3 {
            let (x0, y0) = f[i];
            let (x1, y1) = f[(i + 1) % 3];
            sum += x0 * y1 - x1 * y0;
        }
        -0.5 * sum
    }

    #[test]
    fn test_front_face_survives_flipped_viewport() {
        assert_eq!(
            convert_front_face(FrontFace::CounterClockwise),
            vk::FrontFace::COUNTER_CLOCKWISE
        );
        assert_eq!(
            convert_front_face(FrontFace::Clockwise),
            vk::FrontFace::CLOCKWISE
        );

        // Counter-clockwise with +Y up.
        let triangle = [(-0.5, -0.5), (0.5, -0.5), (0.0, 0.5)];
        let viewport = crate::types::Viewport::new(0.0, 0.0, 640.0, 480.0).to_vk();
        assert!(framebuffer_area(viewport, triangle) > 0.0);
    }

    #[test]
    fn test_aspect_masks() {
        assert_eq!(
            aspect_mask(TextureFormat::DEPTH24_STENCIL8),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_mask(TextureFormat::RGBA8_UNORM),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_unknown_image_layout() {
        assert!(decompose_image_layout(vk::ImageLayout::PREINITIALIZED).is_err());
        assert_eq!(
            decompose_image_layout(vk::ImageLayout::PRESENT_SRC_KHR).unwrap(),
            crate::sync::TextureLayout::PresentSrc
        );
    }
}
