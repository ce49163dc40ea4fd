//! Shader resource and reflection data.
//!
//! Shaders arrive as SPIR-V plus a [`ShaderReflection`] produced by the
//! asset pipeline. The reflection is consumed read-only: binding calls look up
//! `(set, binding)` locations by name, and render-pass derivation reads the
//! fragment outputs.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;

use super::{ResourceId, RetiredResources};
use crate::backend::GpuShader;

/// Shader identity. Pipelines are cached per shader id.
pub type ShaderId = ResourceId;

/// Upper bound on descriptor set indices.
pub const MAX_DESCRIPTOR_SETS: u32 = 4;
/// Upper bound on binding indices within one set.
pub const MAX_BINDINGS_PER_SET: u32 = 32;

/// Shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment shader.
    Fragment,
    /// Compute shader.
    Compute,
}

bitflags! {
    /// Shader stages that can access a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex shader stage.
        const VERTEX = 1 << 0;
        /// Fragment shader stage.
        const FRAGMENT = 1 << 1;
        /// Compute shader stage.
        const COMPUTE = 1 << 2;
    }
}

impl From<ShaderStage> for ShaderStages {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => Self::VERTEX,
            ShaderStage::Fragment => Self::FRAGMENT,
            ShaderStage::Compute => Self::COMPUTE,
        }
    }
}

/// Kind of resource a binding slot expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Uniform buffer.
    UniformBuffer,
    /// Read-write storage buffer.
    StorageBuffer,
    /// Combined image and sampler.
    SampledTexture,
    /// Read-write storage image.
    StorageTexture,
}

impl BindingKind {
    /// Whether the slot takes a buffer.
    pub fn is_buffer(self) -> bool {
        matches!(self, Self::UniformBuffer | Self::StorageBuffer)
    }
}

/// Location and type of one named shader resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceBinding {
    pub set: u32,
    pub binding: u32,
    pub kind: BindingKind,
    pub stages: ShaderStages,
}

/// Vertex attribute element format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Uint32x4,
    Sint32,
    Unorm8x4,
    Snorm8x4,
}

/// One vertex input attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub buffer: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Stride and step rate of one vertex buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub per_instance: bool,
}

/// Reflection data of a shader program.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderReflection {
    resources: HashMap<String, ResourceBinding>,
    fragment_outputs: Vec<u32>,
    vertex_buffers: Vec<VertexBufferLayout>,
    vertex_attributes: Vec<VertexAttribute>,
}

impl ShaderReflection {
    /// Create empty reflection data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a named resource.
    ///
    /// # Panics
    ///
    /// Panics if the set or binding index exceeds the supported range.
    pub fn with_resource(mut self, name: impl Into<String>, binding: ResourceBinding) -> Self {
        assert!(
            binding.set < MAX_DESCRIPTOR_SETS && binding.binding < MAX_BINDINGS_PER_SET,
            "binding ({}, {}) out of range",
            binding.set,
            binding.binding
        );
        self.resources.insert(name.into(), binding);
        self
    }

    /// Declare a uniform buffer.
    pub fn with_uniform_buffer(
        self,
        name: impl Into<String>,
        set: u32,
        binding: u32,
        stages: ShaderStages,
    ) -> Self {
        self.with_resource(
            name,
            ResourceBinding {
                set,
                binding,
                kind: BindingKind::UniformBuffer,
                stages,
            },
        )
    }

    /// Declare a storage buffer.
    pub fn with_storage_buffer(
        self,
        name: impl Into<String>,
        set: u32,
        binding: u32,
        stages: ShaderStages,
    ) -> Self {
        self.with_resource(
            name,
            ResourceBinding {
                set,
                binding,
                kind: BindingKind::StorageBuffer,
                stages,
            },
        )
    }

    /// Declare a sampled texture.
    pub fn with_texture(
        self,
        name: impl Into<String>,
        set: u32,
        binding: u32,
        stages: ShaderStages,
    ) -> Self {
        self.with_resource(
            name,
            ResourceBinding {
                set,
                binding,
                kind: BindingKind::SampledTexture,
                stages,
            },
        )
    }

    /// Declare a storage image.
    pub fn with_storage_texture(
        self,
        name: impl Into<String>,
        set: u32,
        binding: u32,
        stages: ShaderStages,
    ) -> Self {
        self.with_resource(
            name,
            ResourceBinding {
                set,
                binding,
                kind: BindingKind::StorageTexture,
                stages,
            },
        )
    }

    /// Declare a fragment output writing color attachment `index`.
    pub fn with_fragment_output(mut self, index: u32) -> Self {
        if !self.fragment_outputs.contains(&index) {
            self.fragment_outputs.push(index);
            self.fragment_outputs.sort_unstable();
        }
        self
    }

    /// Declare a vertex buffer slot. Slots are numbered in declaration order.
    pub fn with_vertex_buffer(mut self, layout: VertexBufferLayout) -> Self {
        self.vertex_buffers.push(layout);
        self
    }

    /// Declare a vertex attribute.
    pub fn with_vertex_attribute(mut self, attribute: VertexAttribute) -> Self {
        self.vertex_attributes.push(attribute);
        self
    }

    /// Location of a named resource, or `None` if the shader does not use it.
    pub fn location(&self, name: &str) -> Option<ResourceBinding> {
        self.resources.get(name).copied()
    }

    /// All declared resources, ordered by `(set, binding)`.
    pub fn resources(&self) -> Vec<ResourceBinding> {
        let mut bindings: Vec<_> = self.resources.values().copied().collect();
        bindings.sort_by_key(|b| (b.set, b.binding));
        bindings
    }

    /// Number of descriptor sets the pipeline layout needs.
    pub fn set_count(&self) -> u32 {
        self.resources
            .values()
            .map(|b| b.set + 1)
            .max()
            .unwrap_or(0)
    }

    /// Color attachment indices written by the fragment stage.
    pub fn fragment_outputs(&self) -> &[u32] {
        &self.fragment_outputs
    }

    pub fn vertex_buffers(&self) -> &[VertexBufferLayout] {
        &self.vertex_buffers
    }

    pub fn vertex_attributes(&self) -> &[VertexAttribute] {
        &self.vertex_attributes
    }
}

/// SPIR-V code for one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderStageSource {
    pub stage: ShaderStage,
    pub spirv: Vec<u32>,
    pub entry_point: String,
}

impl ShaderStageSource {
    /// Create a new stage source.
    pub fn new(stage: ShaderStage, spirv: impl Into<Vec<u32>>, entry_point: impl Into<String>) -> Self {
        Self {
            stage,
            spirv: spirv.into(),
            entry_point: entry_point.into(),
        }
    }

    /// Create a vertex stage source.
    pub fn vertex(spirv: impl Into<Vec<u32>>, entry_point: impl Into<String>) -> Self {
        Self::new(ShaderStage::Vertex, spirv, entry_point)
    }

    /// Create a fragment stage source.
    pub fn fragment(spirv: impl Into<Vec<u32>>, entry_point: impl Into<String>) -> Self {
        Self::new(ShaderStage::Fragment, spirv, entry_point)
    }

    /// Create a compute stage source.
    pub fn compute(spirv: impl Into<Vec<u32>>, entry_point: impl Into<String>) -> Self {
        Self::new(ShaderStage::Compute, spirv, entry_point)
    }
}

/// Descriptor for creating a shader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderDescriptor {
    pub label: Option<String>,
    pub stages: Vec<ShaderStageSource>,
    pub reflection: ShaderReflection,
}

impl ShaderDescriptor {
    /// Create a descriptor with the given reflection data and no stages.
    pub fn new(reflection: ShaderReflection) -> Self {
        Self {
            label: None,
            stages: Vec::new(),
            reflection,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_stage(mut self, stage: ShaderStageSource) -> Self {
        self.stages.push(stage);
        self
    }

    /// Whether this describes a compute program.
    pub fn is_compute(&self) -> bool {
        self.stages.iter().any(|s| s.stage == ShaderStage::Compute)
    }
}

/// A compiled shader program.
pub struct Shader {
    id: ShaderId,
    label: Option<String>,
    compute: bool,
    reflection: ShaderReflection,
    gpu: GpuShader,
    retired: Arc<RetiredResources>,
}

impl Shader {
    pub(crate) fn new(
        descriptor: &ShaderDescriptor,
        gpu: GpuShader,
        retired: Arc<RetiredResources>,
    ) -> Self {
        Self {
            id: ResourceId::next(),
            label: descriptor.label.clone(),
            compute: descriptor.is_compute(),
            reflection: descriptor.reflection.clone(),
            gpu,
            retired,
        }
    }

    pub fn id(&self) -> ShaderId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether this is a compute program.
    pub fn is_compute(&self) -> bool {
        self.compute
    }

    pub fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }

    /// Backend modules and layouts.
    pub fn gpu(&self) -> &GpuShader {
        &self.gpu
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        self.retired.retire(self.id);
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("compute", &self.compute)
            .finish_non_exhaustive()
    }
}

static_assertions::assert_impl_all!(Shader: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_lookup() {
        let reflection = ShaderReflection::new()
            .with_uniform_buffer("camera", 0, 0, ShaderStages::VERTEX)
            .with_texture("albedo", 1, 2, ShaderStages::FRAGMENT);

        let albedo = reflection.location("albedo").unwrap();
        assert_eq!((albedo.set, albedo.binding), (1, 2));
        assert_eq!(albedo.kind, BindingKind::SampledTexture);
        assert!(reflection.location("normal_map").is_none());
        assert_eq!(reflection.set_count(), 2);
    }

    #[test]
    fn test_resources_sorted_by_location() {
        let reflection = ShaderReflection::new()
            .with_texture("b", 1, 0, ShaderStages::FRAGMENT)
            .with_uniform_buffer("a", 0, 3, ShaderStages::VERTEX)
            .with_uniform_buffer("c", 0, 1, ShaderStages::VERTEX);
        let order: Vec<_> = reflection
            .resources()
            .iter()
            .map(|b| (b.set, b.binding))
            .collect();
        assert_eq!(order, vec![(0, 1), (0, 3), (1, 0)]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_binding_panics() {
        let _ = ShaderReflection::new().with_texture("t", MAX_DESCRIPTOR_SETS, 0, ShaderStages::FRAGMENT);
    }

    #[test]
    fn test_fragment_outputs_deduplicated() {
        let reflection = ShaderReflection::new()
            .with_fragment_output(1)
            .with_fragment_output(0)
            .with_fragment_output(1);
        assert_eq!(reflection.fragment_outputs(), &[0, 1]);
    }

    #[test]
    fn test_compute_descriptor() {
        let desc = ShaderDescriptor::new(ShaderReflection::new())
            .with_stage(ShaderStageSource::compute(vec![0x0723_0203], "main"));
        assert!(desc.is_compute());
    }
}
