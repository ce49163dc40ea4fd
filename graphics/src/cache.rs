//! Content-addressed caches of native objects.
//!
//! Render passes, framebuffers, pipelines and descriptor sets are created
//! lazily the first time a description is seen and reused for every later
//! equal description. Equality is structural: every field of the key must
//! match.
//!
//! Keys embed the [`ResourceId`]s of the resources an object references so
//! that entries can be evicted once those resources are dropped.

use std::collections::HashMap;
use std::hash::Hash;

use ash::vk;
use parking_lot::RwLock;

use crate::error::GraphicsError;
use crate::resources::{BindingKind, ResourceId, ShaderId};
use crate::sync::TextureLayout;
use crate::types::PipelineState;

/// A map from a description to the native object built for it.
pub struct ObjectCache<K, V> {
    name: &'static str,
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> ObjectCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Copy,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up an existing entry.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).copied()
    }

    /// Return the cached object for `key`, creating it with `create` on a miss.
    ///
    /// Equal keys always yield the same object. `create` runs at most once per
    /// key; a failed creation leaves the cache unchanged.
    pub fn get_or_create(
        &self,
        key: &K,
        create: impl FnOnce() -> Result<V, GraphicsError>,
    ) -> Result<V, GraphicsError> {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let mut entries = self.entries.write();
        if let Some(value) = entries.get(key) {
            return Ok(*value);
        }

        ember_core::profile_scope!("cache_miss");
        log::debug!("{} cache miss: {:?}", self.name, key);
        let value = create()?;
        entries.insert(key.clone(), value);
        Ok(value)
    }

    /// Remove an entry, returning the object so the caller can destroy it.
    pub fn erase(&self, key: &K) -> Result<V, GraphicsError> {
        self.entries.write().remove(key).ok_or_else(|| {
            GraphicsError::ObjectNotFound(format!("{} cache has no entry {:?}", self.name, key))
        })
    }

    /// Remove every entry for which `keep` returns false.
    pub fn evict(&self, mut keep: impl FnMut(&K) -> bool) -> Vec<V> {
        let mut evicted = Vec::new();
        self.entries.write().retain(|key, value| {
            let retain = keep(key);
            if !retain {
                evicted.push(*value);
            }
            retain
        });
        evicted
    }

    /// Remove and return every entry.
    pub fn drain(&self) -> Vec<V> {
        self.entries.write().drain().map(|(_, v)| v).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K, V> std::fmt::Debug for ObjectCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCache")
            .field("name", &self.name)
            .field("len", &self.entries.read().len())
            .finish()
    }
}

/// One attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentKey {
    pub texture: ResourceId,
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    /// Only meaningful for formats with a stencil aspect.
    pub stencil_load_op: vk::AttachmentLoadOp,
    /// Layout the attachment is in for the whole pass.
    pub layout: TextureLayout,
}

/// Description of a render pass: its color attachments and optional
/// depth/stencil attachment, in binding order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassKey {
    pub colors: Vec<AttachmentKey>,
    pub depth_stencil: Option<AttachmentKey>,
}

impl RenderPassKey {
    pub fn references(&self, id: ResourceId) -> bool {
        self.colors.iter().any(|a| a.texture == id)
            || self.depth_stencil.is_some_and(|a| a.texture == id)
    }

    pub fn attachment_count(&self) -> usize {
        self.colors.len() + usize::from(self.depth_stencil.is_some())
    }
}

/// Description of a framebuffer for one render pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FramebufferKey {
    pub render_pass: vk::RenderPass,
    /// Attachments in render pass order.
    pub attachments: Vec<(ResourceId, vk::ImageView)>,
    pub width: u32,
    pub height: u32,
}

impl FramebufferKey {
    pub fn references(&self, id: ResourceId) -> bool {
        self.attachments.iter().any(|(a, _)| *a == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineKey {
    pub shader: ShaderId,
    pub state: PipelineState,
    pub render_pass: vk::RenderPass,
    pub color_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineKey {
    pub shader: ShaderId,
}

/// What a descriptor points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKey {
    Buffer {
        id: ResourceId,
        buffer: vk::Buffer,
        range: u64,
    },
    Image {
        id: ResourceId,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: TextureLayout,
    },
}

impl DescriptorKey {
    pub fn resource(&self) -> ResourceId {
        match *self {
            Self::Buffer { id, .. } | Self::Image { id, .. } => id,
        }
    }
}

/// A populated descriptor set: one set index of one shader plus the
/// resource written to every binding of that set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorSetKey {
    pub shader: ShaderId,
    pub set: u32,
    pub layout: vk::DescriptorSetLayout,
    /// `(binding, kind, resource)` sorted by binding.
    pub entries: Vec<(u32, BindingKind, DescriptorKey)>,
}

impl DescriptorSetKey {
    pub fn references(&self, id: ResourceId) -> bool {
        self.shader == id || self.entries.iter().any(|(_, _, d)| d.resource() == id)
    }
}
