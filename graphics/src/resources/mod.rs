//! GPU resources.
//!
//! This module contains the resource handles created by [`GraphicsDevice`]:
//! - [`Buffer`] - GPU memory buffer, optionally with one allocation per frame in flight
//! - [`Texture`] - GPU image with its view and sampler
//! - [`Shader`] - shader modules, their layouts and reflection data
//!
//! Resources are reference-counted with [`Arc`] and can be shared across
//! threads. Contexts only ever borrow them; dropping the last `Arc` queues the
//! native objects for deferred destruction.
//!
//! [`GraphicsDevice`]: crate::GraphicsDevice
//! [`Arc`]: std::sync::Arc

mod buffer;
mod shader;
mod texture;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

pub use buffer::{Buffer, BufferSlot};
pub use shader::{
    BindingKind, MAX_BINDINGS_PER_SET, MAX_DESCRIPTOR_SETS, ResourceBinding, Shader,
    ShaderDescriptor, ShaderId, ShaderReflection, ShaderStage, ShaderStageSource, ShaderStages,
    VertexAttribute, VertexBufferLayout, VertexFormat,
};
pub use texture::Texture;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of one physical resource.
///
/// Ids are never reused, so state keyed by an id can never be confused with a
/// later resource that happens to receive the same native handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Ids of resources whose handles were dropped.
///
/// The device drains this at frame boundaries to forget tracker state and
/// evict cache entries that reference dead resources.
#[derive(Debug, Default)]
pub(crate) struct RetiredResources {
    ids: Mutex<Vec<ResourceId>>,
}

impl RetiredResources {
    pub(crate) fn retire(&self, id: ResourceId) {
        self.ids.lock().push(id);
    }

    pub(crate) fn drain(&self) -> Vec<ResourceId> {
        std::mem::take(&mut *self.ids.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }

    #[test]
    fn test_retired_drain_empties_queue() {
        let retired = RetiredResources::default();
        let id = ResourceId::next();
        retired.retire(id);
        assert_eq!(retired.drain(), vec![id]);
        assert!(retired.drain().is_empty());
    }
}
