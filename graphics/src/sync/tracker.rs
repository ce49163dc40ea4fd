//! Resource state tracking for barrier placement.
//!
//! The tracker is owned by the [`GraphicsDevice`](crate::GraphicsDevice) and
//! shared by every context. It is only mutated while a context replays its
//! command log in `end()`, and it persists across frames: the layout a texture
//! was left in at the end of frame N is its starting layout in frame N+1.

use std::collections::HashMap;

use super::layout::AccessState;
use crate::resources::ResourceId;

/// A state change that needs a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub before: AccessState,
    pub after: AccessState,
}

/// Last-known access state of every buffer slot and texture.
#[derive(Debug, Clone, Default)]
pub struct ResourceStateTracker {
    states: HashMap<ResourceId, AccessState>,
}

impl ResourceStateTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-known state, [`AccessState::INITIAL`] for unseen resources.
    pub fn state(&self, id: ResourceId) -> AccessState {
        self.states
            .get(&id)
            .copied()
            .unwrap_or(AccessState::INITIAL)
    }

    /// Overwrite the state without producing a barrier.
    ///
    /// Used for resources whose state was changed outside of replay, such as
    /// an immediate texture upload or an externally owned image.
    pub fn set_state(&mut self, id: ResourceId, state: AccessState) {
        self.states.insert(id, state);
    }

    /// Record that `id` is about to be accessed as `required`.
    ///
    /// Returns the transition a barrier must cover, or `None` when the access
    /// needs no synchronization:
    /// - the layout is unchanged and nothing has accessed the resource yet, or
    /// - the layout is unchanged and both the previous and the new access
    ///   only read. The stored state then accumulates both accesses so a
    ///   later writer waits for all of them.
    ///
    /// Every other combination (any write, any layout change) needs a barrier.
    pub fn require(&mut self, id: ResourceId, required: AccessState) -> Option<Transition> {
        let current = self.state(id);

        if current.layout == required.layout {
            if current.access.is_empty() {
                self.states.insert(id, required);
                return None;
            }
            if current.is_read_only() && required.is_read_only() {
                self.states.insert(
                    id,
                    AccessState::new(
                        current.layout,
                        current.access | required.access,
                        current.stages | required.stages,
                    ),
                );
                return None;
            }
        }

        self.states.insert(id, required);
        Some(Transition {
            before: current,
            after: required,
        })
    }

    /// Drop the state of a resource that no longer exists.
    pub fn forget(&mut self, id: ResourceId) {
        self.states.remove(&id);
    }

    /// Number of tracked resources.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{BufferAccess, TextureAccess, TextureLayout};
    use ash::vk;

    fn sampled() -> AccessState {
        TextureAccess::Sampled(vk::PipelineStageFlags::FRAGMENT_SHADER).state()
    }

    #[test]
    fn test_first_texture_use_transitions_from_undefined() {
        let mut tracker = ResourceStateTracker::new();
        let id = ResourceId::next();
        let transition = tracker.require(id, sampled()).unwrap();
        assert_eq!(transition.before.layout, TextureLayout::Undefined);
        assert_eq!(transition.after.layout, TextureLayout::ShaderReadOnly);
        assert_eq!(tracker.state(id).layout, TextureLayout::ShaderReadOnly);
    }

    #[test]
    fn test_read_after_read_is_elided() {
        let mut tracker = ResourceStateTracker::new();
        let id = ResourceId::next();
        assert!(tracker.require(id, sampled()).is_some());
        assert!(tracker.require(id, sampled()).is_none());

        let compute = TextureAccess::Sampled(vk::PipelineStageFlags::COMPUTE_SHADER).state();
        assert!(tracker.require(id, compute).is_none());
        let merged = tracker.state(id);
        assert!(merged.stages.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
        assert!(merged.stages.contains(vk::PipelineStageFlags::COMPUTE_SHADER));
    }

    #[test]
    fn test_write_after_write_always_barriers() {
        let mut tracker = ResourceStateTracker::new();
        let id = ResourceId::next();
        let color = TextureAccess::ColorAttachment.state();
        assert!(tracker.require(id, color).is_some());
        let again = tracker.require(id, color).unwrap();
        assert_eq!(again.before, color);
    }

    #[test]
    fn test_write_after_read_barriers() {
        let mut tracker = ResourceStateTracker::new();
        let id = ResourceId::next();
        tracker.require(id, BufferAccess::Vertex.state());
        let t = tracker.require(id, BufferAccess::TransferDst.state()).unwrap();
        assert_eq!(t.before.access, vk::AccessFlags::VERTEX_ATTRIBUTE_READ);
    }

    #[test]
    fn test_untouched_buffer_needs_no_barrier() {
        let mut tracker = ResourceStateTracker::new();
        let id = ResourceId::next();
        assert!(tracker.require(id, BufferAccess::TransferDst.state()).is_none());
        assert!(tracker.require(id, BufferAccess::Vertex.state()).is_some());
    }

    #[test]
    fn test_read_with_layout_change_barriers() {
        let mut tracker = ResourceStateTracker::new();
        let id = ResourceId::next();
        tracker.set_state(id, AccessState::resting(TextureLayout::ShaderReadOnly));
        assert!(tracker
            .require(id, TextureAccess::TransferSrc.state())
            .is_some());
    }

    #[test]
    fn test_sampled_depth_covers_read_only_attachment() {
        let mut tracker = ResourceStateTracker::new();
        let id = ResourceId::next();
        let sampled = TextureAccess::SampledDepthStencil(vk::PipelineStageFlags::FRAGMENT_SHADER);
        let transition = tracker.require(id, sampled.state()).unwrap();
        assert_eq!(transition.after.layout, TextureLayout::DepthStencilReadOnly);
        assert!(tracker
            .require(id, TextureAccess::DepthStencilReadOnly.state())
            .is_none());
        assert!(tracker
            .require(id, TextureAccess::DepthStencilAttachment.state())
            .is_some());
    }

    #[test]
    fn test_forget() {
        let mut tracker = ResourceStateTracker::new();
        let id = ResourceId::next();
        tracker.set_state(id, sampled());
        assert_eq!(tracker.len(), 1);
        tracker.forget(id);
        assert!(tracker.is_empty());
        assert_eq!(tracker.state(id), AccessState::INITIAL);
    }
}
