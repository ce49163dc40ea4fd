//! Pending state captured by draws and dispatches.

use std::sync::Arc;

use crate::resources::{Buffer, MAX_BINDINGS_PER_SET, MAX_DESCRIPTOR_SETS, Texture};
use crate::types::{Extent3d, IndexFormat};

/// A resource bound to a named shader slot.
#[derive(Debug, Clone)]
pub enum BoundResource {
    Buffer(Arc<Buffer>),
    Texture(Arc<Texture>),
}

/// Resources bound per `(set, binding)`. Unset slots are `None`.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    sets: Vec<Vec<Option<BoundResource>>>,
}

impl BindingTable {
    /// # Panics
    ///
    /// Panics if `set` or `binding` is beyond the supported range.
    pub fn bind(&mut self, set: u32, binding: u32, resource: BoundResource) {
        assert!(
            set < MAX_DESCRIPTOR_SETS,
            "descriptor set {set} out of range (max {MAX_DESCRIPTOR_SETS})"
        );
        assert!(
            binding < MAX_BINDINGS_PER_SET,
            "binding {binding} out of range (max {MAX_BINDINGS_PER_SET})"
        );

        let (set, binding) = (set as usize, binding as usize);
        if self.sets.len() <= set {
            self.sets.resize_with(set + 1, Vec::new);
        }
        let slots = &mut self.sets[set];
        if slots.len() <= binding {
            slots.resize(binding + 1, None);
        }
        slots[binding] = Some(resource);
    }

    pub fn get(&self, set: u32, binding: u32) -> Option<&BoundResource> {
        self.sets
            .get(set as usize)?
            .get(binding as usize)?
            .as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().flatten().all(Option::is_none)
    }
}

/// A vertex buffer bound to one input slot.
#[derive(Debug, Clone)]
pub struct VertexBinding {
    pub buffer: Arc<Buffer>,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct IndexBinding {
    pub buffer: Arc<Buffer>,
    pub format: IndexFormat,
    pub offset: u64,
}

/// The bound color targets and optional depth/stencil target.
#[derive(Debug, Clone, Default)]
pub struct RenderTargets {
    pub colors: Vec<Arc<Texture>>,
    pub depth_stencil: Option<Arc<Texture>>,
}

impl RenderTargets {
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty() && self.depth_stencil.is_none()
    }

    /// Whether both bind exactly the same textures in the same slots.
    pub fn same_targets(&self, other: &Self) -> bool {
        self.colors.len() == other.colors.len()
            && self
                .colors
                .iter()
                .zip(&other.colors)
                .all(|(a, b)| a.id() == b.id())
            && self.depth_stencil.as_ref().map(|t| t.id())
                == other.depth_stencil.as_ref().map(|t| t.id())
    }

    /// Every target, colors first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Texture>> {
        self.colors.iter().chain(self.depth_stencil.iter())
    }

    /// The drawable extent: the smallest width and height over all targets.
    pub fn extent(&self) -> Extent3d {
        self.iter()
            .map(|t| t.size())
            .reduce(Extent3d::min_2d)
            .unwrap_or_default()
    }
}

/// Clears requested on the bound targets and not yet consumed by a draw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingClears {
    pub colors: Vec<Option<[f32; 4]>>,
    pub depth: Option<f32>,
    pub stencil: Option<u32>,
}

impl PendingClears {
    pub fn for_targets(color_count: usize) -> Self {
        Self {
            colors: vec![None; color_count],
            depth: None,
            stencil: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.colors.iter().all(Option::is_none) && self.depth.is_none() && self.stencil.is_none()
    }

    /// Take the pending clears, leaving none pending for the same targets.
    pub fn take(&mut self) -> Self {
        let count = self.colors.len();
        std::mem::replace(self, Self::for_targets(count))
    }
}
