//! Resource synchronization.
//!
//! - [`TextureLayout`] and [`AccessState`] describe how a resource was last used
//! - [`ResourceStateTracker`] remembers the last access of every resource and
//!   decides which new accesses need a barrier
//! - [`BarrierBatch`] collects the resulting barriers into one native
//!   pipeline barrier

mod barriers;
mod layout;
mod tracker;

pub use barriers::{BarrierBatch, BufferBarrier, ImageBarrier, MemoryBarrier};
pub use layout::{AccessState, BufferAccess, TextureAccess, TextureLayout, shader_stage_flags};
pub use tracker::{ResourceStateTracker, Transition};
