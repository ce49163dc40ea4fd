//! Profiling support.
//!
//! CPU instrumentation comes from [`ember_core::profiling`] and is re-exported
//! here. GPU time is measured with a [`GpuTimer`]: a pair of timestamp
//! queries written around everything a context replays.
//!
//! ```ignore
//! let timer = device.create_gpu_timer()?;
//! ctx.set_gpu_timer(Some(timer.clone()));
//! // ... record and end frames ...
//! device.wait_idle()?;
//! let elapsed = device.read_gpu_timer(&timer)?;
//! ```

pub use ember_core::profiling::*;

use crate::backend::GpuQueryPool;

/// Begin and end timestamps of one context's replay.
///
/// The begin timestamp is written before the first replayed command and the
/// end timestamp after the last pass batch. A timer shared by several
/// contexts measures whichever ended last.
#[derive(Debug)]
pub struct GpuTimer {
    pool: GpuQueryPool,
}

impl GpuTimer {
    pub(crate) const BEGIN_QUERY: u32 = 0;
    pub(crate) const END_QUERY: u32 = 1;
    pub(crate) const QUERY_COUNT: u32 = 2;

    pub(crate) fn new(pool: GpuQueryPool) -> Self {
        debug_assert!(pool.count() >= Self::QUERY_COUNT);
        Self { pool }
    }

    pub(crate) fn pool(&self) -> &GpuQueryPool {
        &self.pool
    }
}

static_assertions::assert_impl_all!(GpuTimer: Send, Sync);

#[cfg(test)]
mod tests {
    #[test]
    fn test_macros_compile() {
        ember_core::frame_mark!();
        ember_core::profile_scope!("test_scope");
        ember_core::profile_function!();
        ember_core::profile_plot!("test_value", 42.0);
    }
}
