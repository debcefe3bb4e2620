//! Open/close lifecycle accounting.
//!
//! Opens are counted in aggregate for the whole device, not per caller.
//! Both counters are atomics so concurrent opens never lose an increment.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide open counter plus a gauge of sessions currently open.
#[derive(Debug, Default)]
pub struct SessionTracker {
    opens: AtomicU64,
    active: AtomicU64,
}

impl SessionTracker {
    /// Tracker with no opens recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an open. Never fails.
    pub fn on_open(&self) {
        let n = self.opens.fetch_add(1, Ordering::AcqRel) + 1;
        self.active.fetch_add(1, Ordering::AcqRel);
        log::info!("RNG: device has been opened {n} time(s)");
    }

    /// Record a close. Never fails.
    pub fn on_close(&self) {
        // Saturate rather than wrap if a close ever arrives unpaired.
        let _ = self
            .active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        log::info!("RNG: device successfully closed");
    }

    /// Total opens since the device was loaded.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Acquire)
    }

    /// Sessions opened and not yet closed.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }
}
