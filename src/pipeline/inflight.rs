//! Single-slot backpressure for the expensive path.
//!
//! A frame claims the slot before it is dispatched and the returned guard
//! releases it when dropped, whichever way the work ends. Frames that find
//! the slot taken are dropped by the caller, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct InFlight {
    busy: AtomicBool,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim the slot, or `None` if a unit of work already holds it.
    pub fn try_claim(self: &Arc<Self>) -> Option<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                slot: Arc::clone(self),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the in-flight slot until dropped. Moves with the work across
/// threads.
#[derive(Debug)]
#[must_use = "dropping the guard releases the slot immediately"]
pub struct InFlightGuard {
    slot: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.slot.busy.store(false, Ordering::Release);
    }
}
