//! Bounded-concurrency gate.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed pool of in-flight slots. Acquisition never waits.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    slots: Option<Arc<Semaphore>>,
}

/// A held slot, released when dropped.
#[derive(Debug)]
pub struct GatePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl ConcurrencyGate {
    /// Gate with `capacity` slots; `capacity <= 0` disables it.
    pub fn new(capacity: i64) -> Self {
        let slots = usize::try_from(capacity)
            .ok()
            .filter(|&n| n > 0)
            .map(|n| Arc::new(Semaphore::new(n)));
        Self { slots }
    }

    pub const fn is_enabled(&self) -> bool {
        self.slots.is_some()
    }

    /// Free slots, or `None` when the gate is disabled.
    pub fn available(&self) -> Option<usize> {
        self.slots.as_ref().map(|s| s.available_permits())
    }

    /// Take a slot if one is free.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        match &self.slots {
            None => Some(GatePermit { _permit: None }),
            Some(slots) => Arc::clone(slots)
                .try_acquire_owned()
                .ok()
                .map(|permit| GatePermit {
                    _permit: Some(permit),
                }),
        }
    }
}
