//! Shared application state type.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::bootstrap::GatewayContext;

/// Application state shared across all handlers.
pub type AppState = Arc<GatewayContext>;

/// Count of relay-invoking requests currently being handled.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicI64,
}

/// Decrements the [`InFlight`] counter when dropped.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    counter: &'a InFlight,
}

impl InFlight {
    pub fn enter(&self) -> InFlightGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard { counter: self }
    }

    pub fn current(&self) -> i64 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.count.fetch_sub(1, Ordering::SeqCst);
    }
}
