//! Per-client rate limiting.
//!
//! Each client IP gets its own `governor` bucket, created on first sight.
//! Lookup-or-create, the `last_seen` update and token consumption all happen
//! under one lock so concurrent first requests from the same IP share a
//! bucket. A cancellable background task evicts clients idle for too long.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use cmdrelay_core::AdmissionConfig;
use governor::Quota;
use governor::clock::{Clock, DefaultClock, Reference};
use governor::middleware::NoOpMiddleware;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Bucket<C> =
    governor::RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

struct ClientEntry<C: Clock> {
    bucket: Bucket<C>,
    last_seen: C::Instant,
}

/// Per-IP rate limiter.
///
/// Disabled (every request admitted, nothing tracked) when the rate is not
/// positive or the burst is zero.
pub struct RateLimiter<C: Clock = DefaultClock> {
    quota: Option<Quota>,
    eviction_interval: Duration,
    max_idle: Duration,
    clients: Mutex<HashMap<String, ClientEntry<C>>>,
    clock: C,
}

impl<C: Clock> std::fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("quota", &self.quota)
            .field("clients", &self.tracked_clients())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(config: &AdmissionConfig, clock: C) -> Self {
        Self {
            quota: quota(config.rate_rps, config.rate_burst),
            eviction_interval: config.eviction_interval,
            max_idle: config.max_idle,
            clients: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub const fn is_enabled(&self) -> bool {
        self.quota.is_some()
    }

    /// Try to admit one request from `ip`.
    pub fn check(&self, ip: &str) -> bool {
        let Some(quota) = self.quota else {
            return true;
        };

        let now = self.clock.now();
        let mut clients = self.lock();
        let entry = clients
            .entry(ip.to_string())
            .or_insert_with(|| ClientEntry {
                bucket: governor::RateLimiter::direct_with_clock(quota, &self.clock),
                last_seen: now,
            });
        entry.last_seen = now;
        entry.bucket.check().is_ok()
    }

    /// Drop clients not seen for longer than the idle threshold.
    ///
    /// Returns the number of entries removed.
    pub fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let mut clients = self.lock();
        let before = clients.len();
        clients.retain(|_, entry| {
            Duration::from(now.duration_since(entry.last_seen)) <= self.max_idle
        });
        before - clients.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.lock().len()
    }

    /// Run [`evict_idle`](Self::evict_idle) every eviction interval until
    /// `cancel` fires.
    pub fn spawn_eviction(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()>
    where
        C: Send + Sync + 'static,
        C::Instant: Send + Sync,
    {
        let limiter = Arc::clone(self);
        let period = self.eviction_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = limiter.evict_idle();
                        if evicted > 0 {
                            debug!(
                                evicted,
                                remaining = limiter.tracked_clients(),
                                "Evicted idle rate-limit entries"
                            );
                        }
                    }
                    () = cancel.cancelled() => {
                        debug!("Rate-limit eviction stopped");
                        break;
                    }
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ClientEntry<C>>> {
        // The map holds no invariants a panicking holder could break.
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Quota refilling `rate` cells per second with room for `burst`.
///
/// `None` disables limiting. Rates too small to express as a period do too.
fn quota(rate: f64, burst: u32) -> Option<Quota> {
    let burst = NonZeroU32::new(burst)?;
    if rate.is_nan() || rate <= 0.0 {
        return None;
    }
    let period = Duration::try_from_secs_f64(rate.recip()).ok()?;
    let quota = Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX));
    Some(quota.allow_burst(burst))
}
