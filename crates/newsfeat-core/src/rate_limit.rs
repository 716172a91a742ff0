//! Minimum-interval rate limiter shared by the publisher and the enrichment
//! client.

use std::fmt;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};

use governor::Quota;
use tracing::debug;

/// Direct quota, no keyed bucketing.
type DirectLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Spaces calls at least `period / requests` apart.
///
/// Backed by a GCRA limiter with a burst of one. Before each call the caller
/// awaits [`RateLimiter::acquire`]. A call inside the interval of the one
/// before it waits until its cell frees up, so concurrent callers are
/// released one interval apart.
pub struct RateLimiter {
    min_interval: Option<Duration>,
    inner: Option<DirectLimiter>,
}

impl RateLimiter {
    /// Create a limiter allowing `requests` calls per `period`.
    ///
    /// Zero requests or a zero period disables throttling.
    pub fn new(requests: u32, period: Duration) -> Self {
        let quota = if requests == 0 {
            None
        } else {
            Quota::with_period(period / requests)
        };
        match quota {
            Some(quota) => Self {
                min_interval: Some(period / requests),
                inner: Some(governor::RateLimiter::direct(
                    quota.allow_burst(NonZeroU32::MIN),
                )),
            },
            None => Self::disabled(),
        }
    }

    /// A limiter that never waits.
    pub fn disabled() -> Self {
        Self {
            min_interval: None,
            inner: None,
        }
    }

    /// Whether calls are throttled at all.
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Minimum spacing between calls, if throttling is enabled.
    pub fn min_interval(&self) -> Option<Duration> {
        self.min_interval
    }

    /// Wait for the next slot.
    ///
    /// Returns the time spent waiting when the caller was throttled, so the
    /// caller can count rate-limit hits in its own metrics.
    pub async fn acquire(&self) -> Option<Duration> {
        let limiter = self.inner.as_ref()?;
        if limiter.check().is_ok() {
            return None;
        }

        let started = Instant::now();
        limiter.until_ready().await;
        let waited = started.elapsed();
        debug!(
            subsystem = "rate_limit",
            wait_ms = waited.as_millis() as u64,
            "Throttled call"
        );
        Some(waited)
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("min_interval", &self.min_interval)
            .finish()
    }
}
