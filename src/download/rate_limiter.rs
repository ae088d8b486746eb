//! Global pacing for media fetches.
//!
//! One leaky bucket shared by every catch-up source: consecutive fetches are
//! spaced by a fixed minimum interval regardless of which feed discovered
//! them. This is the single throttle protecting the upstream media hosts;
//! feed-page fetches are paced separately per source.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Global leaky-bucket rate limiter.
///
/// Designed to be wrapped in `Arc` and shared between the queue worker and
/// anything else that talks to the media hosts. Each `acquire` reserves the
/// next free slot and sleeps until it arrives, so N concurrent callers end up
/// spaced `interval` apart in the order they called.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum time between granted permits.
    interval: Duration,

    /// Whether pacing is disabled (interval of zero).
    disabled: bool,

    /// The earliest instant at which the next permit may be granted.
    /// `None` until the first acquire.
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a rate limiter with the given minimum interval between permits.
    ///
    /// An interval of zero behaves like [`RateLimiter::disabled`].
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        debug!(interval_ms = interval.as_millis(), "creating rate limiter");
        Self {
            interval,
            disabled: interval.is_zero(),
            next_slot: Mutex::new(None),
        }
    }

    /// Creates a limiter that grants every permit immediately.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            interval: Duration::ZERO,
            disabled: true,
            next_slot: Mutex::new(None),
        }
    }

    /// Returns whether pacing is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the configured interval between permits.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until the next pacing slot is available.
    ///
    /// The first call returns immediately; each subsequent call is granted no
    /// earlier than `interval` after the previous grant.
    pub async fn acquire(&self) {
        if self.disabled {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = next.map_or(now, |s| s.max(now));
            *next = Some(slot + self.interval);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}
