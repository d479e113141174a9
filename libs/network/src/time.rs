//! Wall-clock access for channels
//!
//! Channels stamp raw payloads and `last_message_time` with nanoseconds since the Unix epoch.
//! The throttle additionally needs wall-clock *alignment* (minute buckets), so wall time is read
//! through the [`Clock`] trait and can be swapped for [`AnchoredClock`] in tests.
//!
//! ```text
//! SystemClock   → SystemTime::now()                       (production)
//! AnchoredClock → fixed epoch + tokio::time::Instant delta (paused-time tests)
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Nanoseconds in one wall-clock minute
pub const MINUTE_NS: u64 = 60 * 1_000_000_000;

/// Source of wall-clock time in nanoseconds since the Unix epoch
pub trait Clock: Send + Sync {
    /// Current wall-clock time
    fn now_ns(&self) -> u64;
}

/// Reads the operating system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        safe_system_timestamp_ns()
    }
}

/// Wall clock pinned to a chosen epoch and advanced by tokio's clock.
///
/// Under `#[tokio::test(start_paused = true)]` tokio time only moves on `advance` or when the
/// runtime auto-advances to the next timer, so wall-clock arithmetic becomes deterministic.
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    epoch_ns: u64,
    origin: tokio::time::Instant,
}

impl AnchoredClock {
    /// Start the clock at `epoch_ns`, measured from tokio's current instant
    pub fn starting_at(epoch_ns: u64) -> Self {
        Self {
            epoch_ns,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now_ns(&self) -> u64 {
        self.epoch_ns + safe_duration_to_ns(self.origin.elapsed())
    }
}

/// First minute boundary strictly after `now_ns`.
///
/// A time that sits exactly on a boundary maps to the *following* boundary.
pub fn next_minute_boundary_ns(now_ns: u64) -> u64 {
    (now_ns / MINUTE_NS + 1) * MINUTE_NS
}

/// Duration to nanoseconds, saturating instead of truncating on overflow
pub fn safe_duration_to_ns(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Current system time in nanoseconds since the Unix epoch.
///
/// Returns 0 if the system clock is set before the epoch.
pub fn safe_system_timestamp_ns() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => safe_duration_to_ns(duration),
        Err(e) => {
            tracing::error!("System time before UNIX epoch: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minute_boundary_alignment() {
        let t = 1_700_000_040 * 1_000_000_000; // 28_333_334 minutes exactly
        assert_eq!(next_minute_boundary_ns(t), t + MINUTE_NS);
        assert_eq!(next_minute_boundary_ns(t + 1), t + MINUTE_NS);
        assert_eq!(next_minute_boundary_ns(t - 1), t);
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_ns() > 1_600_000_000_000_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_anchored_clock_follows_tokio_time() {
        let clock = AnchoredClock::starting_at(MINUTE_NS * 10);
        assert_eq!(clock.now_ns(), MINUTE_NS * 10);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(clock.now_ns(), MINUTE_NS * 10 + 5_000_000_000);
    }
}
