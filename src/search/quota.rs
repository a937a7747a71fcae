//! Quota cool-down tracking for the primary search API.
//!
//! The [`QuotaGuard`] records when the primary API last answered with a
//! quota-style rejection and reports the API as unavailable until
//! [`QUOTA_TIMEOUT`] has elapsed. There is no timer: the window is checked
//! lazily on every call, and the marker is cleared by the first caller that
//! observes the window as expired.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use jukebox_audio::search::{QuotaGuard, QUOTA_TIMEOUT};
//!
//! let guard = QuotaGuard::new();
//! let window_ms = i64::try_from(QUOTA_TIMEOUT.as_millis()).unwrap();
//!
//! guard.mark_exhausted_at(1_000);
//! assert!(!guard.is_available_at(1_000 + window_ms - 1));
//! assert!(guard.is_available_at(1_000 + window_ms));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

/// Cool-down applied after the primary API reports an exhausted quota.
pub const QUOTA_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Sentinel stored in the timestamp slot while the quota is available.
const UNSET: i64 = -1;

/// Source of wall-clock time in epoch milliseconds.
///
/// Injected into [`QuotaGuard`] so window behaviour is testable without waiting.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default()
    }
}

/// Process-wide quota state for the primary search API.
///
/// A single atomic timestamp slot: readers and writers never block each other,
/// and the stored timestamp only ever moves forward.
#[derive(Debug)]
pub struct QuotaGuard {
    exhausted_at: AtomicI64,
    window_ms: i64,
    clock: Arc<dyn Clock>,
}

impl QuotaGuard {
    /// Creates a guard using the system clock and the default [`QUOTA_TIMEOUT`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a guard that reads time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            exhausted_at: AtomicI64::new(UNSET),
            window_ms: i64::try_from(QUOTA_TIMEOUT.as_millis()).unwrap_or(i64::MAX),
            clock,
        }
    }

    /// Length of the cool-down window in milliseconds.
    #[must_use]
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// Epoch millis of the last recorded quota hit, if the marker is set.
    #[must_use]
    pub fn exhausted_at(&self) -> Option<i64> {
        match self.exhausted_at.load(Ordering::Acquire) {
            UNSET => None,
            at => Some(at),
        }
    }

    /// Records a quota hit observed now.
    pub fn mark_exhausted(&self) {
        self.mark_exhausted_at(self.clock.now_millis());
    }

    /// Records a quota hit observed at `now` (epoch millis).
    ///
    /// An older timestamp never replaces a newer one.
    pub fn mark_exhausted_at(&self, now: i64) {
        let previous = self.exhausted_at.fetch_max(now, Ordering::AcqRel);
        if previous == UNSET {
            warn!(
                exhausted_at = now,
                cooldown_secs = QUOTA_TIMEOUT.as_secs(),
                "Search API quota exhausted; pausing primary search"
            );
        }
    }

    /// Returns true if the primary API may be used now.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.is_available_at(self.clock.now_millis())
    }

    /// Returns true if the primary API may be used at `now` (epoch millis).
    ///
    /// Clears the exhausted marker once the window has elapsed.
    #[must_use]
    pub fn is_available_at(&self, now: i64) -> bool {
        let at = self.exhausted_at.load(Ordering::Acquire);
        if at == UNSET {
            return true;
        }
        if now.saturating_sub(at) < self.window_ms {
            return false;
        }

        // A concurrent newer hit wins over this reset.
        if self
            .exhausted_at
            .compare_exchange(at, UNSET, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!(exhausted_at = at, now, "Search API quota window elapsed");
        }
        true
    }
}

impl Default for QuotaGuard {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::test_clock::ManualClock;
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    #[test]
    fn test_fresh_guard_is_available() {
        let guard = QuotaGuard::new();
        assert!(guard.is_available_at(T0));
        assert!(guard.exhausted_at().is_none());
    }

    #[test]
    fn test_window_boundary() {
        let guard = QuotaGuard::new();
        guard.mark_exhausted_at(T0);

        assert!(!guard.is_available_at(T0));
        assert!(!guard.is_available_at(T0 + guard.window_ms() - 1));
        assert!(guard.is_available_at(T0 + guard.window_ms()));
    }

    #[test]
    fn test_expired_check_clears_marker() {
        let guard = QuotaGuard::new();
        guard.mark_exhausted_at(T0);
        assert!(guard.is_available_at(T0 + guard.window_ms() + 5));
        assert!(guard.exhausted_at().is_none());
        // Cleared for good: an earlier `now` no longer sees the old hit.
        assert!(guard.is_available_at(T0 + 1));
    }

    #[test]
    fn test_marker_only_moves_forward() {
        let guard = QuotaGuard::new();
        guard.mark_exhausted_at(T0 + 500);
        guard.mark_exhausted_at(T0);
        assert_eq!(guard.exhausted_at(), Some(T0 + 500));
    }

    #[test]
    fn test_clock_driven_methods() {
        let clock = Arc::new(ManualClock::at(T0));
        let guard = QuotaGuard::with_clock(clock.clone());

        guard.mark_exhausted();
        assert_eq!(guard.exhausted_at(), Some(T0));
        assert!(!guard.is_available());

        clock.set(T0 + guard.window_ms() - 1);
        assert!(!guard.is_available());

        clock.set(T0 + guard.window_ms());
        assert!(guard.is_available());
    }

    #[test]
    fn test_window_is_ten_minutes() {
        assert_eq!(QuotaGuard::new().window_ms(), 600_000);
    }

    #[test]
    fn test_concurrent_marks_and_reads() {
        let guard = Arc::new(QuotaGuard::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let guard = Arc::clone(&guard);
                std::thread::spawn(move || {
                    guard.mark_exhausted_at(T0 + i);
                    guard.is_available_at(T0 + i)
                })
            })
            .collect();

        for handle in handles {
            assert!(!handle.join().unwrap());
        }
        assert_eq!(guard.exhausted_at(), Some(T0 + 7));
    }

    #[test]
    fn test_system_clock_is_positive() {
        assert!(SystemClock.now_millis() > 0);
    }
}
