//! Common time helpers for pendulum_core.

use std::time::{Duration, Instant};

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
#[inline]
pub fn duration_ms(d: Duration) -> u64 {
    (d.as_millis().min(u128::from(u64::MAX))) as u64
}

/// Milliseconds from `earlier` to `now`, 0 when `earlier` is in the future.
#[inline]
pub fn elapsed_ms(now: Instant, earlier: Instant) -> u64 {
    duration_ms(now.saturating_duration_since(earlier))
}

/// `now - ms`, or `now` itself if the subtraction would precede the platform epoch.
#[inline]
pub fn instant_before(now: Instant, ms: u64) -> Instant {
    now.checked_sub(Duration::from_millis(ms)).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_saturates_for_future_instants() {
        let now = Instant::now();
        let later = now + Duration::from_millis(5);
        assert_eq!(elapsed_ms(now, later), 0);
        assert_eq!(elapsed_ms(later, now), 5);
    }

    #[test]
    fn instant_before_round_trips() {
        let now = Instant::now() + Duration::from_secs(10);
        assert_eq!(elapsed_ms(now, instant_before(now, 140)), 140);
    }
}
