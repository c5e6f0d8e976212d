//! Trigger correlation: pairs identified packages with trigger-sensor timestamps.
//!
//! The trigger FIFO holds the instants at which the upstream photoelectric
//! fired, oldest first. Each correlation drains it once and sorts every entry
//! into exactly one bucket:
//!
//! 1. delay inside the window and nothing matched yet: the match
//! 2. delay up to `upper + 500 ms`: requeued for the next package
//! 3. older: discarded
//!
//! With no match, a queue that still held unexpired entries is a genuine
//! correlation fault and flags the package. An empty queue means the sensor
//! data was lost, so the trigger instant is estimated from the median of
//! recently observed delays.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::DelayWindow;
use crate::delays::DelayHistory;
use crate::package::{Package, PackageError};
use crate::util::{elapsed_ms, instant_before};

/// Trigger timestamps older than this are pruned on every insert/scan.
pub const TRIGGER_RETENTION: Duration = Duration::from_secs(2);
/// Entries past the window's upper bound stay queued this much longer.
pub const REQUEUE_GRACE_MS: u64 = 500;

/// How a package obtained its trigger timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// Paired with a queued trigger timestamp.
    Matched { delay_ms: u64 },
    /// Queue was empty; timestamp estimated from the delay history median.
    Estimated { delay_ms: u64 },
}

#[derive(Debug)]
pub struct TriggerCorrelator {
    window: DelayWindow,
    queue: Mutex<VecDeque<Instant>>,
    delays: Mutex<DelayHistory>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

fn prune(queue: &mut VecDeque<Instant>, now: Instant) {
    while let Some(front) = queue.front() {
        if now.saturating_duration_since(*front) > TRIGGER_RETENTION {
            queue.pop_front();
        } else {
            break;
        }
    }
}

impl TriggerCorrelator {
    pub fn new(window: DelayWindow, history_capacity: usize) -> Self {
        Self {
            window,
            queue: Mutex::new(VecDeque::new()),
            delays: Mutex::new(DelayHistory::new(history_capacity)),
        }
    }

    pub fn window(&self) -> DelayWindow {
        self.window
    }

    /// Record a trigger-sensor firing at `at`.
    pub fn on_trigger(&self, at: Instant) {
        let mut q = lock(&self.queue);
        q.push_back(at);
        prune(&mut q, at);
        tracing::trace!(queued = q.len(), "trigger recorded");
    }

    /// Assign `package` a trigger timestamp as of `now`.
    ///
    /// On error the package's `trigger_at` may still have been set (delay
    /// anomaly); the caller flags and finalizes it.
    pub fn correlate(
        &self,
        package: &mut Package,
        now: Instant,
    ) -> Result<Correlation, PackageError> {
        let (matched, had_unexpired) = {
            let mut q = lock(&self.queue);
            prune(&mut q, now);
            let mut matched: Option<(Instant, u64)> = None;
            let mut kept = VecDeque::with_capacity(q.len());
            for ts in q.drain(..) {
                let delay = elapsed_ms(now, ts);
                if matched.is_none() && self.window.contains(delay) {
                    matched = Some((ts, delay));
                } else if delay <= self.window.upper_ms.saturating_add(REQUEUE_GRACE_MS) {
                    kept.push_back(ts);
                }
            }
            let had_unexpired = !kept.is_empty();
            *q = kept;
            (matched, had_unexpired)
        };

        let correlation = match matched {
            Some((ts, delay_ms)) => {
                package.trigger_at = Some(ts);
                lock(&self.delays).push(delay_ms);
                tracing::debug!(index = package.index, delay_ms, "trigger matched");
                Correlation::Matched { delay_ms }
            }
            None if had_unexpired => {
                tracing::warn!(
                    index = package.index,
                    "trigger queue not empty but no entry inside the correlation window"
                );
                return Err(PackageError::NoMatchingTrigger);
            }
            None => {
                let delay_ms = lock(&self.delays)
                    .median()
                    .unwrap_or_else(|| self.window.midpoint_ms());
                package.trigger_at = Some(instant_before(now, delay_ms));
                tracing::debug!(index = package.index, delay_ms, "trigger estimated");
                Correlation::Estimated { delay_ms }
            }
        };

        let actual = package.trigger_at.map_or(0, |t| elapsed_ms(now, t));
        package.trigger_delay_ms = Some(actual);
        if !self.window.contains(actual) {
            tracing::warn!(index = package.index, delay_ms = actual, "trigger delay anomaly");
            return Err(PackageError::DelayAnomaly { delay_ms: actual });
        }
        Ok(correlation)
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn median_delay_ms(&self) -> Option<u64> {
        lock(&self.delays).median()
    }

    /// Seed the delay history, e.g. from a previous run's statistics.
    pub fn record_delay(&self, delay_ms: u64) {
        lock(&self.delays).push(delay_ms);
    }

    pub fn clear(&self) {
        lock(&self.queue).clear();
        lock(&self.delays).clear();
    }
}
