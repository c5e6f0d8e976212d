//! Pending-sort registry: correlated packages waiting for their sorting signal.
//!
//! Entries are keyed by sequence index and each carries an eviction deadline
//! (`pending timeout + 500 ms`). Removal is the single point of ownership
//! transfer: whichever path (actuation or timeout sweep) removes an entry is
//! the one that finalizes it, so every package completes exactly once.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::package::Package;

/// Slack added on top of the pending timeout before a package is evicted.
pub const EVICTION_SLACK: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct PendingEntry {
    package: Package,
    deadline: Instant,
}

/// The fields the sorting dispatcher needs, copied out under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub index: u64,
    pub chute: i32,
    pub trigger_at: Instant,
}

#[derive(Debug, Default)]
pub struct PendingRegistry {
    inner: Mutex<HashMap<u64, PendingEntry>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, PendingEntry>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Insert `package`, rejecting it when its index is already pending.
    ///
    /// The rejected package is handed back so the caller can flag and finalize it.
    pub fn try_enqueue(
        &self,
        package: Package,
        timeout: Duration,
        now: Instant,
    ) -> Result<(), Box<Package>> {
        let mut map = self.lock();
        if map.contains_key(&package.index) {
            return Err(Box::new(package));
        }
        let deadline = now + timeout + EVICTION_SLACK;
        map.insert(package.index, PendingEntry { package, deadline });
        Ok(())
    }

    /// Copy of every entry that has a trigger timestamp.
    pub fn scan(&self) -> Vec<PendingSnapshot> {
        self.lock()
            .values()
            .filter_map(|e| {
                e.package.trigger_at.map(|trigger_at| PendingSnapshot {
                    index: e.package.index,
                    chute: e.package.chute,
                    trigger_at,
                })
            })
            .collect()
    }

    pub fn remove(&self, index: u64) -> Option<Package> {
        self.lock().remove(&index).map(|e| e.package)
    }

    pub fn contains(&self, index: u64) -> bool {
        self.lock().contains_key(&index)
    }

    /// Remove and return every entry whose deadline has passed.
    pub fn evict_expired(&self, now: Instant) -> Vec<Package> {
        let mut map = self.lock();
        let expired: Vec<u64> = map
            .iter()
            .filter(|(_, e)| now >= e.deadline)
            .map(|(k, _)| *k)
            .collect();
        let mut out: Vec<Package> = expired
            .into_iter()
            .filter_map(|k| map.remove(&k).map(|e| e.package))
            .collect();
        out.sort_by_key(|p| p.index);
        out
    }

    /// The next package expected at the station after the one at
    /// (`trigger_at`, `index`): strictly later trigger, strictly higher index,
    /// earliest by (trigger, index). Entries for which `skip` returns true are
    /// ignored.
    pub fn next_after(
        &self,
        trigger_at: Instant,
        index: u64,
        skip: impl Fn(u64) -> bool,
    ) -> Option<PendingSnapshot> {
        self.scan()
            .into_iter()
            .filter(|s| s.trigger_at > trigger_at && s.index > index && !skip(s.index))
            .min_by_key(|s| (s.trigger_at, s.index))
    }

    /// Remove everything, ordered by index.
    pub fn drain(&self) -> Vec<Package> {
        let mut out: Vec<Package> = self.lock().drain().map(|(_, e)| e.package).collect();
        out.sort_by_key(|p| p.index);
        out
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn pkg(index: u64, chute: i32, trigger_at: Instant) -> Package {
        let mut p = Package::new(index, format!("B{index}"), chute, trigger_at);
        p.trigger_at = Some(trigger_at);
        p
    }

    #[test]
    fn duplicate_index_is_handed_back() {
        let r = PendingRegistry::new();
        let t = Instant::now();
        r.try_enqueue(pkg(1, 1, t), ms(100), t).unwrap();
        let back = r.try_enqueue(pkg(1, 2, t), ms(100), t).unwrap_err();
        assert_eq!(back.chute, 2);
        assert_eq!(r.len(), 1);
        assert_eq!(r.scan()[0].chute, 1);
    }

    #[test]
    fn eviction_waits_for_timeout_plus_slack() {
        let r = PendingRegistry::new();
        let t = Instant::now();
        r.try_enqueue(pkg(1, 1, t), ms(100), t).unwrap();
        assert!(r.evict_expired(t + ms(599)).is_empty());
        let out = r.evict_expired(t + ms(600));
        assert_eq!(out.len(), 1);
        assert!(r.is_empty());
    }

    #[test]
    fn removal_is_exactly_once() {
        let r = PendingRegistry::new();
        let t = Instant::now();
        r.try_enqueue(pkg(4, 1, t), ms(100), t).unwrap();
        assert!(r.remove(4).is_some());
        assert!(r.remove(4).is_none());
        assert!(r.evict_expired(t + ms(10_000)).is_empty());
    }

    #[test]
    fn next_after_picks_earliest_later_entry() {
        let r = PendingRegistry::new();
        let t = Instant::now();
        r.try_enqueue(pkg(1, 1, t), ms(1000), t).unwrap();
        r.try_enqueue(pkg(2, 2, t + ms(50)), ms(1000), t).unwrap();
        r.try_enqueue(pkg(3, 1, t + ms(20)), ms(1000), t).unwrap();
        // Lower index with a later trigger is never "next".
        r.try_enqueue(pkg(0, 2, t + ms(10)), ms(1000), t).unwrap();

        let next = r.next_after(t, 1, |_| false).unwrap();
        assert_eq!(next.index, 3);
        let next = r.next_after(t, 1, |i| i == 3).unwrap();
        assert_eq!(next.index, 2);
        assert!(r.next_after(t + ms(50), 2, |_| false).is_none());
    }

    #[test]
    fn drain_returns_sorted() {
        let r = PendingRegistry::new();
        let t = Instant::now();
        for i in [5, 2, 9] {
            r.try_enqueue(pkg(i, 1, t), ms(100), t).unwrap();
        }
        let idx: Vec<u64> = r.drain().iter().map(|p| p.index).collect();
        assert_eq!(idx, vec![2, 5, 9]);
        assert!(r.is_empty());
    }
}
