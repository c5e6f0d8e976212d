//! Processing marks: which pending packages already have an actuation job.
//!
//! A mark is held by a [`MarkGuard`] for the lifetime of the job and removed
//! when the guard drops, so a sorting signal arriving mid-actuation never
//! dispatches the same package twice.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

#[derive(Debug, Clone)]
pub struct ProcessingMark {
    pub started_at: Instant,
    pub station: Arc<str>,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessingMarks {
    map: Arc<DashMap<u64, ProcessingMark>>,
}

impl ProcessingMarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `index` if it is not marked yet.
    pub fn try_mark(&self, index: u64, station: &Arc<str>, now: Instant) -> Option<MarkGuard> {
        match self.map.entry(index) {
            Entry::Occupied(_) => None,
            Entry::Vacant(v) => {
                v.insert(ProcessingMark {
                    started_at: now,
                    station: Arc::clone(station),
                });
                Some(MarkGuard {
                    map: Arc::clone(&self.map),
                    index,
                })
            }
        }
    }

    pub fn is_marked(&self, index: u64) -> bool {
        self.map.contains_key(&index)
    }

    pub fn get(&self, index: u64) -> Option<ProcessingMark> {
        self.map.get(&index).map(|m| m.value().clone())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }
}

/// Owning handle for one mark; unmarks on drop.
#[derive(Debug)]
pub struct MarkGuard {
    map: Arc<DashMap<u64, ProcessingMark>>,
    index: u64,
}

impl MarkGuard {
    pub fn index(&self) -> u64 {
        self.index
    }
}

impl Drop for MarkGuard {
    fn drop(&mut self) {
        self.map.remove(&self.index);
    }
}
