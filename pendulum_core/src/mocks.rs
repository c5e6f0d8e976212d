//! Test and helper sinks for pendulum_core

use std::sync::Mutex;

use crate::history::{HistoryRecord, HistorySink};

/// Discards every record.
pub struct NullHistory;

impl HistorySink for NullHistory {
    fn record(&self, _rec: &HistoryRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// Keeps every record in memory, in completion order.
#[derive(Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().map(|g| g.clone()).unwrap_or_default()
    }

    /// Records for one sequence index; more than one means a double finalize.
    pub fn for_index(&self, index: u64) -> Vec<HistoryRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.index == index)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistorySink for MemoryHistory {
    fn record(&self, rec: &HistoryRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.records
            .lock()
            .map_err(|_| std::io::Error::other("history lock poisoned"))?
            .push(rec.clone());
        Ok(())
    }
}
