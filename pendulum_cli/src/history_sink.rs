//! JSON-lines package history sink.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::UNIX_EPOCH;

use eyre::WrapErr;
use pendulum_core::{HistoryRecord, HistorySink, Outcome};
use serde_json::json;

/// Appends one JSON object per finished package and keeps outcome counters.
pub struct JsonlHistory {
    out: Mutex<Option<Box<dyn Write + Send>>>,
    diverted: AtomicUsize,
    errors: AtomicUsize,
}

impl JsonlHistory {
    fn with_writer(out: Option<Box<dyn Write + Send>>) -> Self {
        Self {
            out: Mutex::new(out),
            diverted: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        }
    }

    /// Append to `path`, creating it if needed.
    pub fn open(path: &Path) -> eyre::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .wrap_err_with(|| format!("open history file {}", path.display()))?;
        Ok(Self::with_writer(Some(Box::new(file))))
    }

    pub fn stdout() -> Self {
        Self::with_writer(Some(Box::new(std::io::stdout())))
    }

    /// Count outcomes without writing anything.
    pub fn counting() -> Self {
        Self::with_writer(None)
    }

    pub fn diverted(&self) -> usize {
        self.diverted.load(Ordering::Acquire)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.diverted() + self.errors()
    }
}

pub fn record_json(rec: &HistoryRecord) -> serde_json::Value {
    let recorded_at_ms = rec
        .recorded_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    json!({
        "index": rec.index,
        "barcode": rec.barcode,
        "chute": rec.chute,
        "weight_g": rec.weight_g,
        "status": rec.outcome.as_str(),
        "error": rec.error,
        "trigger_delay_ms": rec.trigger_delay_ms,
        "processing_ms": rec.processing_ms,
        "recorded_at_ms": recorded_at_ms,
    })
}

impl HistorySink for JsonlHistory {
    fn record(&self, rec: &HistoryRecord) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match rec.outcome {
            Outcome::Diverted => self.diverted.fetch_add(1, Ordering::AcqRel),
            Outcome::Error => self.errors.fetch_add(1, Ordering::AcqRel),
        };
        let mut guard = self
            .out
            .lock()
            .map_err(|_| std::io::Error::other("history writer lock poisoned"))?;
        if let Some(out) = guard.as_mut() {
            writeln!(out, "{}", record_json(rec))?;
            out.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pendulum_core::{Package, PackageError};
    use std::time::Instant;

    #[test]
    fn writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let sink = JsonlHistory::open(&path).unwrap();
        let mut p = Package::new(1, "ABC", 2, Instant::now());
        sink.record(&HistoryRecord::from_package(&p)).unwrap();
        p.index = 2;
        p.error = Some(PackageError::DelayAnomaly { delay_ms: 9000 });
        sink.record(&HistoryRecord::from_package(&p)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["status"], "diverted");
        assert_eq!(lines[1]["status"], "error");
        assert_eq!(lines[1]["error"], "trigger delay anomaly: 9000 ms");
        assert_eq!((sink.diverted(), sink.errors()), (1, 1));
    }
}
