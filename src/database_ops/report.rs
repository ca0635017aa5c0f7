//! Per-run outcome accounting.
//!
//! The ingest loops keep going when a unit of work fails; the report is
//! where those failures stay visible, with enough context to say which
//! code/market/date/port combination was dropped and why.

use std::fmt::Display;

use tracing::{info, warn};

#[derive(Debug)]
pub struct SkippedUnit {
    pub unit: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub facts_written: u64,
    pub facts_deduplicated: u64,
    pub skipped: Vec<SkippedUnit>,
}

impl IngestReport {
    /// Account for one attempted fact insert. `inserted == false` means the
    /// composite key already existed, the intended steady state on re-runs.
    pub fn record_fact(&mut self, inserted: bool) {
        if inserted {
            self.facts_written += 1;
        } else {
            self.facts_deduplicated += 1;
        }
    }

    /// Record a failed unit of work and keep going.
    pub fn skip(&mut self, unit: impl Into<String>, reason: impl Display) {
        let unit = unit.into();
        let reason = reason.to_string();
        warn!(%unit, %reason, "skipping unit of work");
        self.skipped.push(SkippedUnit { unit, reason });
    }

    pub fn log_summary(&self, pipeline: &str) {
        info!(
            pipeline,
            facts_written = self.facts_written,
            facts_deduplicated = self.facts_deduplicated,
            skipped = self.skipped.len(),
            "ingest run finished"
        );
        for unit in &self.skipped {
            info!(pipeline, unit = %unit.unit, reason = %unit.reason, "skipped during run");
        }
    }
}
