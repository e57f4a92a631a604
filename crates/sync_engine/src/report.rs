use serde::Serialize;
use std::fmt;

use crate::repository::UpsertOutcome;

/// A single entity that could not be processed during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    /// Natural key of the entity (player id, team code, season label, page url).
    pub key: String,
    pub stage: &'static str,
    pub message: String,
}

/// Per-run tally; failures are kept instead of aborting the loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated(_) => self.updated += 1,
        }
    }

    pub fn fail(&mut self, key: impl Into<String>, stage: &'static str, error: impl fmt::Display) {
        self.failures.push(ItemFailure {
            key: key.into(),
            stage,
            message: error.to_string(),
        });
    }

    pub fn absorb(&mut self, other: BatchReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }

    pub fn failed_keys(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.key.as_str()).collect()
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "inserted={} updated={} unchanged={} skipped={} failed={}",
            self.inserted,
            self.updated,
            self.unchanged,
            self.skipped,
            self.failures.len()
        )
    }
}
