use std::fmt;
use std::path::PathBuf;

use autosage_domain::{FailureKind, PipelineError};

use crate::runner::CompletedItem;

/// Result of processing one input item.
#[derive(Debug)]
pub enum ItemOutcome {
    Succeeded(CompletedItem),
    /// The target directory already held a generated level.
    Skipped(PathBuf),
    Failed(PipelineError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemFailure {
    pub label: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Tally of a batch run. Only failures are kept in detail.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl RunSummary {
    pub fn record(&mut self, label: &str, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Succeeded(_) => self.succeeded += 1,
            ItemOutcome::Skipped(_) => self.skipped += 1,
            ItemOutcome::Failed(err) => self.failures.push(ItemFailure {
                label: label.to_string(),
                kind: err.kind(),
                message: err.to_string(),
            }),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn timed_out(&self) -> usize {
        self.failures
            .iter()
            .filter(|failure| failure.kind == FailureKind::TimedOut)
            .count()
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed()
    }

    pub fn exit_code(&self) -> i32 {
        if self.failures.is_empty() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed: {} succeeded, {} skipped, {} failed",
            self.total(),
            self.succeeded,
            self.skipped,
            self.failed()
        )?;
        if self.timed_out() > 0 {
            write!(f, " ({} timed out)", self.timed_out())?;
        }
        Ok(())
    }
}
