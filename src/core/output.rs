//! Shared summary types for batch operations.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every item succeeded (or there was nothing to do).
    Complete,
    /// Some items succeeded, some did not.
    Partial,
    /// No item succeeded.
    Failed,
}

/// Summary of a batch run over independent items.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub status: BatchStatus,
}

impl BatchSummary {
    pub fn new(succeeded: usize, failed: usize) -> Self {
        let status = match (succeeded, failed) {
            (_, 0) => BatchStatus::Complete,
            (0, _) => BatchStatus::Failed,
            _ => BatchStatus::Partial,
        };
        Self {
            total: succeeded + failed,
            succeeded,
            failed,
            status,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == BatchStatus::Complete
    }
}
