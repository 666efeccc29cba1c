//! Outcome model: per-item result consumed by the sync loops.
//!
//! Per-item work (one resolve, one invocation) never returns a bare `Result`
//! to the loop. It returns an `ItemOutcome`, and fatal conditions travel on a
//! separate `Err(SyncError)` path, so the two cannot be confused.

use serde::{Deserialize, Serialize};

/// Classification of one item's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Done,
    Skipped,
    Failed,
}

/// Result of processing one item (a frontier entry or a completion key).
///
/// - `Done`: forward progress was recorded.
/// - `Skipped`: nothing to do (already stored / already completed).
/// - `Failed`: recoverable failure; the item stays eligible for the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Done,
    Skipped,
    Failed { reason: String },
}

impl ItemOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        ItemOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            ItemOutcome::Done => OutcomeKind::Done,
            ItemOutcome::Skipped => OutcomeKind::Skipped,
            ItemOutcome::Failed { .. } => OutcomeKind::Failed,
        }
    }
}
