//! Task record: one identification request discovered on the forum.

use serde::{Deserialize, Serialize};

use super::frontier::Timestamp;
use super::ids::TaskId;

/// A font identification task.
///
/// `resolved_label` is `None` while the task is open. Once a human confirms the
/// answer on the forum it becomes `Some(..)` and never reverts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub source_url: String,
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_instructions: Option<String>,

    pub image_url: String,

    #[serde(default)]
    pub resolved_label: Option<String>,

    /// Feed timestamp the task was last fetched for. 同じ活動を二度取りに行かないための目印
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<Timestamp>,
}

/// Result of merging a freshly resolved copy into a stored task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMerge {
    /// Stored copy did not change.
    Unchanged,
    /// Descriptive fields changed, label unchanged.
    Updated,
    /// Label went from absent to present.
    Resolved,
    /// Fresh copy carried a different label than the stored one; kept the stored label.
    Conflict,
}

impl Task {
    pub fn is_open(&self) -> bool {
        self.resolved_label.is_none()
    }

    /// Feed activity at `at` is newer than anything this record was fetched for.
    ///
    /// Records without a stored activity time fall back to `floor`.
    pub fn has_activity_after(&self, at: Timestamp, floor: Timestamp) -> bool {
        at > self.last_activity_at.unwrap_or(floor)
    }

    /// Merge a freshly resolved copy of the same task into `self`.
    ///
    /// Invariants:
    /// - a present label never reverts to absent
    /// - a present label is never replaced by a different one
    pub fn merge(&mut self, fresh: Task) -> LabelMerge {
        debug_assert_eq!(self.task_id, fresh.task_id);

        let label = match (&self.resolved_label, fresh.resolved_label) {
            (Some(current), Some(new)) if *current != new => {
                return LabelMerge::Conflict;
            }
            (Some(current), _) => Some(current.clone()),
            (None, new) => new,
        };
        let resolved_now = self.resolved_label.is_none() && label.is_some();

        let merged = Task {
            task_id: fresh.task_id,
            source_url: fresh.source_url,
            title: fresh.title,
            user_instructions: fresh
                .user_instructions
                .or_else(|| self.user_instructions.clone()),
            image_url: fresh.image_url,
            resolved_label: label,
            last_activity_at: self.last_activity_at.max(fresh.last_activity_at),
        };
        if merged == *self {
            return LabelMerge::Unchanged;
        }
        *self = merged;
        if resolved_now {
            LabelMerge::Resolved
        } else {
            LabelMerge::Updated
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_task(id: &str, label: Option<&str>) -> Task {
    Task {
        task_id: TaskId::new(id),
        source_url: format!("https://www.dafont.com/forum/read/{id}/some-title"),
        title: format!("title {id}"),
        user_instructions: None,
        image_url: format!("https://www.dafont.com/forum/attach/orig/{id}.png"),
        resolved_label: label.map(str::to_string),
        last_activity_at: None,
    }
}
