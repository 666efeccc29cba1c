//! Guess model: one cell of the completion matrix.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{TaskId, WorkerId};

/// Maximum number of ranked candidates a worker may return.
pub const MAX_CANDIDATES: usize = 5;

/// Composite identity of one completion-matrix cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompletionKey {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
}

impl CompletionKey {
    pub fn new(task_id: TaskId, worker_id: WorkerId) -> Self {
        Self { task_id, worker_id }
    }
}

impl fmt::Display for CompletionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.task_id, self.worker_id)
    }
}

/// Ordered candidate labels, best first.
///
/// - 空白の候補は捨てる
/// - 最大 `MAX_CANDIDATES` 件
/// - 空でも有効（worker が回答を控えた）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedLabels(Vec<String>);

impl RankedLabels {
    /// Normalize raw candidates: trim, drop blanks, keep the first `MAX_CANDIDATES`.
    pub fn from_candidates<I, S>(candidates: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let labels = candidates
            .into_iter()
            .flatten()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .take(MAX_CANDIDATES)
            .collect();
        Self(labels)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// 1-based rank of the first candidate matching `label` (case-insensitive).
    pub fn rank_of(&self, label: &str) -> Option<usize> {
        self.0
            .iter()
            .position(|c| labels_match(c, label))
            .map(|i| i + 1)
    }
}

impl fmt::Display for RankedLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Case-insensitive equality used to score guesses against a resolved label.
pub fn labels_match(guessed: &str, resolved: &str) -> bool {
    guessed.to_lowercase() == resolved.to_lowercase()
}

/// A worker's answer for a task. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guess {
    pub task_id: TaskId,
    pub worker_id: WorkerId,
    pub candidates: RankedLabels,
}

impl Guess {
    pub fn new(task_id: TaskId, worker_id: WorkerId, candidates: RankedLabels) -> Self {
        Self {
            task_id,
            worker_id,
            candidates,
        }
    }

    pub fn key(&self) -> CompletionKey {
        CompletionKey::new(self.task_id.clone(), self.worker_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn blanks_are_dropped_and_order_kept() {
        let labels = RankedLabels::from_candidates([
            Some("Futura"),
            None,
            Some("  "),
            Some(" Avenir "),
        ]);
        assert_eq!(labels.as_slice(), ["Futura", "Avenir"]);
    }

    #[test]
    fn at_most_five_candidates() {
        let raw = (1..=7).map(|i| Some(format!("Font {i}")));
        let labels = RankedLabels::from_candidates(raw);
        assert_eq!(labels.len(), MAX_CANDIDATES);
        assert_eq!(labels.as_slice()[4], "Font 5");
    }

    #[test]
    fn empty_is_a_valid_abstention() {
        let labels = RankedLabels::from_candidates(Vec::<Option<&str>>::new());
        assert!(labels.is_empty());
    }

    #[rstest]
    #[case::exact("Futura", Some(1))]
    #[case::case_insensitive("avenir", Some(2))]
    #[case::missing("Arial", None)]
    fn rank_of_matches_case_insensitively(#[case] label: &str, #[case] expected: Option<usize>) {
        let labels = RankedLabels::from_candidates([Some("Futura"), Some("Avenir")]);
        assert_eq!(labels.rank_of(label), expected);
    }

    #[test]
    fn guess_json_shape() {
        let guess = Guess::new(
            TaskId::new("1"),
            WorkerId::new("gpt-4o-mini"),
            RankedLabels::from_candidates([Some("Futura")]),
        );
        let v = serde_json::to_value(&guess).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "task_id": "1",
                "worker_id": "gpt-4o-mini",
                "candidates": ["Futura"],
            })
        );
    }
}
