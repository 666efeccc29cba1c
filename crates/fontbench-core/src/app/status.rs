//! Status - completion matrix の埋まり具合
//!
//! task × worker の全セルのうち、いくつ guess が入っているか。
//! 空きセル（pending）は task 順 × worker 登録順で並ぶ。
//!
//! 対象 task と worker 列の決め方は sync / status / report で共通。

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::config::CompletionScope;
use crate::domain::{CompletionKey, Guess, Task, WorkerId};
use crate::ports::{CompletionMatrix, TaskStore};

/// Tasks the completion phase visits under `scope`, in store order.
pub fn tasks_in_scope(tasks: &dyn TaskStore, scope: CompletionScope) -> Vec<Task> {
    match scope {
        CompletionScope::OpenOnly => tasks.get_unresolved(),
        CompletionScope::All => tasks.tasks(),
    }
}

/// Worker columns: the configured workers, or every worker found in `guesses` sorted by id.
pub fn worker_columns(configured: &[WorkerId], guesses: &[Guess]) -> Vec<WorkerId> {
    if !configured.is_empty() {
        return configured.to_vec();
    }
    guesses
        .iter()
        .map(|g| g.worker_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Completeness {
    pub filled: usize,
    pub total: usize,
    pub pending: Vec<CompletionKey>,
}

impl Completeness {
    pub fn measure(tasks: &[Task], workers: &[WorkerId], matrix: &dyn CompletionMatrix) -> Self {
        let mut status = Completeness {
            total: tasks.len() * workers.len(),
            ..Default::default()
        };
        for task in tasks {
            for worker_id in workers {
                if matrix.exists(&task.task_id, worker_id) {
                    status.filled += 1;
                } else {
                    status
                        .pending
                        .push(CompletionKey::new(task.task_id.clone(), worker_id.clone()));
                }
            }
        }
        status
    }

    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }

    /// Filled fraction; an empty matrix counts as complete.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.filled as f64 / self.total as f64
        }
    }
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} cells filled ({:.1}%)",
            self.filled,
            self.total,
            self.ratio() * 100.0
        )
    }
}
