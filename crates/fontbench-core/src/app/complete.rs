//! Completion phase - (task × worker) の空きセルを埋める
//!
//! - invoke の前に必ず `exists` で確認する（at-most-once）
//! - 成功したら即 insert → persist（クラッシュしても失うのは実行中の 1 件だけ）
//! - 失敗はキーを空けたままにして次回の run に回す
//! - invoke が 1 回でもあった task の後で pacing を入れる
//!
//! worker_parallelism > 1 のときは同じ task の worker を JoinSet で並行に投げるが、
//! matrix への書き込みはこのループだけが行う。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::app::pacing::PacingPolicy;
use crate::app::status::tasks_in_scope;
use crate::config::CompletionScope;
use crate::domain::{
    ErrorKind, Guess, InvocationError, ItemOutcome, OutcomeKind, RankedLabels, SyncError, Task, WorkerId,
};
use crate::ports::{CompletionMatrix, TaskStore, WorkerInvoker};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionReport {
    pub tasks_visited: usize,
    pub invoked: usize,
    pub recorded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pauses: usize,
}

impl CompletionReport {
    fn tally(&mut self, outcome: &ItemOutcome) {
        match outcome.kind() {
            OutcomeKind::Done => self.recorded += 1,
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
    }
}

pub(crate) struct Completer<'a> {
    pub(crate) tasks: &'a dyn TaskStore,
    pub(crate) matrix: &'a mut dyn CompletionMatrix,
    pub(crate) invoker: Arc<dyn WorkerInvoker>,
    pub(crate) workers: &'a [WorkerId],
    pub(crate) scope: CompletionScope,
    pub(crate) pacing: &'a PacingPolicy,
    pub(crate) parallelism: usize,
}

impl Completer<'_> {
    pub(crate) async fn run(mut self) -> Result<CompletionReport, SyncError> {
        let tasks = tasks_in_scope(self.tasks, self.scope);
        info!(
            tasks = tasks.len(),
            workers = self.workers.len(),
            scope = ?self.scope,
            "completion started"
        );

        let mut report = CompletionReport::default();
        for task in tasks {
            report.tasks_visited += 1;

            let pending: Vec<WorkerId> = self
                .workers
                .iter()
                .filter(|w| !self.matrix.exists(&task.task_id, w))
                .cloned()
                .collect();
            report.skipped += self.workers.len() - pending.len();
            if pending.is_empty() {
                debug!(task_id = %task.task_id, "all workers done");
                continue;
            }

            report.invoked += pending.len();
            if self.parallelism <= 1 || pending.len() == 1 {
                self.sweep_sequential(task, pending, &mut report).await?;
            } else {
                self.sweep_parallel(task, pending, &mut report).await?;
            }

            self.pacing.pause().await;
            report.pauses += 1;
        }

        info!(
            invoked = report.invoked,
            recorded = report.recorded,
            failed = report.failed,
            "completion finished"
        );
        Ok(report)
    }

    async fn sweep_sequential(
        &mut self,
        task: Task,
        pending: Vec<WorkerId>,
        report: &mut CompletionReport,
    ) -> Result<(), SyncError> {
        for worker_id in pending {
            let result = self.invoker.invoke(&task, &worker_id).await;
            let outcome = self.record(&task, worker_id, result)?;
            report.tally(&outcome);
        }
        Ok(())
    }

    async fn sweep_parallel(
        &mut self,
        task: Task,
        pending: Vec<WorkerId>,
        report: &mut CompletionReport,
    ) -> Result<(), SyncError> {
        let task = Arc::new(task);
        let permits = Arc::new(Semaphore::new(self.parallelism));
        let mut running = JoinSet::new();

        for worker_id in pending {
            let task = Arc::clone(&task);
            let invoker = Arc::clone(&self.invoker);
            let permits = Arc::clone(&permits);
            running.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let result = invoker.invoke(&task, &worker_id).await;
                (worker_id, result)
            });
        }

        while let Some(joined) = running.join_next().await {
            let (worker_id, result) = joined.map_err(|e| SyncError::Join {
                task_id: task.task_id.clone(),
                message: e.to_string(),
            })?;
            let outcome = self.record(&task, worker_id, result)?;
            report.tally(&outcome);
        }
        Ok(())
    }

    /// Record one invocation result. Store errors and fatal worker errors escape as `Err`.
    fn record(
        &mut self,
        task: &Task,
        worker_id: WorkerId,
        result: Result<RankedLabels, InvocationError>,
    ) -> Result<ItemOutcome, SyncError> {
        match result {
            Ok(candidates) => {
                info!(
                    task_id = %task.task_id,
                    worker_id = %worker_id,
                    candidates = %candidates,
                    "guess recorded"
                );
                self.matrix
                    .insert(Guess::new(task.task_id.clone(), worker_id, candidates))?;
                self.matrix.persist()?;
                Ok(ItemOutcome::Done)
            }
            Err(err) if err.kind() == ErrorKind::Fatal => Err(SyncError::Invocation {
                task_id: task.task_id.clone(),
                worker_id,
                source: err,
            }),
            Err(err) => {
                warn!(
                    task_id = %task.task_id,
                    worker_id = %worker_id,
                    error = %err,
                    "worker failed, will retry next run"
                );
                Ok(ItemOutcome::failed(err.to_string()))
            }
        }
    }
}
