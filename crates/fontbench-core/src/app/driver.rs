//! SyncDriver - crawl → complete を 1 回ぶん回す
//!
//! # 状態遷移
//! Crawling → Completing → Done、致命的エラーで Aborted。
//!
//! 開始時に 3 つのストアを読み直すので、前回の run がどこで止まっていても
//! 永続化済みの状態から再開できる。ストアが壊れていればネットワークに触る前に止まる。

use std::sync::Arc;

use tracing::{Instrument, error, info, info_span, warn};

use crate::app::complete::{Completer, CompletionReport};
use crate::app::crawl::{CrawlReport, Crawler};
use crate::app::pacing::PacingPolicy;
use crate::app::status::{self, Completeness};
use crate::config::{CompletionScope, CrawlConfig, SyncConfig};
use crate::domain::{RunId, SyncError, SyncState, Task, WorkerId};
use crate::ports::{
    CompletionMatrix, FrontierSource, TaskResolver, TaskStore, WatermarkStore, WorkerInvoker,
};

/// Scheduling knobs for one driver.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub crawl: CrawlConfig,
    pub scope: CompletionScope,
    pub pacing: PacingPolicy,
    pub worker_parallelism: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            scope: CompletionScope::default(),
            pacing: PacingPolicy::default(),
            worker_parallelism: 1,
        }
    }
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            crawl: config.crawl.clone(),
            scope: config.complete.scope,
            pacing: PacingPolicy::from_config(&config.complete),
            worker_parallelism: config.complete.worker_parallelism.max(1),
        }
    }
}

/// Which phases a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
    pub crawl: bool,
    pub complete: bool,
}

impl Phases {
    pub const ALL: Phases = Phases {
        crawl: true,
        complete: true,
    };
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub run_id: RunId,
    pub state: SyncState,
    pub crawl: Option<CrawlReport>,
    pub completion: Option<CompletionReport>,
    pub completeness: Completeness,
}

pub struct SyncDriver {
    pub(super) tasks: Box<dyn TaskStore>,
    pub(super) matrix: Box<dyn CompletionMatrix>,
    pub(super) watermark: Box<dyn WatermarkStore>,
    pub(super) frontier: Arc<dyn FrontierSource>,
    pub(super) resolver: Arc<dyn TaskResolver>,
    pub(super) invoker: Arc<dyn WorkerInvoker>,
    pub(super) workers: Vec<WorkerId>,
    pub(super) settings: SyncSettings,
    pub(super) state: SyncState,
}

impl SyncDriver {
    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn tasks(&self) -> &dyn TaskStore {
        self.tasks.as_ref()
    }

    pub fn matrix(&self) -> &dyn CompletionMatrix {
        self.matrix.as_ref()
    }

    pub fn watermark(&self) -> &dyn WatermarkStore {
        self.watermark.as_ref()
    }

    pub fn workers(&self) -> &[WorkerId] {
        &self.workers
    }

    /// Tasks the completion phase would visit.
    pub fn tasks_in_scope(&self) -> Vec<Task> {
        status::tasks_in_scope(self.tasks.as_ref(), self.settings.scope)
    }

    pub fn completeness(&self) -> Completeness {
        Completeness::measure(&self.tasks_in_scope(), &self.workers, self.matrix.as_ref())
    }

    pub async fn run(&mut self) -> Result<SyncReport, SyncError> {
        self.run_phases(Phases::ALL).await
    }

    pub async fn run_phases(&mut self, phases: Phases) -> Result<SyncReport, SyncError> {
        let run_id = RunId::generate();
        let span = info_span!("sync_run", run_id = %run_id);
        let result = self.drive(run_id, phases).instrument(span).await;
        if let Err(err) = &result {
            self.state = SyncState::Aborted;
            error!(run_id = %run_id, error = %err, "sync aborted");
        }
        result
    }

    async fn drive(&mut self, run_id: RunId, phases: Phases) -> Result<SyncReport, SyncError> {
        self.state = SyncState::Crawling;
        self.reload()?;

        let crawl = if phases.crawl {
            Some(self.crawl().await?)
        } else {
            None
        };
        self.state = self.state.advance();

        let completion = if phases.complete {
            Some(self.complete().await?)
        } else {
            None
        };
        self.state = self.state.advance();

        let completeness = self.completeness();
        info!(state = ?self.state, %completeness, "sync finished");

        Ok(SyncReport {
            run_id,
            state: self.state,
            crawl,
            completion,
            completeness,
        })
    }

    /// Re-read every durable store; any corruption stops the run here.
    fn reload(&mut self) -> Result<(), SyncError> {
        self.tasks.load_all()?;
        self.matrix.load_all()?;
        let watermark = self.watermark.load()?;
        info!(
            tasks = self.tasks.len(),
            guesses = self.matrix.len(),
            watermark = ?watermark,
            "state loaded"
        );
        Ok(())
    }

    async fn crawl(&mut self) -> Result<CrawlReport, SyncError> {
        Crawler {
            tasks: self.tasks.as_mut(),
            watermark: self.watermark.as_mut(),
            source: Arc::clone(&self.frontier),
            resolver: self.resolver.as_ref(),
            config: &self.settings.crawl,
        }
        .run()
        .await
    }

    async fn complete(&mut self) -> Result<CompletionReport, SyncError> {
        if self.workers.is_empty() {
            warn!("no workers registered, nothing to complete");
        }
        Completer {
            tasks: self.tasks.as_ref(),
            matrix: self.matrix.as_mut(),
            invoker: Arc::clone(&self.invoker),
            workers: &self.workers,
            scope: self.settings.scope,
            pacing: &self.settings.pacing,
            parallelism: self.settings.worker_parallelism,
        }
        .run()
        .await
    }
}
