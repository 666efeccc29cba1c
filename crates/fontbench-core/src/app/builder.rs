//! SyncDriverBuilder - ストアと協調者のワイヤリング
//!
//! # Fail-fast
//! - 必須コンポーネントが欠けていれば build() で BuildError
//! - 同じ worker_id の二重登録も BuildError
//! - 設定値の 0 （checkpoint_every / worker_parallelism）も起動時に弾く

use std::collections::HashSet;
use std::sync::Arc;

use crate::app::driver::{SyncDriver, SyncSettings};
use crate::config::SyncConfig;
use crate::domain::{SyncState, WorkerId};
use crate::ports::{
    CompletionMatrix, FrontierSource, TaskResolver, TaskStore, WatermarkStore, WorkerInvoker,
};

/// BuildError は driver 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing component: {0}")]
    MissingComponent(&'static str),

    #[error("worker {0} is registered twice")]
    DuplicateWorker(WorkerId),

    #[error("invalid setting: {0}")]
    InvalidSetting(&'static str),
}

/// # 使用例
/// ```ignore
/// let driver = SyncDriverBuilder::from_config(&config)
///     .tasks(FileTaskStore::open(config.paths.tasks_path())?)
///     .matrix(FileCompletionMatrix::open(config.paths.guesses_path())?)
///     .watermark(FileWatermark::new(config.paths.watermark_path()))
///     .frontier(forum.clone())
///     .resolver(forum)
///     .invoker(Arc::new(invoker))
///     .build()?;
/// ```
#[derive(Default)]
pub struct SyncDriverBuilder {
    tasks: Option<Box<dyn TaskStore>>,
    matrix: Option<Box<dyn CompletionMatrix>>,
    watermark: Option<Box<dyn WatermarkStore>>,
    frontier: Option<Arc<dyn FrontierSource>>,
    resolver: Option<Arc<dyn TaskResolver>>,
    invoker: Option<Arc<dyn WorkerInvoker>>,
    workers: Vec<WorkerId>,
    settings: SyncSettings,
}

impl SyncDriverBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings and worker list taken from config; stores and collaborators still required.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new()
            .settings(SyncSettings::from_config(config))
            .workers(config.worker_ids())
    }

    pub fn tasks(mut self, store: impl TaskStore + 'static) -> Self {
        self.tasks = Some(Box::new(store));
        self
    }

    pub fn matrix(mut self, matrix: impl CompletionMatrix + 'static) -> Self {
        self.matrix = Some(Box::new(matrix));
        self
    }

    pub fn watermark(mut self, watermark: impl WatermarkStore + 'static) -> Self {
        self.watermark = Some(Box::new(watermark));
        self
    }

    pub fn frontier(mut self, source: Arc<dyn FrontierSource>) -> Self {
        self.frontier = Some(source);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn TaskResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn invoker(mut self, invoker: Arc<dyn WorkerInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn worker(mut self, worker_id: WorkerId) -> Self {
        self.workers.push(worker_id);
        self
    }

    pub fn workers(mut self, workers: impl IntoIterator<Item = WorkerId>) -> Self {
        self.workers.extend(workers);
        self
    }

    pub fn settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<SyncDriver, BuildError> {
        let mut seen = HashSet::new();
        for worker_id in &self.workers {
            if !seen.insert(worker_id) {
                return Err(BuildError::DuplicateWorker(worker_id.clone()));
            }
        }
        if self.settings.crawl.checkpoint_every == 0 {
            return Err(BuildError::InvalidSetting("checkpoint_every must be at least 1"));
        }
        if self.settings.worker_parallelism == 0 {
            return Err(BuildError::InvalidSetting(
                "worker_parallelism must be at least 1",
            ));
        }

        Ok(SyncDriver {
            tasks: self.tasks.ok_or(BuildError::MissingComponent("task store"))?,
            matrix: self
                .matrix
                .ok_or(BuildError::MissingComponent("completion matrix"))?,
            watermark: self
                .watermark
                .ok_or(BuildError::MissingComponent("watermark store"))?,
            frontier: self
                .frontier
                .ok_or(BuildError::MissingComponent("frontier source"))?,
            resolver: self
                .resolver
                .ok_or(BuildError::MissingComponent("task resolver"))?,
            invoker: self
                .invoker
                .ok_or(BuildError::MissingComponent("worker invoker"))?,
            workers: self.workers,
            settings: self.settings,
            state: SyncState::Crawling,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{InMemoryCompletionMatrix, InMemoryTaskStore, InMemoryWatermark};
    use crate::testing::{CountingInvoker, FakeResolver, ScriptedFrontier};

    fn complete_builder() -> SyncDriverBuilder {
        SyncDriverBuilder::new()
            .tasks(InMemoryTaskStore::new())
            .matrix(InMemoryCompletionMatrix::new())
            .watermark(InMemoryWatermark::default())
            .frontier(Arc::new(ScriptedFrontier::new()))
            .resolver(Arc::new(FakeResolver::new()))
            .invoker(Arc::new(CountingInvoker::new()))
    }

    #[test]
    fn build_success() {
        let driver = complete_builder()
            .worker(WorkerId::new("a"))
            .worker(WorkerId::new("b"))
            .build()
            .unwrap();
        assert_eq!(driver.workers().len(), 2);
    }

    #[test]
    fn build_missing_component() {
        let result = SyncDriverBuilder::new()
            .tasks(InMemoryTaskStore::new())
            .matrix(InMemoryCompletionMatrix::new())
            .watermark(InMemoryWatermark::default())
            .build();
        assert!(matches!(
            result,
            Err(BuildError::MissingComponent("frontier source"))
        ));
    }

    #[test]
    fn build_duplicate_worker() {
        let result = complete_builder()
            .workers([WorkerId::new("a"), WorkerId::new("a")])
            .build();
        assert!(matches!(
            result,
            Err(BuildError::DuplicateWorker(id)) if id == WorkerId::new("a")
        ));
    }

    #[test]
    fn build_rejects_zero_parallelism() {
        let mut settings = SyncSettings::default();
        settings.worker_parallelism = 0;
        let result = complete_builder().settings(settings).build();
        assert!(matches!(result, Err(BuildError::InvalidSetting(_))));
    }

    #[test]
    fn from_config_takes_workers_and_settings() {
        let config = SyncConfig::from_toml_str(
            r#"
            [complete]
            worker_parallelism = 2
            [[workers]]
            id = "a"
            model = "m"
            "#,
            std::path::Path::new("inline.toml"),
        )
        .unwrap();
        let builder = SyncDriverBuilder::from_config(&config);
        assert_eq!(builder.workers, vec![WorkerId::new("a")]);
        assert_eq!(builder.settings.worker_parallelism, 2);
    }
}
