//! Scripted fakes for the external collaborators (test only).

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use url::Url;

use crate::domain::{
    FrontierEntry, FrontierError, FrontierPage, InvocationError, RankedLabels, ResolveError,
    Task, TaskId, Timestamp, WorkerId,
};
use crate::impls::forum::task_id_from_url;
use crate::ports::{FrontierSource, TaskResolver, WorkerInvoker};

/// `2025-06-01T12:00:00Z` shifted by `minutes`.
pub(crate) fn at(minutes: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
}

pub(crate) fn task_url(id: &str) -> String {
    format!("https://forum.test/forum/read/{id}/slug")
}

// ============================================================================
// Frontier
// ============================================================================

/// Pages are served in script order; anything past the script is an empty page.
#[derive(Default)]
pub(crate) struct ScriptedFrontier {
    pages: Vec<Result<FrontierPage, String>>,
    requested: Mutex<Vec<u32>>,
}

impl ScriptedFrontier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn entries(entries: Vec<(&str, Timestamp)>) -> Vec<FrontierEntry> {
        entries
            .into_iter()
            .map(|(id, updated_at)| FrontierEntry::new(id, task_url(id), updated_at))
            .collect()
    }

    pub(crate) fn page(mut self, entries: Vec<(&str, Timestamp)>) -> Self {
        self.pages.push(Ok(FrontierPage::new(Self::entries(entries))));
        self
    }

    pub(crate) fn last_page(mut self, entries: Vec<(&str, Timestamp)>) -> Self {
        self.pages.push(Ok(FrontierPage::last(Self::entries(entries))));
        self
    }

    pub(crate) fn fail_page(mut self, message: &str) -> Self {
        self.pages.push(Err(message.to_string()));
        self
    }

    pub(crate) fn requested_pages(&self) -> Vec<u32> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl FrontierSource for ScriptedFrontier {
    async fn fetch_page(&self, page: u32) -> Result<FrontierPage, FrontierError> {
        self.requested.lock().unwrap().push(page);
        match self.pages.get(page as usize - 1) {
            Some(Ok(scripted)) => Ok(scripted.clone()),
            Some(Err(message)) => Err(FrontierError::Fetch {
                page,
                message: message.clone(),
            }),
            None => Ok(FrontierPage::new(Vec::new())),
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Builds a task from the url; behaviour per id can be changed between runs.
#[derive(Default)]
pub(crate) struct FakeResolver {
    labels: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    renamed: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_label(&self, id: &str, label: &str) {
        self.labels
            .lock()
            .unwrap()
            .insert(id.to_string(), label.to_string());
    }

    pub(crate) fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub(crate) fn heal(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }

    /// Resolve `id` to a task whose id is `other`.
    pub(crate) fn rename(&self, id: &str, other: &str) {
        self.renamed
            .lock()
            .unwrap()
            .insert(id.to_string(), other.to_string());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskResolver for FakeResolver {
    async fn resolve(&self, url: &str) -> Result<Task, ResolveError> {
        let parsed = Url::parse(url).map_err(|_| ResolveError::BadUrl {
            url: url.to_string(),
        })?;
        let id = task_id_from_url(&parsed).ok_or_else(|| ResolveError::BadUrl {
            url: url.to_string(),
        })?;
        let id = id.as_str().to_string();
        self.calls.lock().unwrap().push(id.clone());

        if self.failing.lock().unwrap().contains(&id) {
            return Err(ResolveError::Http {
                url: url.to_string(),
                message: "HTTP 500".into(),
            });
        }
        let task_id = self
            .renamed
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.clone());
        Ok(Task {
            task_id: TaskId::new(task_id),
            source_url: url.to_string(),
            title: format!("title {id}"),
            user_instructions: None,
            image_url: format!("https://forum.test/forum/attach/orig/{id}.png"),
            resolved_label: self.labels.lock().unwrap().get(&id).cloned(),
            last_activity_at: None,
        })
    }
}

// ============================================================================
// Invoker
// ============================================================================

/// Answers `"<worker> guess"` for every task and records each call.
#[derive(Default)]
pub(crate) struct CountingInvoker {
    failing: Mutex<HashSet<(String, String)>>,
    unknown: Mutex<HashSet<String>>,
    answers: Mutex<HashMap<(String, String), Vec<String>>>,
    calls: Mutex<Vec<(TaskId, WorkerId)>>,
    hang_after: Option<usize>,
    started: AtomicUsize,
}

impl CountingInvoker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Calls after the first `n` never return, as if the process died mid-call.
    pub(crate) fn hanging_after(n: usize) -> Self {
        Self {
            hang_after: Some(n),
            ..Self::default()
        }
    }

    pub(crate) fn fail(&self, task: &str, worker: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert((task.to_string(), worker.to_string()));
    }

    /// Calls for `worker` fail as if no profile were configured for it.
    pub(crate) fn forget(&self, worker: &str) {
        self.unknown.lock().unwrap().insert(worker.to_string());
    }

    pub(crate) fn answer(&self, task: &str, worker: &str, labels: &[&str]) {
        self.answers.lock().unwrap().insert(
            (task.to_string(), worker.to_string()),
            labels.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub(crate) fn calls(&self) -> Vec<(TaskId, WorkerId)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkerInvoker for CountingInvoker {
    async fn invoke(
        &self,
        task: &Task,
        worker_id: &WorkerId,
    ) -> Result<RankedLabels, InvocationError> {
        let nth = self.started.fetch_add(1, Ordering::SeqCst);
        if self.hang_after.is_some_and(|n| nth >= n) {
            std::future::pending::<()>().await;
        }
        self.calls
            .lock()
            .unwrap()
            .push((task.task_id.clone(), worker_id.clone()));

        if self.unknown.lock().unwrap().contains(worker_id.as_str()) {
            return Err(InvocationError::UnknownWorker(worker_id.clone()));
        }
        let key = (task.task_id.to_string(), worker_id.to_string());
        if self.failing.lock().unwrap().contains(&key) {
            return Err(InvocationError::Api {
                status: 429,
                message: "rate limited".into(),
            });
        }
        let labels = self
            .answers
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| vec![format!("{worker_id} guess")]);
        Ok(RankedLabels::from_candidates(labels.into_iter().map(Some)))
    }
}
