//! File-backed stores: one JSON (or plain-text) file per store.
//!
//! - tasks: JSON array of task records
//! - guesses: JSON array of `{task_id, worker_id, candidates}`
//! - watermark: a single timestamp, plain text
//!
//! All writes are full-file atomic replaces (see `json_file`).

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use super::inmem::{InMemoryCompletionMatrix, InMemoryTaskStore};
use super::json_file;
use crate::domain::{Guess, StoreError, Task, TaskId, Timestamp, WorkerId};
use crate::ports::{CompletionMatrix, TaskStore, Upsert, WatermarkStore};

// ========================================
// Tasks
// ========================================

pub struct FileTaskStore {
    path: PathBuf,
    inner: InMemoryTaskStore,
}

impl FileTaskStore {
    /// Open the catalog at `path`. A missing file is an empty catalog.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut store = Self {
            path: path.into(),
            inner: InMemoryTaskStore::new(),
        };
        store.load_all()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskStore for FileTaskStore {
    fn upsert(&mut self, task: Task) -> Upsert {
        self.inner.upsert(task)
    }

    fn contains(&self, task_id: &TaskId) -> bool {
        self.inner.contains(task_id)
    }

    fn get(&self, task_id: &TaskId) -> Option<&Task> {
        self.inner.get(task_id)
    }

    fn get_unresolved(&self) -> Vec<Task> {
        self.inner.get_unresolved()
    }

    fn tasks(&self) -> Vec<Task> {
        self.inner.tasks()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn load_all(&mut self) -> Result<(), StoreError> {
        let location = self.path.display().to_string();
        let tasks: Vec<Task> = json_file::read_records(&self.path)?.unwrap_or_default();
        debug!(path = %location, count = tasks.len(), "loaded tasks");
        self.inner.replace_all(tasks, &location)
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        json_file::write_records(&self.path, &self.inner.snapshot())?;
        debug!(path = %self.path.display(), count = self.inner.len(), "saved tasks");
        Ok(())
    }
}

// ========================================
// Completion matrix
// ========================================

pub struct FileCompletionMatrix {
    path: PathBuf,
    inner: InMemoryCompletionMatrix,
}

impl FileCompletionMatrix {
    /// Open the matrix at `path`. A missing file is an empty matrix.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let mut matrix = Self {
            path: path.into(),
            inner: InMemoryCompletionMatrix::new(),
        };
        matrix.load_all()?;
        Ok(matrix)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CompletionMatrix for FileCompletionMatrix {
    fn exists(&self, task_id: &TaskId, worker_id: &WorkerId) -> bool {
        self.inner.exists(task_id, worker_id)
    }

    fn insert(&mut self, guess: Guess) -> Result<(), StoreError> {
        self.inner.insert(guess)
    }

    fn get(&self, task_id: &TaskId, worker_id: &WorkerId) -> Option<&Guess> {
        self.inner.get(task_id, worker_id)
    }

    fn guesses(&self) -> Vec<Guess> {
        self.inner.guesses()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn load_all(&mut self) -> Result<(), StoreError> {
        let location = self.path.display().to_string();
        let guesses: Vec<Guess> = json_file::read_records(&self.path)?.unwrap_or_default();
        debug!(path = %location, count = guesses.len(), "loaded guesses");
        self.inner.replace_all(guesses, &location)
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        json_file::write_records(&self.path, &self.inner.snapshot())?;
        debug!(path = %self.path.display(), count = self.inner.len(), "saved guesses");
        Ok(())
    }
}

// ========================================
// Watermark
// ========================================

pub struct FileWatermark {
    path: PathBuf,
}

impl FileWatermark {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse RFC 3339, or a naive ISO 8601 datetime taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(value: Timestamp) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl WatermarkStore for FileWatermark {
    fn load(&self) -> Result<Option<Timestamp>, StoreError> {
        let Some(text) = json_file::read_text(&self.path)? else {
            return Ok(None);
        };
        parse_timestamp(&text).map(Some).ok_or_else(|| {
            StoreError::corrupt(
                self.path.display().to_string(),
                format!("not a timestamp: {:?}", text.trim()),
            )
        })
    }

    fn commit(&mut self, value: Timestamp) -> Result<bool, StoreError> {
        if let Some(current) = self.load()?
            && value < current
        {
            warn!(
                current = %format_timestamp(current),
                rejected = %format_timestamp(value),
                "refusing to move watermark backwards"
            );
            return Ok(false);
        }
        json_file::write_atomic(&self.path, format_timestamp(value).as_bytes())?;
        Ok(true)
    }
}
