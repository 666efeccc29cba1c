//! In-memory stores（開発用・テスト用）
//!
//! `persist` は「最後に永続化されたスナップショット」を更新し、`load_all` は
//! そのスナップショットに巻き戻す。これでプロセスのクラッシュと再起動を
//! ファイルなしで再現できる。
//!
//! file-backed store もここの索引ロジックをそのまま使う。

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::domain::{CompletionKey, Guess, StoreError, Task, TaskId, Timestamp, WorkerId};
use crate::ports::{CompletionMatrix, TaskStore, Upsert, WatermarkStore};

// ========================================
// Tasks
// ========================================

#[derive(Debug, Default, Clone)]
pub struct InMemoryTaskStore {
    tasks: IndexMap<TaskId, Task>,
    durable: Vec<Task>,
    persist_count: usize,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-durable catalog.
    pub fn with_tasks(tasks: Vec<Task>) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.replace_all(tasks, "memory")?;
        store.durable = store.tasks();
        Ok(store)
    }

    /// Number of checkpoints taken so far.
    pub fn persist_count(&self) -> usize {
        self.persist_count
    }

    /// Replace the catalog with `tasks`, rejecting duplicate ids as corruption.
    pub(crate) fn replace_all(&mut self, tasks: Vec<Task>, location: &str) -> Result<(), StoreError> {
        let mut index = IndexMap::with_capacity(tasks.len());
        for task in tasks {
            if task.task_id.as_str().is_empty() {
                return Err(StoreError::corrupt(location, "task with empty task_id"));
            }
            if index.contains_key(&task.task_id) {
                return Err(StoreError::corrupt(
                    location,
                    format!("duplicate task_id {}", task.task_id),
                ));
            }
            index.insert(task.task_id.clone(), task);
        }
        self.tasks = index;
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }
}

impl TaskStore for InMemoryTaskStore {
    fn upsert(&mut self, task: Task) -> Upsert {
        match self.tasks.entry(task.task_id.clone()) {
            Entry::Occupied(mut slot) => Upsert::Merged(slot.get_mut().merge(task)),
            Entry::Vacant(slot) => {
                slot.insert(task);
                Upsert::Inserted
            }
        }
    }

    fn contains(&self, task_id: &TaskId) -> bool {
        self.tasks.contains_key(task_id)
    }

    fn get(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    fn get_unresolved(&self) -> Vec<Task> {
        self.tasks.values().filter(|t| t.is_open()).cloned().collect()
    }

    fn tasks(&self) -> Vec<Task> {
        self.snapshot()
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn load_all(&mut self) -> Result<(), StoreError> {
        let durable = self.durable.clone();
        self.replace_all(durable, "memory")
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        self.durable = self.snapshot();
        self.persist_count += 1;
        Ok(())
    }
}

// ========================================
// Completion matrix
// ========================================

#[derive(Debug, Default, Clone)]
pub struct InMemoryCompletionMatrix {
    cells: IndexMap<CompletionKey, Guess>,
    durable: Vec<Guess>,
    persist_count: usize,
}

impl InMemoryCompletionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guesses(guesses: Vec<Guess>) -> Result<Self, StoreError> {
        let mut matrix = Self::new();
        matrix.replace_all(guesses, "memory")?;
        matrix.durable = matrix.guesses();
        Ok(matrix)
    }

    pub fn persist_count(&self) -> usize {
        self.persist_count
    }

    /// Replace all cells, rejecting duplicate keys and oversized answers as corruption.
    pub(crate) fn replace_all(
        &mut self,
        guesses: Vec<Guess>,
        location: &str,
    ) -> Result<(), StoreError> {
        let mut cells = IndexMap::with_capacity(guesses.len());
        for guess in guesses {
            if guess.candidates.len() > crate::domain::MAX_CANDIDATES {
                return Err(StoreError::corrupt(
                    location,
                    format!("{} has {} candidates", guess.key(), guess.candidates.len()),
                ));
            }
            let key = guess.key();
            if cells.contains_key(&key) {
                return Err(StoreError::corrupt(
                    location,
                    format!("duplicate completion key {key}"),
                ));
            }
            cells.insert(key, guess);
        }
        self.cells = cells;
        Ok(())
    }

    pub(crate) fn snapshot(&self) -> Vec<Guess> {
        self.cells.values().cloned().collect()
    }
}

impl CompletionMatrix for InMemoryCompletionMatrix {
    fn exists(&self, task_id: &TaskId, worker_id: &WorkerId) -> bool {
        self.cells
            .contains_key(&CompletionKey::new(task_id.clone(), worker_id.clone()))
    }

    fn insert(&mut self, guess: Guess) -> Result<(), StoreError> {
        match self.cells.entry(guess.key()) {
            Entry::Occupied(slot) => Err(StoreError::DuplicateKey(slot.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(guess);
                Ok(())
            }
        }
    }

    fn get(&self, task_id: &TaskId, worker_id: &WorkerId) -> Option<&Guess> {
        self.cells
            .get(&CompletionKey::new(task_id.clone(), worker_id.clone()))
    }

    fn guesses(&self) -> Vec<Guess> {
        self.snapshot()
    }

    fn len(&self) -> usize {
        self.cells.len()
    }

    fn load_all(&mut self) -> Result<(), StoreError> {
        let durable = self.durable.clone();
        self.replace_all(durable, "memory")
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        self.durable = self.snapshot();
        self.persist_count += 1;
        Ok(())
    }
}

// ========================================
// Watermark
// ========================================

#[derive(Debug, Default, Clone)]
pub struct InMemoryWatermark {
    value: Option<Timestamp>,
}

impl InMemoryWatermark {
    pub fn new(value: Option<Timestamp>) -> Self {
        Self { value }
    }
}

impl WatermarkStore for InMemoryWatermark {
    fn load(&self) -> Result<Option<Timestamp>, StoreError> {
        Ok(self.value)
    }

    fn commit(&mut self, value: Timestamp) -> Result<bool, StoreError> {
        if self.value.is_some_and(|current| value < current) {
            return Ok(false);
        }
        self.value = Some(value);
        Ok(true)
    }
}
