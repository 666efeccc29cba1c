//! CompletionMatrix port - (task, worker) ごとの実行記録
//!
//! at-most-once 保証の中心です。worker の呼び出しは高価で冪等ではないため、
//! 呼び出し前に必ず `exists` で確認し、成功直後に `insert` + `persist` します。

use crate::domain::{Guess, StoreError, TaskId, WorkerId};

/// CompletionMatrix は疎な (task × worker) 表
pub trait CompletionMatrix: Send + Sync {
    fn exists(&self, task_id: &TaskId, worker_id: &WorkerId) -> bool;

    /// Record a guess. Fails with `StoreError::DuplicateKey` if the key is present.
    fn insert(&mut self, guess: Guess) -> Result<(), StoreError>;

    fn get(&self, task_id: &TaskId, worker_id: &WorkerId) -> Option<&Guess>;

    /// All guesses, in insertion order.
    fn guesses(&self) -> Vec<Guess>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace in-memory state with the durable copy.
    fn load_all(&mut self) -> Result<(), StoreError>;

    /// Checkpoint: durable full write of the current state.
    fn persist(&mut self) -> Result<(), StoreError>;
}
