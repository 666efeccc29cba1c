//! TaskStore port - task catalog の正本（source of truth）
//!
//! # 設計原則
//! - task_id ごとに 1 レコード（upsert は置き換え、重複しない）
//! - 挿入順を保持（発見順 = feed の新しい順）
//! - persist は全体の上書き（append log ではない）

use crate::domain::{LabelMerge, StoreError, Task, TaskId};

/// What an upsert did to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Merged(LabelMerge),
}

/// TaskStore は task の追加・更新と永続化を担う
pub trait TaskStore: Send + Sync {
    /// Insert a new task or merge into the stored one with the same id.
    fn upsert(&mut self, task: Task) -> Upsert;

    fn contains(&self, task_id: &TaskId) -> bool;

    fn get(&self, task_id: &TaskId) -> Option<&Task>;

    /// Tasks without a resolved label, in insertion order.
    fn get_unresolved(&self) -> Vec<Task>;

    /// All tasks, in insertion order.
    fn tasks(&self) -> Vec<Task>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace in-memory state with the durable copy.
    fn load_all(&mut self) -> Result<(), StoreError>;

    /// Checkpoint: durable full write of the current state.
    fn persist(&mut self) -> Result<(), StoreError>;
}
