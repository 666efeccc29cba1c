//! WorkerInvoker port - task を worker に渡して候補ラベルを得る
//!
//! 呼び出しは冪等とは限りません。重複実行を防ぐのは呼び出し側の
//! CompletionMatrix による事前確認です。

use async_trait::async_trait;

use crate::domain::{InvocationError, RankedLabels, Task, WorkerId};

#[async_trait]
pub trait WorkerInvoker: Send + Sync {
    async fn invoke(&self, task: &Task, worker_id: &WorkerId)
    -> Result<RankedLabels, InvocationError>;
}
