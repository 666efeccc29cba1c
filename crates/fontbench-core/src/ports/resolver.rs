//! TaskResolver port - summary の URL から task レコードを取得

use async_trait::async_trait;

use crate::domain::{ResolveError, Task};

#[async_trait]
pub trait TaskResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<Task, ResolveError>;
}
