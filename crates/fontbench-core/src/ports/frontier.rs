//! FrontierSource port - 新しい順に並んだページ単位の feed

use async_trait::async_trait;

use crate::domain::{FrontierError, FrontierPage};

/// FrontierSource は 1 ページ分の summary を返す
///
/// # 契約
/// - ページ番号は 1 始まり
/// - ページ内・ページ間ともに `updated_at` の降順
/// - 終端は `FrontierPage::exhausted` か `FrontierError::Exhausted` で通知する
#[async_trait]
pub trait FrontierSource: Send + Sync {
    async fn fetch_page(&self, page: u32) -> Result<FrontierPage, FrontierError>;
}
