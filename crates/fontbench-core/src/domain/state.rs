//! State - sync run の状態

use serde::{Deserialize, Serialize};

/// SyncState は 1 回の sync run の状態
///
/// # 状態遷移
/// - Crawling -> Completing -> Done
/// - Crawling | Completing -> Aborted（致命的エラー）
///
/// 1 件単位の失敗は状態ではなく `ItemOutcome::Failed` として扱い、ループは続行する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Crawling,
    Completing,
    Done,
    Aborted,
}

impl SyncState {
    /// Next state on normal progress.
    pub fn advance(self) -> SyncState {
        match self {
            SyncState::Crawling => SyncState::Completing,
            SyncState::Completing => SyncState::Done,
            terminal => terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_progress_reaches_done() {
        let s = SyncState::Crawling.advance().advance();
        assert_eq!(s, SyncState::Done);
        assert_eq!(s.advance(), SyncState::Done);
    }

    #[test]
    fn aborted_stays_aborted() {
        assert_eq!(SyncState::Aborted.advance(), SyncState::Aborted);
    }
}
