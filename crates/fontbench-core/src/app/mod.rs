//! App - アプリケーション層
//!
//! ports を組み合わせて sync の流れを実装します。
//!
//! # 主要コンポーネント
//! - **SyncDriverBuilder**: ストアと協調者のワイヤリング（fail-fast）
//! - **SyncDriver**: Crawling → Completing → Done の状態機械
//! - **Frontier**: ページ送りを隠した pull 型イテレータ
//! - **Crawler / Completer**: 各フェーズの本体
//! - **PacingPolicy**: task sweep 間の待ち時間
//! - **Completeness / Scoreboard**: status と report

pub mod builder;
pub mod complete;
pub mod crawl;
pub mod driver;
pub mod frontier;
pub mod pacing;
pub mod report;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, SyncDriverBuilder};
pub use self::complete::CompletionReport;
pub use self::crawl::{CrawlReport, CrawlStop};
pub use self::driver::{Phases, SyncDriver, SyncReport, SyncSettings};
pub use self::frontier::Frontier;
pub use self::pacing::PacingPolicy;
pub use self::report::{Cell, Scoreboard, TaskRow, WorkerScore};
pub use self::status::{Completeness, tasks_in_scope, worker_columns};
