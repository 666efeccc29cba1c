//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//!
//! - 永続ストア（同期）: TaskStore, CompletionMatrix, WatermarkStore
//! - 外部協調者（async）: FrontierSource, TaskResolver, WorkerInvoker
//! - テスト容易性: Clock

pub mod clock;
pub mod completion_matrix;
pub mod frontier;
pub mod invoker;
pub mod resolver;
pub mod task_store;
pub mod watermark;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::completion_matrix::CompletionMatrix;
pub use self::frontier::FrontierSource;
pub use self::invoker::WorkerInvoker;
pub use self::resolver::TaskResolver;
pub use self::task_store::{TaskStore, Upsert};
pub use self::watermark::WatermarkStore;
