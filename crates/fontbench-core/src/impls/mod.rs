//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemory\***: テスト用・組み込み用のストア
//! - **File\***: JSON / plain text によるファイル永続化（temp + rename）
//! - **ForumClient**: フォーラムの listing / task page（FrontierSource + TaskResolver）
//! - **ChatInvoker**: OpenAI 互換 chat completions（WorkerInvoker）

pub mod chat;
pub mod file_store;
pub mod forum;
pub mod inmem;
pub(crate) mod json_file;

pub use self::chat::{ChatInvoker, WorkerProfile};
pub use self::file_store::{
    FileCompletionMatrix, FileTaskStore, FileWatermark, format_timestamp, parse_timestamp,
};
pub use self::forum::ForumClient;
pub use self::inmem::{InMemoryCompletionMatrix, InMemoryTaskStore, InMemoryWatermark};
