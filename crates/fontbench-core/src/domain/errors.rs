//! Errors - エラー型と分類
//!
//! 外部協調者（feed, worker）の失敗は `ErrorKind` で分類し、ループはそれを見て
//! 続行か中止かを決める。resolver の失敗は常に 1 件単位。
//! `StoreError` と `SyncError` は型そのものが致命的です。

use thiserror::Error;

use super::guess::CompletionKey;
use super::ids::{TaskId, WorkerId};

/// ErrorKind は外部協調者の失敗の運用分類
///
/// - Recoverable: ログを出して次の item へ。次回 run で自然に再試行される
/// - Expected: 正常な終了条件（feed の終端など）
/// - Fatal: 設定の誤りなど、再試行しても直らない。run を中止する
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Recoverable,
    Expected,
    Fatal,
}

/// Frontier (feed) errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrontierError {
    /// Transient network/HTTP failure while fetching a page.
    #[error("failed to fetch frontier page {page}: {message}")]
    Fetch { page: u32, message: String },

    /// The feed has no more pages.
    #[error("frontier exhausted at page {page}")]
    Exhausted { page: u32 },
}

impl FrontierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrontierError::Fetch { .. } => ErrorKind::Recoverable,
            FrontierError::Exhausted { .. } => ErrorKind::Expected,
        }
    }
}

/// Failure to turn one frontier entry into a task record.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("request for {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url}: cannot derive a task id from the url")]
    BadUrl { url: String },

    #[error("{url}: missing {field}")]
    MissingField { url: String, field: &'static str },

    #[error("resolved task id {resolved} does not match frontier id {expected}")]
    IdMismatch { expected: TaskId, resolved: TaskId },
}

/// Worker invocation failure (timeout, quota, malformed answer, ...).
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("no invoker configured for worker {0}")]
    UnknownWorker(WorkerId),

    #[error("worker configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("worker api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed worker response: {0}")]
    Malformed(String),
}

impl InvocationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvocationError::UnknownWorker(_) | InvocationError::Config(_) => ErrorKind::Fatal,
            InvocationError::Network(_)
            | InvocationError::Api { .. }
            | InvocationError::Malformed(_) => ErrorKind::Recoverable,
        }
    }
}

/// Durable store errors. All of them stop the run.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert over an existing completion key: the at-most-once guarantee may already be broken.
    #[error("completion key {0} already exists")]
    DuplicateKey(CompletionKey),

    #[error("corrupt state in {location}: {reason}")]
    CorruptState { location: String, reason: String },

    #[error("i/o error on {location}: {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {location}: {source}")]
    Encode {
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn corrupt(location: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::CorruptState {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal error that aborts a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("worker task for {task_id} panicked or was cancelled: {message}")]
    Join { task_id: TaskId, message: String },

    /// Worker failure classified as `ErrorKind::Fatal` (misconfiguration).
    #[error("cannot invoke worker {worker_id} for task {task_id}: {source}")]
    Invocation {
        task_id: TaskId,
        worker_id: WorkerId,
        #[source]
        source: InvocationError,
    },
}
