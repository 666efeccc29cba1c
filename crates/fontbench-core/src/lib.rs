//! fontbench-core
//!
//! Incremental sync engine for the font-identification benchmark.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, guess, frontier, outcome, state, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, CompletionMatrix, WatermarkStore, FrontierSource, TaskResolver, WorkerInvoker, Clock）
//! - **app**: アプリケーションロジック（builder, driver, crawl, complete, status, report）
//! - **impls**: 実装（in-memory / file ストア、フォーラム adapter、chat invoker）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

#[cfg(test)]
pub(crate) mod testing;
