//! Sync configuration (TOML)
//!
//! すべてのフィールドに default があるので、空ファイルでも読み込める。
//! workers だけは空だと completion phase が何もしない。
//!
//! ```toml
//! [paths]
//! data_dir = "data"
//!
//! [crawl]
//! checkpoint_every = 10
//! refresh = "on_activity"
//!
//! [complete]
//! pacing_ms = 3000
//!
//! [[workers]]
//! id = "gpt-4o-mini"
//! model = "gpt-4o-mini"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::domain::{Timestamp, WorkerId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub paths: PathsConfig,
    pub crawl: CrawlConfig,
    pub complete: CompleteConfig,
    pub workers: Vec<WorkerConfig>,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub tasks_file: String,
    pub guesses_file: String,
    pub watermark_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            tasks_file: "tasks.json".into(),
            guesses_file: "guesses.json".into(),
            watermark_file: "last_scraped_at.txt".into(),
        }
    }
}

impl PathsConfig {
    pub fn tasks_path(&self) -> PathBuf {
        self.data_dir.join(&self.tasks_file)
    }

    pub fn guesses_path(&self) -> PathBuf {
        self.data_dir.join(&self.guesses_file)
    }

    pub fn watermark_path(&self) -> PathBuf {
        self.data_dir.join(&self.watermark_file)
    }
}

/// When an already-stored open task is fetched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Stored tasks are never re-fetched.
    Never,
    /// Open tasks are re-fetched when they reappear at or after the watermark.
    #[default]
    OnActivity,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Persist the task store after this many newly resolved tasks.
    pub checkpoint_every: usize,
    pub max_pages: Option<u32>,
    pub refresh: RefreshPolicy,
    /// Floor used when no watermark has been committed yet.
    pub initial_watermark: Option<Timestamp>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            checkpoint_every: 10,
            max_pages: None,
            refresh: RefreshPolicy::default(),
            initial_watermark: None,
        }
    }
}

/// Which tasks the completion phase visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionScope {
    #[default]
    OpenOnly,
    All,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompleteConfig {
    pub scope: CompletionScope,
    pub pacing_ms: u64,
    pub pacing_jitter_ms: u64,
    /// How many workers may run concurrently for the same task.
    pub worker_parallelism: usize,
    /// Per-request timeout for worker calls.
    pub invoke_timeout_secs: u64,
}

impl Default for CompleteConfig {
    fn default() -> Self {
        Self {
            scope: CompletionScope::default(),
            pacing_ms: 3000,
            pacing_jitter_ms: 0,
            worker_parallelism: 1,
            invoke_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    pub id: WorkerId,
    pub model: String,
    #[serde(default = "default_worker_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_worker_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: Url,
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_url(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/124.0 Safari/537.36"
                .to_string(),
            timeout_secs: 30,
        }
    }
}

fn default_source_url() -> Url {
    Url::parse("https://www.dafont.com/").expect("static url")
}

// ============================================================================
// Loading
// ============================================================================

impl SyncConfig {
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crawl.checkpoint_every == 0 {
            return Err(ConfigError::Invalid(
                "crawl.checkpoint_every must be at least 1".into(),
            ));
        }
        if self.complete.worker_parallelism == 0 {
            return Err(ConfigError::Invalid(
                "complete.worker_parallelism must be at least 1".into(),
            ));
        }
        let mut seen = HashSet::new();
        for worker in &self.workers {
            if worker.id.as_str().is_empty() {
                return Err(ConfigError::Invalid("worker id must not be empty".into()));
            }
            if !seen.insert(&worker.id) {
                return Err(ConfigError::Invalid(format!(
                    "worker {} is listed twice",
                    worker.id
                )));
            }
        }
        Ok(())
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|w| w.id.clone()).collect()
    }
}
