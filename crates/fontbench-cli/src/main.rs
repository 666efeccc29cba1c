use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fontbench_core::app::{
    Completeness, Phases, Scoreboard, SyncDriverBuilder, tasks_in_scope, worker_columns,
};
use fontbench_core::config::SyncConfig;
use fontbench_core::domain::WorkerId;
use fontbench_core::impls::{
    ChatInvoker, FileCompletionMatrix, FileTaskStore, FileWatermark, ForumClient,
};
use fontbench_core::ports::{CompletionMatrix, SystemClock, TaskStore, WatermarkStore};

const DEFAULT_CONFIG: &str = "fontbench.toml";

#[derive(Parser)]
#[command(name = "fontbench", about = "Crawl font-identification tasks and collect worker guesses")]
struct Cli {
    /// TOML config file (defaults to ./fontbench.toml when present)
    #[arg(short, long, env = "FONTBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding tasks.json, guesses.json and the watermark
    #[arg(long, env = "FONTBENCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl new tasks, then ask every worker about every pending task
    Sync {
        #[arg(long)]
        skip_crawl: bool,
        #[arg(long)]
        skip_complete: bool,
    },
    /// Top-k accuracy per worker as Markdown
    Report {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Filled / pending cells of the completion matrix
    Status {
        /// How many pending cells to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn load_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => SyncConfig::load(Path::new(DEFAULT_CONFIG))?,
        None => SyncConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.paths.data_dir = dir.clone();
    }
    Ok(config)
}

fn open_tasks(config: &SyncConfig) -> Result<FileTaskStore> {
    let path = config.paths.tasks_path();
    FileTaskStore::open(&path).with_context(|| format!("opening task store {}", path.display()))
}

fn open_guesses(config: &SyncConfig) -> Result<FileCompletionMatrix> {
    let path = config.paths.guesses_path();
    FileCompletionMatrix::open(&path)
        .with_context(|| format!("opening completion matrix {}", path.display()))
}

async fn sync(config: &SyncConfig, phases: Phases) -> Result<()> {
    let forum = Arc::new(
        ForumClient::new(&config.source, SystemClock).context("building forum client")?,
    );
    let invoker = ChatInvoker::from_config(
        &config.workers,
        Duration::from_secs(config.complete.invoke_timeout_secs),
        |name| std::env::var(name).ok(),
    )
    .context("building worker invoker")?;

    let mut driver = SyncDriverBuilder::from_config(config)
        .tasks(open_tasks(config)?)
        .matrix(open_guesses(config)?)
        .watermark(FileWatermark::new(config.paths.watermark_path()))
        .frontier(forum.clone())
        .resolver(forum)
        .invoker(Arc::new(invoker))
        .build()?;

    let report = driver.run_phases(phases).await?;

    if let Some(crawl) = &report.crawl {
        println!(
            "crawl: {} new, {} refreshed, {} failed, stopped on {:?}, watermark {}",
            crawl.inserted, crawl.refreshed, crawl.failed, crawl.stop, crawl.watermark_after
        );
    }
    if let Some(completion) = &report.completion {
        println!(
            "complete: {} recorded, {} failed, {} already done",
            completion.recorded, completion.failed, completion.skipped
        );
    }
    println!("{}", report.completeness);
    Ok(())
}

fn report(config: &SyncConfig, output: Option<&Path>) -> Result<()> {
    let tasks = open_tasks(config)?;
    let guesses = open_guesses(config)?;
    let watermark = FileWatermark::new(config.paths.watermark_path())
        .load()
        .context("reading watermark")?;

    let board = Scoreboard::build(
        &tasks.tasks(),
        &guesses.guesses(),
        &config.worker_ids(),
        watermark,
    );
    let markdown = board.to_markdown();

    match output {
        Some(path) => {
            std::fs::write(path, markdown)
                .with_context(|| format!("writing report to {}", path.display()))?;
            info!(path = %path.display(), rows = board.rows.len(), "report written");
        }
        None => print!("{markdown}"),
    }
    Ok(())
}

fn status(config: &SyncConfig, limit: usize) -> Result<()> {
    let tasks = open_tasks(config)?;
    let guesses = open_guesses(config)?;

    let workers = worker_columns(&config.worker_ids(), &guesses.guesses());
    let in_scope = tasks_in_scope(&tasks, config.complete.scope);

    let status = Completeness::measure(&in_scope, &workers, &guesses);
    println!(
        "{} tasks stored, {} in scope, {} workers",
        tasks.len(),
        in_scope.len(),
        workers.len()
    );
    println!("{status}");
    for key in status.pending.iter().take(limit) {
        println!("  pending {key}");
    }
    if status.pending.len() > limit {
        println!("  ... and {} more", status.pending.len() - limit);
    }
    Ok(())
}

fn worker_names(workers: &[WorkerId]) -> String {
    workers
        .iter()
        .map(|w| w.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fontbench_core=info,fontbench_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(
        data_dir = %config.paths.data_dir.display(),
        workers = %worker_names(&config.worker_ids()),
        "config loaded"
    );

    match cli.command {
        Command::Sync {
            skip_crawl,
            skip_complete,
        } => {
            let phases = Phases {
                crawl: !skip_crawl,
                complete: !skip_complete,
            };
            sync(&config, phases).await
        }
        Command::Report { output } => report(&config, output.as_deref()),
        Command::Status { limit } => status(&config, limit),
    }
}
