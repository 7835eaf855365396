//! queuectl - background job queue for shell commands
//!
//! Main entry point for the queuectl CLI and worker process.

mod cli;
mod cmd_queue;
mod cmd_worker;
mod pid;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use queuectl_config::{ConfigLoader, ConfigValidator, EnvOverrides, QueueSettings};
use queuectl_workqueue::{
    ConfigManager, DeadLetterManager, FileDocumentStore, JobManager, SharedDocument,
};

use crate::cli::{Cli, Commands, ConfigAction, DlqAction, WorkerAction};

/// Handles shared by every command.
pub(crate) struct Context {
    /// Effective settings: file and environment, then the persisted config.
    pub settings: QueueSettings,
    pub jobs: Arc<JobManager>,
    pub dlq: DeadLetterManager,
    pub config: ConfigManager,
    pub json: bool,
}

impl Context {
    async fn open(base: QueueSettings, json: bool) -> anyhow::Result<Self> {
        let store = FileDocumentStore::new(base.store_path.clone())
            .await
            .with_context(|| format!("Failed to open store at {}", base.store_path.display()))?;
        let shared = Arc::new(SharedDocument::new(Arc::new(store)));

        let config = ConfigManager::new(shared.clone(), base);
        let settings = config.effective().await?;
        for warning in ConfigValidator::validate(&settings).into_result()? {
            warn!("Config {}: {}", warning.path, warning.message);
        }

        Ok(Self {
            jobs: Arc::new(JobManager::new(shared.clone(), settings.max_retries)),
            dlq: DeadLetterManager::new(shared),
            config,
            settings,
            json,
        })
    }
}

/// Logs live next to the store.
fn log_dir(store_path: &Path) -> PathBuf {
    store_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("logs")
}

/// Initialize tracing with console and daily-rotated file output.
fn init_tracing(log_dir: &Path, default_level: &str) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("queuectl")
        .filename_suffix("log")
        .max_log_files(14)
        .build(log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the background writer.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        // Console on stderr so `--json` output stays clean.
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let base = ConfigLoader::resolve(Some(&cli.config), &EnvOverrides::from_env())
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    // Only the worker process is chatty by default.
    let default_level = match &cli.command {
        Commands::Worker {
            action: WorkerAction::Start { .. },
        } => "info",
        _ => "warn",
    };
    init_tracing(&log_dir(&base.store_path), default_level)?;

    let ctx = Context::open(base, cli.json).await?;

    match cli.command {
        Commands::Enqueue {
            job,
            id,
            max_retries,
        } => cmd_queue::enqueue(&ctx, &job, id, max_retries).await,
        Commands::Worker { action } => match action {
            WorkerAction::Start { count } => cmd_worker::start(&ctx, count).await,
            WorkerAction::Stop { wait } => cmd_worker::stop(&ctx, wait).await,
        },
        Commands::Status => cmd_queue::status(&ctx).await,
        Commands::List { state } => cmd_queue::list(&ctx, state).await,
        Commands::Reset { id, processing } => cmd_queue::reset(&ctx, id, processing).await,
        Commands::ResetStale { timeout } => cmd_queue::reset_stale(&ctx, timeout).await,
        Commands::Clear => cmd_queue::clear(&ctx).await,
        Commands::Delete { id } => cmd_queue::delete(&ctx, &id).await,
        Commands::Dlq { action } => match action {
            DlqAction::List => cmd_queue::dlq_list(&ctx).await,
            DlqAction::Retry { id } => cmd_queue::dlq_retry(&ctx, &id).await,
        },
        Commands::Config { action } => match action {
            ConfigAction::Get { key } => cmd_queue::config_get(&ctx, key).await,
            ConfigAction::Set { key, value } => cmd_queue::config_set(&ctx, &key, &value).await,
        },
    }
}
