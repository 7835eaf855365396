//! CLI definitions for queuectl.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use queuectl_workqueue::JobState;

/// queuectl CLI.
#[derive(Parser)]
#[command(name = "queuectl")]
#[command(about = "Background job queue for shell commands")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "queuectl.toml", global = true)]
    pub config: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Add a job. Accepts a JSON object or a plain shell command
    Enqueue {
        /// `{"command": "...", "id": "...", "max_retries": N}` or a command
        job: String,

        /// Explicit job ID
        #[arg(long)]
        id: Option<String>,

        /// Retry budget for this job
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Worker pool management
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Show job counts by state
    Status,

    /// List jobs
    List {
        /// Only jobs in this state (pending, processing, completed, failed, dead)
        #[arg(long)]
        state: Option<JobState>,
    },

    /// Return jobs to pending
    Reset {
        /// Job to reset regardless of its attempts
        id: Option<String>,

        /// Reset every processing job
        #[arg(long, conflicts_with = "id")]
        processing: bool,
    },

    /// Unlock jobs whose lease has expired
    ResetStale {
        /// Lease age in seconds (defaults to leaseTimeoutSeconds)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Remove every job and dead letter entry
    Clear,

    /// Remove one job
    Delete {
        /// Job ID
        id: String,
    },

    /// Dead letter queue commands
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },

    /// Persisted configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum WorkerAction {
    /// Run workers in the foreground until SIGINT or SIGTERM
    Start {
        /// Number of workers (defaults to workerCount)
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },

    /// Ask a running `worker start` to shut down
    Stop {
        /// Seconds to wait for in-flight jobs
        #[arg(long, default_value_t = 60)]
        wait: u64,
    },
}

#[derive(Subcommand)]
pub(crate) enum DlqAction {
    /// List dead letter entries
    List,

    /// Move a dead letter job back to pending with a fresh budget
    Retry {
        /// Job ID
        id: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show the effective settings
    Get {
        /// Single key to show
        key: Option<String>,
    },

    /// Persist one setting
    Set {
        /// Setting name, e.g. maxRetries
        key: String,

        /// New value
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_list_state() {
        let cli = Cli::parse_from(["queuectl", "list", "--state", "dead"]);
        match cli.command {
            Commands::List { state } => assert_eq!(state, Some(JobState::Dead)),
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn test_parse_reset_conflict() {
        let result = Cli::try_parse_from(["queuectl", "reset", "abc", "--processing"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_json_flag() {
        let cli = Cli::parse_from(["queuectl", "status", "--json"]);
        assert!(cli.json);
        assert_eq!(cli.config, PathBuf::from("queuectl.toml"));
    }
}
