//! CLI command definitions for the `ms` inspection tool

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// MsgStore - inspect the shared coordination store
#[derive(Parser)]
#[command(
    name = "ms",
    about = "Inspect agent queues, reservations, dead letters, and liveness",
    version
)]
pub struct Cli {
    /// Path to the store database
    #[arg(short, long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Show ready-queue depths by agent and priority
    Queues {
        /// Restrict to one agent key (kind:instance)
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// List in-flight reservations
    Reservations {
        /// Restrict to one agent key
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// List dead-lettered messages, newest first
    Dlq {
        /// Restrict to one agent key
        #[arg(short, long)]
        agent: Option<String>,

        /// Maximum entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List agents with unexpired liveness records
    Alive {
        /// Restrict to one agent kind
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Delete liveness records whose TTL has elapsed
    PurgeExpired,
}

/// Default store location when --db is not given
pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agentbus")
        .join("bus.db")
}
