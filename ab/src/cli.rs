//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// AgentBus - agent message coordination and lifecycle supervision
#[derive(Parser)]
#[command(
    name = "ab",
    about = "Coordinate messages and supervise agents over a shared store",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Show live agents and queue depths
    Status,

    /// Show ready-queue depths by agent and priority
    Queues {
        /// Restrict to one agent (kind or kind:instance)
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// List dead-lettered messages, newest first
    Dlq {
        /// Restrict to one agent
        #[arg(short, long)]
        agent: Option<String>,

        /// Maximum entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print the metrics snapshot as JSON
    Metrics,

    /// Reclaim expired reservation leases once
    Recover {
        /// Restrict to one agent
        #[arg(short, long)]
        agent: Option<String>,
    },

    /// Run the recovery scanner until interrupted
    ///
    /// Registry and supervision loops run inside hosting services that
    /// embed this crate; serve only drives the store-side sweeps.
    Serve,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_status() {
        let cli = Cli::try_parse_from(["ab", "status"]).unwrap();
        assert!(matches!(cli.command, Command::Status));
    }

    #[test]
    fn test_cli_parses_recover_with_agent() {
        let cli = Cli::try_parse_from(["ab", "recover", "--agent", "worker:w1"]).unwrap();
        match cli.command {
            Command::Recover { agent } => assert_eq!(agent.as_deref(), Some("worker:w1")),
            _ => panic!("Wrong command"),
        }
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli = Cli::try_parse_from(["ab", "--config", "/tmp/ab.yml", "metrics"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/ab.yml")));
    }
}
