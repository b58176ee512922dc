//! AgentBus CLI entry point

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use agentbus::cli::{Cli, Command};
use agentbus::config::Config;
use agentbus::coordinator::{MessageCoordinator, RecoveryScanner};
use agentbus::domain::AgentId;
use agentbus::metrics::MetricsCollector;
use agentbus::store::StoreManager;

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn parse_agent(agent: Option<String>) -> Result<Option<AgentId>> {
    agent
        .map(|s| AgentId::from_str(&s).map_err(|e| eyre::eyre!(e)))
        .transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = Config::load(cli.config.as_ref())?;
    config.validate()?;

    let store = StoreManager::spawn(&config.storage.db_path)
        .context("Failed to open the shared store")?;
    let metrics = Arc::new(MetricsCollector::new());
    let coordinator = Arc::new(MessageCoordinator::new(
        store.clone(),
        (&config.coordinator).into(),
        metrics,
    ));

    match cli.command {
        Command::Status => {
            let now = msgstore::now_ms();
            let alive = store.list_alive(None, now).await?;
            println!("{}", "agents".bold());
            if alive.is_empty() {
                println!("  {}", "none alive".dimmed());
            }
            for row in alive {
                let health = if row.degraded {
                    "degraded".yellow().to_string()
                } else {
                    "healthy".green().to_string()
                };
                println!("  {:<30} {}", row.agent_key.cyan(), health);
            }

            println!("{}", "queues".bold());
            let depths = store.queue_depths().await?;
            if depths.is_empty() {
                println!("  {}", "empty".dimmed());
            }
            for depth in depths {
                println!("  {:<30} prio {} {:>6}", depth.agent_key.cyan(), depth.priority, depth.depth);
            }

            let reservations = store.reservation_count(None).await?;
            let dead = store.dlq_len(None).await?;
            println!("{} in flight, {} dead-lettered", reservations, dead);
        }

        Command::Queues { agent } => {
            let agent = parse_agent(agent)?;
            match agent {
                Some(id) => {
                    for (priority, depth) in store.queue_depths_for(&id.key()).await? {
                        println!("{:<30} prio {} {:>6}", id.key().cyan(), priority, depth);
                    }
                }
                None => {
                    for depth in store.queue_depths().await? {
                        println!("{:<30} prio {} {:>6}", depth.agent_key.cyan(), depth.priority, depth.depth);
                    }
                }
            }
        }

        Command::Dlq { agent, limit } => {
            let agent = parse_agent(agent)?;
            let entries = store.list_dlq(agent.map(|id| id.key()), limit).await?;
            if entries.is_empty() {
                println!("{}", "dead-letter queue is empty".dimmed());
            }
            for entry in entries {
                let failed_at = chrono::DateTime::from_timestamp_millis(entry.failed_at)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| entry.failed_at.to_string());
                println!(
                    "{:<36} {:<30} {} {}",
                    entry.message_id,
                    entry.agent_key.cyan(),
                    failed_at.dimmed(),
                    entry.error.red()
                );
            }
        }

        Command::Metrics => {
            let snapshot = coordinator.metrics_snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }

        Command::Recover { agent } => {
            let agent = parse_agent(agent)?;
            let reclaimed = coordinator.recover_pending(agent.as_ref()).await?;
            println!("reclaimed {} expired lease(s)", reclaimed);
        }

        Command::Serve => {
            let scanner = RecoveryScanner::new(coordinator.clone());
            scanner
                .start(Duration::from_millis(config.coordinator.recovery_interval_ms))
                .await;
            info!(
                db = %config.storage.db_path.display(),
                interval_ms = config.coordinator.recovery_interval_ms,
                "recovery scanner running, ctrl-c to stop"
            );

            tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
            info!("shutting down");
            scanner.stop().await;
            store.shutdown().await.ok();
        }
    }

    Ok(())
}
