//! MsgStore CLI entry point

use clap::Parser;
use colored::Colorize;
use eyre::Result;

use msgstore::cli::{Cli, Command, default_db_path};
use msgstore::{Store, now_ms};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = cli.db.unwrap_or_else(default_db_path);
    let mut store = Store::open(&db)?;
    let now = now_ms();

    match cli.command {
        Command::Queues { agent } => {
            let depths = match agent {
                Some(key) => store
                    .queue_depths_for(&key)?
                    .into_iter()
                    .map(|(priority, depth)| (key.clone(), priority, depth))
                    .collect::<Vec<_>>(),
                None => store
                    .queue_depths()?
                    .into_iter()
                    .map(|d| (d.agent_key, d.priority, d.depth))
                    .collect(),
            };
            if depths.is_empty() {
                println!("{}", "no queued messages".dimmed());
            }
            for (key, priority, depth) in depths {
                println!("{:<30} prio {} {:>6}", key.cyan(), priority, depth);
            }
        }

        Command::Reservations { agent } => {
            let reservations = store.list_reservations(agent.as_deref())?;
            if reservations.is_empty() {
                println!("{}", "no in-flight reservations".dimmed());
            }
            for r in reservations {
                let state = if r.deadline <= now {
                    "expired".red().to_string()
                } else {
                    format!("{}ms left", r.deadline - now).green().to_string()
                };
                println!("{:<36} {:<30} {}", r.token, r.agent_key.cyan(), state);
            }
        }

        Command::Dlq { agent, limit } => {
            let entries = store.list_dlq(agent.as_deref(), limit)?;
            if entries.is_empty() {
                println!("{}", "dead-letter queue is empty".dimmed());
            }
            for e in entries {
                println!("{:<36} {:<30} {}", e.message_id, e.agent_key.cyan(), e.error.red());
            }
        }

        Command::Alive { kind } => {
            let rows = store.list_alive(kind.as_deref(), now)?;
            if rows.is_empty() {
                println!("{}", "no live agents".dimmed());
            }
            for row in rows {
                let health = if row.degraded {
                    "degraded".yellow().to_string()
                } else {
                    "healthy".green().to_string()
                };
                println!("{:<30} {} (ttl {}ms)", row.agent_key.cyan(), health, row.expires_at - now);
            }
        }

        Command::PurgeExpired => {
            let purged = store.purge_expired(now)?;
            println!("purged {} expired liveness record(s)", purged);
        }
    }

    Ok(())
}
