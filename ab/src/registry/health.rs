//! Health checking for registered agents
//!
//! Each probe calls the agent's own health_check under a bounded
//! timeout, so a wedged agent cannot stall the loop. The result flips
//! the degraded flag both on the agent handle and in the store record
//! (without touching the record's TTL - heartbeats alone keep an agent
//! alive).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use serde::Serialize;
use tracing::{debug, warn};

use crate::agent::{Agent, HealthReport};
use crate::store::StoreManager;

use super::core::{AgentMap, AgentRegistry};

/// Result of probing one agent
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheckOutcome {
    Healthy(HealthReport),
    Unhealthy(String),
    TimedOut,
}

impl HealthCheckOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy(_))
    }
}

impl AgentRegistry {
    /// Probe every registered agent once
    ///
    /// Marks each agent degraded or healthy from its probe result and
    /// returns the outcomes keyed by agent key.
    pub async fn run_health_checks_once(&self) -> Result<HashMap<String, HealthCheckOutcome>> {
        let timeout = Duration::from_millis(self.config().health_check_timeout_ms);
        health_pass(&self.agents_handle(), self.store(), timeout).await
    }

    /// Start the periodic health-check loop; false if already running
    ///
    /// Starting twice never duplicates the loop.
    pub async fn start_periodic_health_checks(&self, interval: Duration) -> bool {
        let agents = self.agents_handle();
        let store = self.store().clone();
        let timeout = Duration::from_millis(self.config().health_check_timeout_ms);

        self.health_task
            .start(interval, move || {
                let agents = agents.clone();
                let store = store.clone();
                async move {
                    if let Err(e) = health_pass(&agents, &store, timeout).await {
                        warn!(error = %e, "periodic health check pass failed");
                    }
                }
            })
            .await
    }

    /// Stop the health-check loop and await its exit
    pub async fn stop_periodic_health_checks(&self) -> bool {
        self.health_task.stop().await
    }

    pub async fn health_checks_running(&self) -> bool {
        self.health_task.is_running().await
    }
}

/// One probe pass over a snapshot of the agent map
async fn health_pass(
    agents: &AgentMap,
    store: &StoreManager,
    timeout: Duration,
) -> Result<HashMap<String, HealthCheckOutcome>> {
    let snapshot: Vec<(String, Arc<dyn Agent>)> = agents
        .read()
        .await
        .iter()
        .map(|(key, agent)| (key.clone(), agent.clone()))
        .collect();

    let mut outcomes = HashMap::new();
    for (key, agent) in snapshot {
        let outcome = match tokio::time::timeout(timeout, agent.health_check()).await {
            Err(_) => {
                warn!(agent = %key, timeout_ms = timeout.as_millis() as u64, "health check timed out");
                HealthCheckOutcome::TimedOut
            }
            Ok(Err(e)) => {
                warn!(agent = %key, error = %e, "health check failed");
                HealthCheckOutcome::Unhealthy(e.to_string())
            }
            Ok(Ok(report)) if !report.is_healthy() => {
                warn!(agent = %key, status = %report.status, "health check reported unhealthy status");
                HealthCheckOutcome::Unhealthy(format!("agent reported status {}", report.status))
            }
            Ok(Ok(report)) => {
                debug!(agent = %key, status = %report.status, "health check passed");
                HealthCheckOutcome::Healthy(report)
            }
        };

        let degraded = !outcome.is_healthy();
        agent.set_degraded(degraded);
        let _ = store.set_degraded(&key, degraded).await?;
        outcomes.insert(key, outcome);
    }
    Ok(outcomes)
}
