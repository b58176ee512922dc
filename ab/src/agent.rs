//! Agent trait - the contract hosted agent implementations fulfill

use async_trait::async_trait;
use eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{AgentId, AgentStatus};

/// What an agent reports from a health probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: AgentStatus,
    #[serde(rename = "uptime-secs")]
    pub uptime_secs: u64,
    pub requests: u64,
    pub errors: u64,
}

impl HealthReport {
    /// A probe result that counts as healthy for supervision purposes
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, AgentStatus::Idle | AgentStatus::Busy)
    }
}

/// A hosted agent instance
///
/// The bus never runs agent business logic; it holds these handles to
/// probe health, flip the degraded flag, and let the hosting service
/// dispatch work. Implementations must be cheap to probe - a slow
/// `health_check` is cut off by the registry's bounded timeout.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Identity of this instance
    fn agent_id(&self) -> AgentId;

    /// Bring the agent up
    async fn start(&self) -> Result<()>;

    /// Shut the agent down
    async fn stop(&self) -> Result<()>;

    /// Handle one unit of work
    async fn process(&self, payload: Value) -> Result<Value>;

    /// Probe current health
    async fn health_check(&self) -> Result<HealthReport>;

    /// Mark or clear the degraded flag on the instance itself
    fn set_degraded(&self, degraded: bool);
}

#[cfg(test)]
pub mod mock {
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::domain::AgentKind;

    /// Controllable agent for unit tests
    pub struct MockAgent {
        id: AgentId,
        healthy: AtomicBool,
        hanging: AtomicBool,
        degraded: AtomicBool,
        requests: AtomicU64,
        errors: AtomicU64,
        health_checks: AtomicU64,
    }

    impl MockAgent {
        pub fn new(kind: AgentKind, instance: &str) -> Self {
            Self {
                id: AgentId::new(kind, instance),
                healthy: AtomicBool::new(true),
                hanging: AtomicBool::new(false),
                degraded: AtomicBool::new(false),
                requests: AtomicU64::new(0),
                errors: AtomicU64::new(0),
                health_checks: AtomicU64::new(0),
            }
        }

        pub fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }

        /// Make health_check block forever (exercises the probe timeout)
        pub fn set_hanging(&self, hanging: bool) {
            self.hanging.store(hanging, Ordering::SeqCst);
        }

        pub fn is_degraded(&self) -> bool {
            self.degraded.load(Ordering::SeqCst)
        }

        pub fn health_check_count(&self) -> u64 {
            self.health_checks.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Agent for MockAgent {
        fn agent_id(&self) -> AgentId {
            self.id.clone()
        }

        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn process(&self, payload: Value) -> Result<Value> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Ok(payload)
        }

        async fn health_check(&self) -> Result<HealthReport> {
            self.health_checks.fetch_add(1, Ordering::SeqCst);
            if self.hanging.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if !self.healthy.load(Ordering::SeqCst) {
                eyre::bail!("mock agent unhealthy");
            }
            Ok(HealthReport {
                status: AgentStatus::Idle,
                uptime_secs: 1,
                requests: self.requests.load(Ordering::SeqCst),
                errors: self.errors.load(Ordering::SeqCst),
            })
        }

        fn set_degraded(&self, degraded: bool) {
            self.degraded.store(degraded, Ordering::SeqCst);
        }
    }
}
