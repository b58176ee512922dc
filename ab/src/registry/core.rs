//! AgentRegistry - membership, liveness, and discovery
//!
//! The registry holds the hosted agent handles and owns the liveness
//! namespace in the shared store. Liveness itself is a TTL record: an
//! agent that stops heartbeating vanishes from discovery when its TTL
//! elapses, with no deregister call. Only the hosting orchestrator
//! registers and deregisters agents.

use std::collections::HashMap;
use std::sync::Arc;

use eyre::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::domain::{AgentId, AgentKind, AgentRuntimeRecord, AgentStatus, Heartbeat};
use crate::store::StoreManager;
use crate::tasks::PeriodicTask;

/// Registry tunables
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Liveness record TTL; a missed refresh past this means crashed
    pub heartbeat_ttl_ms: i64,

    /// Periodic health-check loop interval
    pub health_check_interval_ms: u64,

    /// Bound on one agent's health_check call
    pub health_check_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_ttl_ms: 15_000,
            health_check_interval_ms: 30_000,
            health_check_timeout_ms: 5_000,
        }
    }
}

/// One agent's view in a registry snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentView {
    #[serde(rename = "agent-id")]
    pub agent_id: AgentId,
    /// Liveness record exists and its TTL has not elapsed
    pub alive: bool,
    pub degraded: bool,
    pub status: AgentStatus,
    #[serde(rename = "last-heartbeat")]
    pub last_heartbeat: Option<i64>,
}

/// Per-agent status map for the diagnostics layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub agents: Vec<AgentView>,
}

/// Shared handle to the registered agent map
pub(super) type AgentMap = Arc<RwLock<HashMap<String, Arc<dyn Agent>>>>;

/// Membership and liveness for hosted agents
pub struct AgentRegistry {
    store: StoreManager,
    config: RegistryConfig,
    agents: AgentMap,
    pub(super) health_task: PeriodicTask,
}

impl AgentRegistry {
    pub fn new(store: StoreManager, config: RegistryConfig) -> Self {
        Self {
            store,
            config,
            agents: Arc::new(RwLock::new(HashMap::new())),
            health_task: PeriodicTask::new("health-checks"),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub(super) fn store(&self) -> &StoreManager {
        &self.store
    }

    pub(super) fn agents_handle(&self) -> AgentMap {
        self.agents.clone()
    }

    /// Register an agent, replacing any prior entry for the same id
    ///
    /// Idempotent: re-registering resets the liveness record and swaps
    /// the handle, never duplicates.
    pub async fn register(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let id = agent.agent_id();
        let key = id.key();
        let now = msgstore::now_ms();

        let record = AgentRuntimeRecord::new(id, now);
        let body = serde_json::to_string(&record)?;
        self.store
            .put_liveness(&key, &body, false, now + self.config.heartbeat_ttl_ms)
            .await?;

        let replaced = self.agents.write().await.insert(key.clone(), agent).is_some();
        info!(agent = %key, replaced, "registered agent");
        Ok(())
    }

    /// Remove an agent's membership and liveness immediately
    pub async fn deregister(&self, id: &AgentId) -> Result<bool> {
        let key = id.key();
        let removed = self.agents.write().await.remove(&key).is_some();
        let _ = self.store.remove_liveness(&key).await?;

        if removed {
            info!(agent = %key, "deregistered agent");
        }
        Ok(removed)
    }

    /// Look up a registered agent handle
    pub async fn get(&self, id: &AgentId) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.get(&id.key()).cloned()
    }

    /// Refresh an agent's liveness record and TTL
    ///
    /// This is the crash-detection path: agents call it periodically,
    /// and a missed refresh past the TTL removes them from discovery
    /// without any explicit deregister. Returns false for agents that
    /// were never registered here.
    pub async fn heartbeat(&self, id: &AgentId, beat: Heartbeat) -> Result<bool> {
        let key = id.key();
        if !self.agents.read().await.contains_key(&key) {
            debug!(agent = %key, "heartbeat: not registered");
            return Ok(false);
        }

        let now = msgstore::now_ms();
        // Preserve registration time and degraded flag across refreshes
        let (mut record, degraded) = match self.store.get_liveness(&key, now).await? {
            Some(row) => match serde_json::from_str::<AgentRuntimeRecord>(&row.record) {
                Ok(record) => (record, row.degraded),
                Err(e) => {
                    warn!(agent = %key, error = %e, "heartbeat: unreadable record, rebuilding");
                    (AgentRuntimeRecord::new(id.clone(), now), row.degraded)
                }
            },
            None => (AgentRuntimeRecord::new(id.clone(), now), false),
        };
        record.refresh(beat, now);
        record.degraded = degraded;

        let body = serde_json::to_string(&record)?;
        self.store
            .put_liveness(&key, &body, degraded, now + self.config.heartbeat_ttl_ms)
            .await?;
        Ok(true)
    }

    /// Running, non-degraded instances of a kind, for routing
    pub async fn discover(&self, kind: AgentKind) -> Result<Vec<AgentId>> {
        let rows = self
            .store
            .list_alive(Some(kind.to_string()), msgstore::now_ms())
            .await?;

        let mut found = Vec::new();
        for row in rows {
            if row.degraded {
                continue;
            }
            match serde_json::from_str::<AgentRuntimeRecord>(&row.record) {
                Ok(record) if record.running => found.push(record.agent_id),
                Ok(_) => {}
                Err(e) => warn!(agent = %row.agent_key, error = %e, "discover: skipping unreadable record"),
            }
        }
        Ok(found)
    }

    /// Per-agent status map over all registered agents
    pub async fn snapshot(&self) -> Result<RegistrySnapshot> {
        let keys: Vec<(String, AgentId)> = self
            .agents
            .read()
            .await
            .values()
            .map(|agent| {
                let id = agent.agent_id();
                (id.key(), id)
            })
            .collect();

        let now = msgstore::now_ms();
        let mut agents = Vec::with_capacity(keys.len());
        for (key, agent_id) in keys {
            let view = match self.store.get_liveness(&key, now).await? {
                Some(row) => {
                    let record = serde_json::from_str::<AgentRuntimeRecord>(&row.record).ok();
                    AgentView {
                        agent_id,
                        alive: true,
                        degraded: row.degraded,
                        status: record.as_ref().map(|r| r.status).unwrap_or_default(),
                        last_heartbeat: record.map(|r| r.last_heartbeat),
                    }
                }
                None => AgentView {
                    agent_id,
                    alive: false,
                    degraded: false,
                    status: AgentStatus::Stopped,
                    last_heartbeat: None,
                },
            };
            agents.push(view);
        }
        agents.sort_by(|a, b| a.agent_id.key().cmp(&b.agent_id.key()));
        Ok(RegistrySnapshot { agents })
    }

    /// Clear degraded state after a successful restart
    ///
    /// Writes a fresh liveness record so the restarted agent has a TTL
    /// grace period until its own heartbeats resume.
    pub async fn mark_restarted(&self, id: &AgentId) -> Result<bool> {
        let key = id.key();
        let Some(agent) = self.agents.read().await.get(&key).cloned() else {
            return Ok(false);
        };

        agent.set_degraded(false);
        let now = msgstore::now_ms();
        let record = AgentRuntimeRecord::new(id.clone(), now);
        let body = serde_json::to_string(&record)?;
        self.store
            .put_liveness(&key, &body, false, now + self.config.heartbeat_ttl_ms)
            .await?;

        info!(agent = %key, "agent restarted, degraded cleared");
        Ok(true)
    }

    /// Drop expired liveness records from the store
    pub async fn purge_expired_liveness(&self) -> Result<usize> {
        Ok(self.store.purge_expired(msgstore::now_ms()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::mock::MockAgent;

    fn registry() -> AgentRegistry {
        let store = StoreManager::spawn_in_memory().unwrap();
        AgentRegistry::new(store, RegistryConfig::default())
    }

    fn short_ttl_registry(ttl_ms: i64) -> AgentRegistry {
        let store = StoreManager::spawn_in_memory().unwrap();
        AgentRegistry::new(
            store,
            RegistryConfig {
                heartbeat_ttl_ms: ttl_ms,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_register_discover_deregister() {
        let registry = registry();
        let agent = Arc::new(MockAgent::new(AgentKind::Worker, "w1"));

        registry.register(agent).await.unwrap();
        let found = registry.discover(AgentKind::Worker).await.unwrap();
        assert_eq!(found, vec![AgentId::new(AgentKind::Worker, "w1")]);

        // Other kinds see nothing
        assert!(registry.discover(AgentKind::Planner).await.unwrap().is_empty());

        assert!(registry.deregister(&AgentId::new(AgentKind::Worker, "w1")).await.unwrap());
        assert!(registry.discover(AgentKind::Worker).await.unwrap().is_empty());
        // Second deregister is a no-op
        assert!(!registry.deregister(&AgentId::new(AgentKind::Worker, "w1")).await.unwrap());
    }

    #[tokio::test]
    async fn test_reregister_replaces_entry() {
        let registry = registry();
        registry
            .register(Arc::new(MockAgent::new(AgentKind::Worker, "w1")))
            .await
            .unwrap();
        registry
            .register(Arc::new(MockAgent::new(AgentKind::Worker, "w1")))
            .await
            .unwrap();

        let found = registry.discover(AgentKind::Worker).await.unwrap();
        assert_eq!(found.len(), 1);

        let snapshot = registry.snapshot().await.unwrap();
        assert_eq!(snapshot.agents.len(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_requires_registration() {
        let registry = registry();
        let unknown = AgentId::of(AgentKind::Monitor);
        assert!(!registry.heartbeat(&unknown, Heartbeat::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_heartbeat_ttl_expiry_removes_from_discovery() {
        let registry = short_ttl_registry(30);
        let agent = Arc::new(MockAgent::new(AgentKind::Worker, "w1"));
        registry.register(agent).await.unwrap();

        assert_eq!(registry.discover(AgentKind::Worker).await.unwrap().len(), 1);

        // No heartbeat within the TTL: the agent disappears on its own
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        assert!(registry.discover(AgentKind::Worker).await.unwrap().is_empty());

        let snapshot = registry.snapshot().await.unwrap();
        assert!(!snapshot.agents[0].alive);

        assert_eq!(registry.purge_expired_liveness().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_ttl_and_fields() {
        let registry = short_ttl_registry(80);
        let id = AgentId::new(AgentKind::Worker, "w1");
        registry
            .register(Arc::new(MockAgent::new(AgentKind::Worker, "w1")))
            .await
            .unwrap();

        for _ in 0..3 {
            tokio::time::sleep(std::time::Duration::from_millis(40)).await;
            assert!(
                registry
                    .heartbeat(
                        &id,
                        Heartbeat {
                            status: AgentStatus::Busy,
                            requests: 7,
                            errors: 1,
                        }
                    )
                    .await
                    .unwrap()
            );
        }

        // Still alive well past the original TTL thanks to refreshes
        let snapshot = registry.snapshot().await.unwrap();
        assert!(snapshot.agents[0].alive);
        assert_eq!(snapshot.agents[0].status, AgentStatus::Busy);
    }

    #[tokio::test]
    async fn test_stopped_heartbeat_excludes_from_discovery() {
        let registry = registry();
        let id = AgentId::new(AgentKind::Worker, "w1");
        registry
            .register(Arc::new(MockAgent::new(AgentKind::Worker, "w1")))
            .await
            .unwrap();

        registry
            .heartbeat(
                &id,
                Heartbeat {
                    status: AgentStatus::Stopped,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Alive but not running: excluded from routing
        assert!(registry.discover(AgentKind::Worker).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_restarted_clears_degraded() {
        let registry = registry();
        let id = AgentId::new(AgentKind::Worker, "w1");
        let agent = Arc::new(MockAgent::new(AgentKind::Worker, "w1"));
        registry.register(agent.clone()).await.unwrap();

        registry.store().set_degraded(&id.key(), true).await.unwrap();
        agent.set_degraded(true);
        assert!(registry.discover(AgentKind::Worker).await.unwrap().is_empty());

        assert!(registry.mark_restarted(&id).await.unwrap());
        assert!(!agent.is_degraded());
        assert_eq!(registry.discover(AgentKind::Worker).await.unwrap().len(), 1);
    }
}
