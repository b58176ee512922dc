//! FailureSupervisor - detection loop driving restart and fallback
//!
//! Watches the registry for agents that are degraded or have stopped
//! heartbeating, and invokes the host's restart strategy exactly once
//! per failure episode. An episode opens when an agent first turns
//! unhealthy and closes when it recovers; ticks during an open episode
//! do not re-fire the strategy. Every outcome lands in the audit ring
//! and the monotonic counters - callers of send/receive never see any
//! of it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use eyre::Result;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::AgentId;
use crate::peers::WorkflowMonitor;
use crate::registry::AgentRegistry;
use crate::tasks::PeriodicTask;

use super::audit::{AuditEvent, AuditKind, AuditLog, DEFAULT_AUDIT_CAPACITY};
use super::strategies::{FallbackStrategy, RestartStrategy};

/// Supervisor tunables
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Failure-detection loop interval
    pub detection_interval_ms: u64,

    /// Consecutive unhealthy detections before an episode opens.
    /// 1 reacts to the first failure; higher values damp flapping.
    pub failure_threshold: u32,

    /// Audit ring capacity
    pub audit_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            detection_interval_ms: 15_000,
            failure_threshold: 1,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

/// What one detection pass did
#[derive(Debug, Default, Clone)]
pub struct DetectionReport {
    pub examined: usize,
    pub restarts: usize,
    pub fallbacks: usize,
    pub unresolved: usize,
}

#[derive(Default)]
struct Episodes {
    /// Consecutive unhealthy detections per agent (below threshold)
    strikes: HashMap<String, u32>,
    /// Agents with an open failure episode (strategy already fired)
    open: HashSet<String>,
}

/// State shared between the handle and the detection loop
struct SupervisorInner {
    registry: Arc<AgentRegistry>,
    restart: Arc<dyn RestartStrategy>,
    fallback: Arc<dyn FallbackStrategy>,
    workflow_monitor: RwLock<Option<Arc<dyn WorkflowMonitor>>>,
    config: SupervisorConfig,
    audit: AuditLog,
    restarts_total: AtomicU64,
    fallbacks_total: AtomicU64,
    episodes: Mutex<Episodes>,
}

/// Periodic failure detection with host-supplied remediation
pub struct FailureSupervisor {
    inner: Arc<SupervisorInner>,
    task: PeriodicTask,
}

impl FailureSupervisor {
    pub fn new(
        registry: Arc<AgentRegistry>,
        restart: Arc<dyn RestartStrategy>,
        fallback: Arc<dyn FallbackStrategy>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                registry,
                restart,
                fallback,
                workflow_monitor: RwLock::new(None),
                audit: AuditLog::new(config.audit_capacity),
                config,
                restarts_total: AtomicU64::new(0),
                fallbacks_total: AtomicU64::new(0),
                episodes: Mutex::new(Episodes::default()),
            }),
            task: PeriodicTask::new("failure-detection"),
        }
    }

    /// Drive a workflow-monitor peer's timeout sweep from our tick
    pub fn with_workflow_monitor(self, monitor: Arc<dyn WorkflowMonitor>) -> Self {
        if let Ok(mut slot) = self.inner.workflow_monitor.write() {
            *slot = Some(monitor);
        }
        self
    }

    /// Restart strategy invocations so far
    pub fn restarts_total(&self) -> u64 {
        self.inner.restarts_total.load(Ordering::Relaxed)
    }

    /// Fallback strategy invocations so far
    pub fn fallbacks_total(&self) -> u64 {
        self.inner.fallbacks_total.load(Ordering::Relaxed)
    }

    /// Most recent audit events, oldest first
    pub fn audit_recent(&self, n: usize) -> Vec<AuditEvent> {
        self.inner.audit.recent(n)
    }

    /// One failure-detection pass over all registered agents
    pub async fn run_detection_once(&self) -> Result<DetectionReport> {
        self.inner.run_detection_once().await
    }

    /// Start the detection loop; false if already running
    pub async fn start(&self, interval: Duration) -> bool {
        let inner = self.inner.clone();
        self.task
            .start(interval, move || {
                let inner = inner.clone();
                async move {
                    if let Err(e) = inner.run_detection_once().await {
                        warn!(error = %e, "failure detection pass failed");
                    }
                }
            })
            .await
    }

    /// Stop the detection loop and await its exit
    pub async fn stop(&self) -> bool {
        self.task.stop().await
    }

    pub async fn is_running(&self) -> bool {
        self.task.is_running().await
    }
}

impl SupervisorInner {
    async fn run_detection_once(&self) -> Result<DetectionReport> {
        let monitor = self
            .workflow_monitor
            .read()
            .ok()
            .and_then(|slot| slot.clone());
        if let Some(monitor) = monitor {
            let flagged = monitor.check_timeouts_once().await;
            if flagged > 0 {
                debug!(flagged, "workflow monitor flagged timed-out runs");
            }
        }

        // Expired liveness records are this loop's responsibility too
        let _ = self.registry.purge_expired_liveness().await?;

        let snapshot = self.registry.snapshot().await?;
        let mut report = DetectionReport::default();

        for view in snapshot.agents {
            report.examined += 1;
            let key = view.agent_id.key();
            let unhealthy = !view.alive || view.degraded;

            {
                let mut episodes = self.episodes.lock().await;
                if !unhealthy {
                    if episodes.open.remove(&key) {
                        info!(agent = %key, "failure episode closed, agent recovered");
                        self.audit.record(&key, AuditKind::Recovered);
                    }
                    episodes.strikes.remove(&key);
                    continue;
                }

                if episodes.open.contains(&key) {
                    // Strategy already fired this episode
                    report.unresolved += 1;
                    continue;
                }

                let strikes = episodes.strikes.entry(key.clone()).or_insert(0);
                *strikes += 1;
                if *strikes < self.config.failure_threshold {
                    debug!(agent = %key, strikes = *strikes, "unhealthy, below failure threshold");
                    report.unresolved += 1;
                    continue;
                }
                episodes.open.insert(key.clone());
            }

            self.remediate(&view.agent_id, &key, &mut report).await?;
        }

        Ok(report)
    }

    /// Restart, then fall back if the restart fails
    async fn remediate(&self, agent_id: &AgentId, key: &str, report: &mut DetectionReport) -> Result<()> {
        info!(agent = %key, "failure episode opened, invoking restart strategy");
        self.audit.record(key, AuditKind::RestartAttempted);
        self.restarts_total.fetch_add(1, Ordering::Relaxed);

        if self.restart.restart(agent_id).await {
            self.audit.record(key, AuditKind::RestartSucceeded);
            self.registry.mark_restarted(agent_id).await?;
            let mut episodes = self.episodes.lock().await;
            episodes.open.remove(key);
            episodes.strikes.remove(key);
            report.restarts += 1;
            info!(agent = %key, "restart succeeded");
            return Ok(());
        }

        self.audit.record(key, AuditKind::RestartFailed);
        warn!(agent = %key, "restart failed, looking for fallback");

        let backup = self
            .registry
            .discover(agent_id.kind)
            .await?
            .into_iter()
            .find(|candidate| candidate != agent_id);

        match backup {
            None => {
                // No healthy backup: agent stays degraded, operators
                // see it via audit and counters only
                self.audit.record(key, AuditKind::FallbackUnavailable);
                report.unresolved += 1;
                warn!(agent = %key, "no healthy backup available");
            }
            Some(backup) => {
                self.fallbacks_total.fetch_add(1, Ordering::Relaxed);
                if self.fallback.fallback(agent_id, Some(&backup)).await {
                    self.audit.record(key, AuditKind::FallbackSucceeded);
                    report.fallbacks += 1;
                    info!(agent = %key, backup = %backup, "fallback succeeded");
                } else {
                    self.audit.record(key, AuditKind::FallbackFailed);
                    report.unresolved += 1;
                    warn!(agent = %key, backup = %backup, "fallback failed");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::agent::mock::MockAgent;
    use crate::domain::AgentKind;
    use crate::registry::RegistryConfig;
    use crate::store::StoreManager;

    struct ScriptedRestart {
        succeed: std::sync::atomic::AtomicBool,
        calls: AtomicU64,
    }

    impl ScriptedRestart {
        fn new(succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                succeed: std::sync::atomic::AtomicBool::new(succeed),
                calls: AtomicU64::new(0),
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RestartStrategy for ScriptedRestart {
        async fn restart(&self, _agent: &AgentId) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.succeed.load(Ordering::SeqCst)
        }
    }

    struct RecordingFallback {
        calls: AtomicU64,
        last_backup: Mutex<Option<AgentId>>,
    }

    impl RecordingFallback {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
                last_backup: Mutex::new(None),
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FallbackStrategy for RecordingFallback {
        async fn fallback(&self, _unhealthy: &AgentId, backup: Option<&AgentId>) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_backup.lock().await = backup.cloned();
            backup.is_some()
        }
    }

    fn registry() -> Arc<AgentRegistry> {
        let store = StoreManager::spawn_in_memory().unwrap();
        Arc::new(AgentRegistry::new(store, RegistryConfig::default()))
    }

    async fn degrade(registry: &Arc<AgentRegistry>, agent: &Arc<MockAgent>) {
        agent.set_healthy(false);
        registry.run_health_checks_once().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_fires_once_per_episode() {
        let registry = registry();
        let agent = Arc::new(MockAgent::new(AgentKind::Worker, "w1"));
        registry.register(agent.clone()).await.unwrap();

        let restart = ScriptedRestart::new(false);
        let fallback = RecordingFallback::new();
        let supervisor = FailureSupervisor::new(
            registry.clone(),
            restart.clone(),
            fallback.clone(),
            SupervisorConfig::default(),
        );

        degrade(&registry, &agent).await;

        // Three ticks while degraded: the strategy fires exactly once
        supervisor.run_detection_once().await.unwrap();
        supervisor.run_detection_once().await.unwrap();
        supervisor.run_detection_once().await.unwrap();

        assert_eq!(restart.calls(), 1);
        assert_eq!(supervisor.restarts_total(), 1);
    }

    #[tokio::test]
    async fn test_successful_restart_clears_degraded() {
        let registry = registry();
        let agent = Arc::new(MockAgent::new(AgentKind::Worker, "w1"));
        registry.register(agent.clone()).await.unwrap();

        let restart = ScriptedRestart::new(true);
        let fallback = RecordingFallback::new();
        let supervisor = FailureSupervisor::new(
            registry.clone(),
            restart.clone(),
            fallback.clone(),
            SupervisorConfig::default(),
        );

        degrade(&registry, &agent).await;
        let report = supervisor.run_detection_once().await.unwrap();

        assert_eq!(report.restarts, 1);
        assert!(!agent.is_degraded());
        assert_eq!(registry.discover(AgentKind::Worker).await.unwrap().len(), 1);
        assert_eq!(fallback.calls(), 0);

        let kinds: Vec<AuditKind> = supervisor.audit_recent(10).into_iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![AuditKind::RestartAttempted, AuditKind::RestartSucceeded]);
    }

    #[tokio::test]
    async fn test_failed_restart_falls_back_to_healthy_backup() {
        let registry = registry();
        let primary = Arc::new(MockAgent::new(AgentKind::Worker, "primary"));
        let backup = Arc::new(MockAgent::new(AgentKind::Worker, "backup"));
        registry.register(primary.clone()).await.unwrap();
        registry.register(backup.clone()).await.unwrap();

        let restart = ScriptedRestart::new(false);
        let fallback = RecordingFallback::new();
        let supervisor = FailureSupervisor::new(
            registry.clone(),
            restart.clone(),
            fallback.clone(),
            SupervisorConfig::default(),
        );

        degrade(&registry, &primary).await;
        // Health pass also probed the backup and found it healthy
        assert!(!backup.is_degraded());

        let report = supervisor.run_detection_once().await.unwrap();
        assert_eq!(report.fallbacks, 1);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(supervisor.fallbacks_total(), 1);

        // The chosen backup was the healthy same-kind instance
        let chosen = fallback.last_backup.lock().await.clone().unwrap();
        assert_eq!(chosen, AgentId::new(AgentKind::Worker, "backup"));

        // Primary stays degraded; backup does not
        assert!(primary.is_degraded());
        assert!(!backup.is_degraded());
        assert_eq!(
            registry.discover(AgentKind::Worker).await.unwrap(),
            vec![AgentId::new(AgentKind::Worker, "backup")]
        );
    }

    #[tokio::test]
    async fn test_fallback_unavailable_leaves_agent_degraded() {
        let registry = registry();
        let agent = Arc::new(MockAgent::new(AgentKind::Worker, "only"));
        registry.register(agent.clone()).await.unwrap();

        let restart = ScriptedRestart::new(false);
        let fallback = RecordingFallback::new();
        let supervisor = FailureSupervisor::new(
            registry.clone(),
            restart.clone(),
            fallback.clone(),
            SupervisorConfig::default(),
        );

        degrade(&registry, &agent).await;
        let report = supervisor.run_detection_once().await.unwrap();

        assert_eq!(report.unresolved, 1);
        // No backup existed, so the fallback strategy never ran
        assert_eq!(fallback.calls(), 0);
        assert_eq!(supervisor.fallbacks_total(), 0);
        assert!(agent.is_degraded());

        let kinds: Vec<AuditKind> = supervisor.audit_recent(10).into_iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&AuditKind::FallbackUnavailable));
    }

    #[tokio::test]
    async fn test_recovery_closes_episode_and_rearms() {
        let registry = registry();
        let agent = Arc::new(MockAgent::new(AgentKind::Worker, "w1"));
        registry.register(agent.clone()).await.unwrap();

        let restart = ScriptedRestart::new(false);
        let supervisor = FailureSupervisor::new(
            registry.clone(),
            restart.clone(),
            RecordingFallback::new(),
            SupervisorConfig::default(),
        );

        degrade(&registry, &agent).await;
        supervisor.run_detection_once().await.unwrap();
        assert_eq!(restart.calls(), 1);

        // Agent comes back; the episode closes
        agent.set_healthy(true);
        registry.run_health_checks_once().await.unwrap();
        supervisor.run_detection_once().await.unwrap();

        let kinds: Vec<AuditKind> = supervisor.audit_recent(10).into_iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&AuditKind::Recovered));

        // A fresh failure opens a new episode and fires again
        degrade(&registry, &agent).await;
        supervisor.run_detection_once().await.unwrap();
        assert_eq!(restart.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_threshold_damps_flapping() {
        let registry = registry();
        let agent = Arc::new(MockAgent::new(AgentKind::Worker, "w1"));
        registry.register(agent.clone()).await.unwrap();

        let restart = ScriptedRestart::new(true);
        let supervisor = FailureSupervisor::new(
            registry.clone(),
            restart.clone(),
            RecordingFallback::new(),
            SupervisorConfig {
                failure_threshold: 3,
                ..Default::default()
            },
        );

        degrade(&registry, &agent).await;

        supervisor.run_detection_once().await.unwrap();
        supervisor.run_detection_once().await.unwrap();
        assert_eq!(restart.calls(), 0);

        // Third consecutive detection crosses the threshold
        supervisor.run_detection_once().await.unwrap();
        assert_eq!(restart.calls(), 1);
    }

    #[tokio::test]
    async fn test_missed_heartbeats_trigger_episode() {
        let store = StoreManager::spawn_in_memory().unwrap();
        let registry = Arc::new(AgentRegistry::new(
            store,
            RegistryConfig {
                heartbeat_ttl_ms: 20,
                ..Default::default()
            },
        ));
        let agent = Arc::new(MockAgent::new(AgentKind::Worker, "w1"));
        registry.register(agent.clone()).await.unwrap();

        let restart = ScriptedRestart::new(true);
        let supervisor = FailureSupervisor::new(
            registry.clone(),
            restart.clone(),
            RecordingFallback::new(),
            SupervisorConfig::default(),
        );

        // Healthy record still within TTL: nothing to do
        supervisor.run_detection_once().await.unwrap();
        assert_eq!(restart.calls(), 0);

        // TTL elapses with no heartbeat: crash detected, restart fires
        tokio::time::sleep(Duration::from_millis(40)).await;
        let report = supervisor.run_detection_once().await.unwrap();
        assert_eq!(restart.calls(), 1);
        assert_eq!(report.restarts, 1);
    }

    #[tokio::test]
    async fn test_detection_loop_start_stop_idempotent() {
        let supervisor = FailureSupervisor::new(
            registry(),
            ScriptedRestart::new(true),
            RecordingFallback::new(),
            SupervisorConfig::default(),
        );

        assert!(supervisor.start(Duration::from_secs(3600)).await);
        assert!(!supervisor.start(Duration::from_secs(3600)).await);
        assert!(supervisor.is_running().await);

        assert!(supervisor.stop().await);
        assert!(!supervisor.stop().await);
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn test_workflow_monitor_swept_on_tick() {
        struct CountingMonitor {
            sweeps: AtomicU64,
        }

        #[async_trait]
        impl WorkflowMonitor for CountingMonitor {
            async fn check_timeouts_once(&self) -> usize {
                self.sweeps.fetch_add(1, Ordering::SeqCst);
                0
            }
            async fn metrics_snapshot(&self) -> serde_json::Value {
                serde_json::json!({})
            }
        }

        let monitor = Arc::new(CountingMonitor {
            sweeps: AtomicU64::new(0),
        });
        let supervisor = FailureSupervisor::new(
            registry(),
            ScriptedRestart::new(true),
            RecordingFallback::new(),
            SupervisorConfig::default(),
        )
        .with_workflow_monitor(monitor.clone());

        supervisor.run_detection_once().await.unwrap();
        supervisor.run_detection_once().await.unwrap();
        assert_eq!(monitor.sweeps.load(Ordering::SeqCst), 2);
    }
}
