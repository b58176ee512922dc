//! Recovery scanner - background sweep for expired leases
//!
//! Consumers that crash or outlive their visibility timeout leave
//! reservations behind; this task periodically reclaims them so the
//! messages become deliverable again.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::tasks::PeriodicTask;

use super::core::MessageCoordinator;

/// Owned background task wrapping `recover_pending`
pub struct RecoveryScanner {
    coordinator: Arc<MessageCoordinator>,
    task: PeriodicTask,
}

impl RecoveryScanner {
    pub fn new(coordinator: Arc<MessageCoordinator>) -> Self {
        Self {
            coordinator,
            task: PeriodicTask::new("recovery-scanner"),
        }
    }

    /// Start sweeping on the given interval; false if already running
    pub async fn start(&self, interval: Duration) -> bool {
        let coordinator = self.coordinator.clone();
        self.task
            .start(interval, move || {
                let coordinator = coordinator.clone();
                async move {
                    match coordinator.recover_pending(None).await {
                        Ok(0) => {}
                        Ok(count) => info!(count, "recovery sweep requeued expired leases"),
                        Err(e) => warn!(error = %e, "recovery sweep failed"),
                    }
                }
            })
            .await
    }

    /// Stop the sweep and wait for the task to exit
    pub async fn stop(&self) -> bool {
        self.task.stop().await
    }

    pub async fn is_running(&self) -> bool {
        self.task.is_running().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use crate::domain::{AgentId, AgentKind, AgentMessage, MessageType};
    use crate::metrics::MetricsCollector;
    use crate::store::StoreManager;

    fn coordinator() -> Arc<MessageCoordinator> {
        let store = StoreManager::spawn_in_memory().unwrap();
        Arc::new(MessageCoordinator::new(
            store,
            CoordinatorConfig::default(),
            Arc::new(MetricsCollector::new()),
        ))
    }

    #[tokio::test]
    async fn test_scanner_start_is_idempotent() {
        let scanner = RecoveryScanner::new(coordinator());

        assert!(scanner.start(Duration::from_secs(3600)).await);
        assert!(!scanner.start(Duration::from_secs(3600)).await);
        assert!(scanner.is_running().await);

        assert!(scanner.stop().await);
        assert!(!scanner.stop().await);
        assert!(!scanner.is_running().await);
    }

    #[tokio::test]
    async fn test_scanner_reclaims_expired_lease() {
        let coordinator = coordinator();
        let worker = AgentId::of(AgentKind::Worker);

        coordinator
            .send(AgentMessage::new(
                AgentId::of(AgentKind::Planner),
                worker.clone(),
                MessageType::Request,
                serde_json::Value::Null,
            ))
            .await;

        // Lease with an already-expired deadline
        let envelope = coordinator
            .receive(&worker, Some(Duration::from_millis(0)))
            .await
            .unwrap()
            .unwrap();

        let scanner = RecoveryScanner::new(coordinator.clone());
        scanner.start(Duration::from_millis(10)).await;

        tokio::time::sleep(Duration::from_millis(60)).await;
        scanner.stop().await;

        let redelivered = coordinator.receive(&worker, None).await.unwrap().unwrap();
        assert_eq!(redelivered.message.id, envelope.message.id);
    }
}
