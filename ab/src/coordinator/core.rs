//! MessageCoordinator - send/receive/ack/nack facade
//!
//! Composes the priority queues, reservation leases, retry policy, and
//! dead-lettering over the shared store. All cross-process correctness
//! lives in the store's transactions; the coordinator holds no mutable
//! state between calls beyond its metrics counters.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{AgentId, AgentMessage, Envelope, FailureKind};
use crate::metrics::{DlqGauge, MetricsCollector, MetricsSnapshot, QueueGauge};
use crate::peers::ResourceManager;
use crate::store::{StoreError, StoreManager};

use super::config::CoordinatorConfig;
use super::retry::{self, RetryDecision};

/// Errors surfaced by coordinator operations
///
/// Benign outcomes (empty queue, stale token, failed send) are values,
/// not errors. These variants cover the genuinely exceptional cases:
/// a backing-store failure on the hot path (retryable by contract) and
/// a stored body that no longer parses.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("backing store failure: {0}")]
    Store(#[from] StoreError),

    #[error("malformed message body: {0}")]
    Corrupt(String),
}

/// Outcome of a send: whether the message was queued
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// True when the message reached the recipient's queue.
    /// Queued, not processed - consumers ack separately.
    pub delivered: bool,
    pub message_id: String,
}

/// The message coordination facade
pub struct MessageCoordinator {
    store: StoreManager,
    config: CoordinatorConfig,
    metrics: Arc<MetricsCollector>,
    resources: Option<Arc<dyn ResourceManager>>,
}

impl MessageCoordinator {
    /// Create a coordinator over the shared store
    pub fn new(store: StoreManager, config: CoordinatorConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            store,
            config,
            metrics,
            resources: None,
        }
    }

    /// Attach a resource manager peer for scheduling annotations
    pub fn with_resource_manager(mut self, resources: Arc<dyn ResourceManager>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Enqueue a message for its recipient
    ///
    /// Never blocks on consumer availability. A store failure comes back
    /// as `delivered: false` rather than an error - senders treat the
    /// receipt as the single source of truth.
    pub async fn send(&self, message: AgentMessage) -> SendReceipt {
        let message_id = message.id.clone();
        let recipient = message.recipient.key();

        if let Some(resources) = &self.resources {
            if !resources.has_capacity(message.recipient.kind).await {
                // Annotation only: pressure is recorded, delivery proceeds
                self.metrics.record_resource_pressure();
                warn!(recipient = %recipient, "send: recipient kind reports no capacity");
            }
        }

        let body = match serde_json::to_string(&message) {
            Ok(body) => body,
            Err(e) => {
                warn!(%message_id, error = %e, "send: failed to serialize message");
                self.metrics.record_delivered_error();
                return SendReceipt {
                    delivered: false,
                    message_id,
                };
            }
        };

        let result = self
            .store
            .enqueue(
                &recipient,
                &message_id,
                message.priority.as_i64(),
                msgstore::now_ms(),
                &body,
            )
            .await;

        match result {
            Ok(()) => {
                debug!(%message_id, recipient = %recipient, priority = %message.priority, "send: queued");
                self.metrics.record_delivered_ok();
                SendReceipt {
                    delivered: true,
                    message_id,
                }
            }
            Err(e) => {
                warn!(%message_id, recipient = %recipient, error = %e, "send: store rejected enqueue");
                self.metrics.record_delivered_error();
                SendReceipt {
                    delivered: false,
                    message_id,
                }
            }
        }
    }

    /// Receive the highest-priority ready message under a lease
    ///
    /// Returns `None` when nothing is ready. The lease deadline is
    /// `now + visibility_timeout` (falling back to the configured
    /// default); the claim is atomic, so concurrent receivers for the
    /// same agent never share a message.
    pub async fn receive(
        &self,
        agent_id: &AgentId,
        visibility_timeout: Option<Duration>,
    ) -> Result<Option<Envelope>, CoordinatorError> {
        let timeout_ms = visibility_timeout
            .map(|d| d.as_millis() as i64)
            .unwrap_or(self.config.visibility_timeout_ms);

        let Some(reserved) = self
            .store
            .pop_ready(&agent_id.key(), msgstore::now_ms(), timeout_ms)
            .await?
        else {
            return Ok(None);
        };

        let message: AgentMessage =
            serde_json::from_str(&reserved.body).map_err(|e| CoordinatorError::Corrupt(e.to_string()))?;

        debug!(
            agent = %agent_id,
            message_id = %message.id,
            token = %reserved.token,
            deadline = reserved.deadline,
            "receive: leased message"
        );
        Ok(Some(Envelope {
            message,
            token: reserved.token,
        }))
    }

    /// Acknowledge successful processing; the message is gone for good
    ///
    /// Returns false for an unknown, expired, or already-settled token.
    pub async fn ack(&self, agent_id: &AgentId, token: &str) -> Result<bool, CoordinatorError> {
        let acked = self.store.ack(token, msgstore::now_ms()).await?;
        debug!(agent = %agent_id, %token, acked, "ack");
        Ok(acked)
    }

    /// Report failed processing
    ///
    /// Transient failures increment the attempt count and re-schedule
    /// with exponential backoff until `max_attempts`, then dead-letter.
    /// Permanent failures dead-letter immediately. Either way the
    /// transition is internal - callers only see whether their token
    /// was still live.
    pub async fn nack(
        &self,
        agent_id: &AgentId,
        token: &str,
        failure: FailureKind,
        error: &str,
    ) -> Result<bool, CoordinatorError> {
        let now = msgstore::now_ms();
        let Some(reserved) = self.store.get_reserved(token, now).await? else {
            debug!(agent = %agent_id, %token, "nack: token unknown or expired");
            return Ok(false);
        };

        let mut message: AgentMessage =
            serde_json::from_str(&reserved.body).map_err(|e| CoordinatorError::Corrupt(e.to_string()))?;

        let decision = match failure {
            FailureKind::Permanent => RetryDecision::DeadLetter,
            FailureKind::Transient => {
                message.attempt_count += 1;
                retry::decide(&self.config, message.attempt_count)
            }
        };
        let body = serde_json::to_string(&message).map_err(|e| CoordinatorError::Corrupt(e.to_string()))?;

        match decision {
            RetryDecision::DeadLetter => {
                let moved = self.store.dead_letter_reserved(token, now, &body, error).await?;
                if moved {
                    info!(
                        agent = %agent_id,
                        message_id = %message.id,
                        attempts = message.attempt_count,
                        %error,
                        "nack: message dead-lettered"
                    );
                    self.metrics.record_permanent_failure();
                }
                Ok(moved)
            }
            RetryDecision::Retry { delay_ms } => {
                let moved = self.store.requeue_reserved(token, now, &body, now + delay_ms).await?;
                if moved {
                    debug!(
                        agent = %agent_id,
                        message_id = %message.id,
                        attempts = message.attempt_count,
                        delay_ms,
                        "nack: retry scheduled"
                    );
                    self.metrics.record_retry(delay_ms);
                }
                Ok(moved)
            }
        }
    }

    /// Reclaim messages whose reservation lease has expired
    ///
    /// Safe to call repeatedly and concurrently: each expired lease is
    /// reclaimed exactly once, and race losers observe nothing.
    pub async fn recover_pending(&self, agent_id: Option<&AgentId>) -> Result<usize, CoordinatorError> {
        let key = agent_id.map(|id| id.key());
        let reclaimed = self.store.reclaim_expired(key, msgstore::now_ms()).await?;

        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "recover_pending: requeued expired leases");
            self.metrics.record_recovered(reclaimed.len() as u64);
        }
        Ok(reclaimed.len())
    }

    /// Counters plus live store gauges, safe to call concurrently with
    /// any other operation
    pub async fn metrics_snapshot(&self) -> Result<MetricsSnapshot, CoordinatorError> {
        let queues = self
            .store
            .queue_depths()
            .await?
            .into_iter()
            .map(|d| QueueGauge {
                agent_key: d.agent_key,
                priority: crate::domain::Priority::from_i64(d.priority),
                depth: d.depth,
            })
            .collect();

        let dlq = self
            .store
            .dlq_depths()
            .await?
            .into_iter()
            .map(|(agent_key, depth)| DlqGauge { agent_key, depth })
            .collect();

        let reservations = self.store.reservation_count(None).await?;

        Ok(MetricsSnapshot {
            counters: self.metrics.counters(),
            queues,
            dlq,
            reservations,
        })
    }
}
