//! StoreManager - actor that owns the shared msgstore database
//!
//! The SQLite connection is synchronous and single-owner, so one actor
//! task holds it and processes commands from a channel. Every command
//! runs one store transaction; serializing them here is what lets many
//! async callers in this process share the store safely, while the
//! store's own transactions cover other processes.

use std::path::Path;

use msgstore::{DlqEntry, LivenessRow, QueueDepth, ReservedMessage, Store};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::messages::{StoreCommand, StoreError, StoreResponse};

/// Handle to send commands to the StoreManager
#[derive(Clone)]
pub struct StoreManager {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreManager {
    /// Open the store at the given path and spawn the actor
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_path = %store_path.as_ref().display(), "spawn: called");
        let store = Store::open(store_path.as_ref())?;
        Ok(Self::spawn_with(store))
    }

    /// Spawn the actor over an in-memory store (tests, single process)
    pub fn spawn_in_memory() -> eyre::Result<Self> {
        let store = Store::open_in_memory()?;
        Ok(Self::spawn_with(store))
    }

    fn spawn_with(store: Store) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));
        info!("StoreManager spawned");
        Self { tx }
    }

    async fn send(&self, cmd: StoreCommand) -> Result<(), StoreError> {
        self.tx.send(cmd).await.map_err(|_| StoreError::Closed)
    }

    // === Queue operations ===

    /// Enqueue an opaque message body for an agent
    pub async fn enqueue(
        &self,
        agent_key: &str,
        message_id: &str,
        priority: i64,
        available_at: i64,
        body: &str,
    ) -> StoreResponse<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::Enqueue {
            agent_key: agent_key.to_string(),
            message_id: message_id.to_string(),
            priority,
            available_at,
            body: body.to_string(),
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Atomically claim and lease the best ready message for an agent
    pub async fn pop_ready(
        &self,
        agent_key: &str,
        now: i64,
        visibility_timeout_ms: i64,
    ) -> StoreResponse<Option<ReservedMessage>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::PopReady {
            agent_key: agent_key.to_string(),
            now,
            visibility_timeout_ms,
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Look up a live reservation without consuming it
    pub async fn get_reserved(&self, token: &str, now: i64) -> StoreResponse<Option<ReservedMessage>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::GetReserved {
            token: token.to_string(),
            now,
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Delete a live reservation and its message permanently
    pub async fn ack(&self, token: &str, now: i64) -> StoreResponse<bool> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::Ack {
            token: token.to_string(),
            now,
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Return a reserved message to the ready queue with a new body
    pub async fn requeue_reserved(&self, token: &str, now: i64, body: &str, available_at: i64) -> StoreResponse<bool> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::RequeueReserved {
            token: token.to_string(),
            now,
            body: body.to_string(),
            available_at,
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Move a reserved message to the dead-letter queue
    pub async fn dead_letter_reserved(&self, token: &str, now: i64, body: &str, error: &str) -> StoreResponse<bool> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::DeadLetterReserved {
            token: token.to_string(),
            now,
            body: body.to_string(),
            error: error.to_string(),
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Reclaim expired reservations, optionally for one agent
    pub async fn reclaim_expired(&self, agent_key: Option<String>, now: i64) -> StoreResponse<Vec<String>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::ReclaimExpired { agent_key, now, reply }).await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    // === Gauges ===

    /// Ready-queue depths grouped by agent and priority
    pub async fn queue_depths(&self) -> StoreResponse<Vec<QueueDepth>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::QueueDepths { reply }).await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Ready-queue depths for one agent, by priority
    pub async fn queue_depths_for(&self, agent_key: &str) -> StoreResponse<Vec<(i64, u64)>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::QueueDepthsFor {
            agent_key: agent_key.to_string(),
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Dead-letter queue length
    pub async fn dlq_len(&self, agent_key: Option<String>) -> StoreResponse<u64> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::DlqLen { agent_key, reply }).await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Dead-letter depths grouped by agent
    pub async fn dlq_depths(&self) -> StoreResponse<Vec<(String, u64)>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::DlqDepths { reply }).await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// List dead letters, newest first
    pub async fn list_dlq(&self, agent_key: Option<String>, limit: usize) -> StoreResponse<Vec<DlqEntry>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::ListDlq { agent_key, limit, reply }).await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Number of live reservations
    pub async fn reservation_count(&self, agent_key: Option<String>) -> StoreResponse<u64> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::ReservationCount { agent_key, reply }).await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    // === Liveness operations ===

    /// Write or refresh a liveness record with its TTL expiry
    pub async fn put_liveness(
        &self,
        agent_key: &str,
        record: &str,
        degraded: bool,
        expires_at: i64,
    ) -> StoreResponse<()> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::PutLiveness {
            agent_key: agent_key.to_string(),
            record: record.to_string(),
            degraded,
            expires_at,
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Read an unexpired liveness record
    pub async fn get_liveness(&self, agent_key: &str, now: i64) -> StoreResponse<Option<LivenessRow>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::GetLiveness {
            agent_key: agent_key.to_string(),
            now,
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// List unexpired liveness records, optionally for one kind
    pub async fn list_alive(&self, kind: Option<String>, now: i64) -> StoreResponse<Vec<LivenessRow>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::ListAlive { kind, now, reply }).await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Flip the degraded flag without extending the TTL
    pub async fn set_degraded(&self, agent_key: &str, degraded: bool) -> StoreResponse<bool> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::SetDegraded {
            agent_key: agent_key.to_string(),
            degraded,
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Remove a liveness record immediately
    pub async fn remove_liveness(&self, agent_key: &str) -> StoreResponse<bool> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::RemoveLiveness {
            agent_key: agent_key.to_string(),
            reply,
        })
        .await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Delete liveness records whose TTL has elapsed
    pub async fn purge_expired(&self, now: i64) -> StoreResponse<usize> {
        let (reply, reply_rx) = oneshot::channel();
        self.send(StoreCommand::PurgeExpired { now, reply }).await?;
        reply_rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Shut down the actor
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        self.send(StoreCommand::Shutdown).await
    }
}

/// The actor loop that owns the Store and processes commands
async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StoreCommand>) {
    debug!("StoreManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::Enqueue {
                agent_key,
                message_id,
                priority,
                available_at,
                body,
                reply,
            } => {
                let result = store
                    .enqueue(&agent_key, &message_id, priority, available_at, &body)
                    .map(|_| ())
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::PopReady {
                agent_key,
                now,
                visibility_timeout_ms,
                reply,
            } => {
                let result = store
                    .pop_ready(&agent_key, now, visibility_timeout_ms)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::GetReserved { token, now, reply } => {
                let result = store.get_reserved(&token, now).map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::Ack { token, now, reply } => {
                let result = store.ack(&token, now).map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::RequeueReserved {
                token,
                now,
                body,
                available_at,
                reply,
            } => {
                let result = store
                    .requeue_reserved(&token, now, &body, available_at)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::DeadLetterReserved {
                token,
                now,
                body,
                error,
                reply,
            } => {
                let result = store
                    .dead_letter_reserved(&token, now, &body, &error)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::ReclaimExpired { agent_key, now, reply } => {
                let result = store
                    .reclaim_expired(agent_key.as_deref(), now)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::QueueDepths { reply } => {
                let result = store.queue_depths().map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::QueueDepthsFor { agent_key, reply } => {
                let result = store
                    .queue_depths_for(&agent_key)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::DlqLen { agent_key, reply } => {
                let result = store
                    .dlq_len(agent_key.as_deref())
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::DlqDepths { reply } => {
                let result = store.dlq_depths().map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::ListDlq { agent_key, limit, reply } => {
                let result = store
                    .list_dlq(agent_key.as_deref(), limit)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::ReservationCount { agent_key, reply } => {
                let result = store
                    .reservation_count(agent_key.as_deref())
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::PutLiveness {
                agent_key,
                record,
                degraded,
                expires_at,
                reply,
            } => {
                let result = store
                    .put_liveness(&agent_key, &record, degraded, expires_at)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::GetLiveness { agent_key, now, reply } => {
                let result = store
                    .get_liveness(&agent_key, now)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::ListAlive { kind, now, reply } => {
                let result = store
                    .list_alive(kind.as_deref(), now)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::SetDegraded {
                agent_key,
                degraded,
                reply,
            } => {
                let result = store
                    .set_degraded(&agent_key, degraded)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::RemoveLiveness { agent_key, reply } => {
                let result = store
                    .remove_liveness(&agent_key)
                    .map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::PurgeExpired { now, reply } => {
                let result = store.purge_expired(now).map_err(|e| StoreError::Store(e.to_string()));
                let _ = reply.send(result);
            }

            StoreCommand::Shutdown => {
                info!("StoreManager shutting down");
                break;
            }
        }
    }

    debug!("StoreManager actor stopped");
}
