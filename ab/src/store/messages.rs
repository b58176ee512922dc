//! Store actor messages
//!
//! Commands and responses for the actor pattern.

use msgstore::{LivenessRow, QueueDepth, ReservedMessage};
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Store(String),

    #[error("store channel closed")]
    Closed,
}

/// Response from store operations
pub type StoreResponse<T> = Result<T, StoreError>;

/// Commands sent to the StoreManager actor
#[derive(Debug)]
pub enum StoreCommand {
    // Queue operations
    Enqueue {
        agent_key: String,
        message_id: String,
        priority: i64,
        available_at: i64,
        body: String,
        reply: oneshot::Sender<StoreResponse<()>>,
    },
    PopReady {
        agent_key: String,
        now: i64,
        visibility_timeout_ms: i64,
        reply: oneshot::Sender<StoreResponse<Option<ReservedMessage>>>,
    },
    GetReserved {
        token: String,
        now: i64,
        reply: oneshot::Sender<StoreResponse<Option<ReservedMessage>>>,
    },
    Ack {
        token: String,
        now: i64,
        reply: oneshot::Sender<StoreResponse<bool>>,
    },
    RequeueReserved {
        token: String,
        now: i64,
        body: String,
        available_at: i64,
        reply: oneshot::Sender<StoreResponse<bool>>,
    },
    DeadLetterReserved {
        token: String,
        now: i64,
        body: String,
        error: String,
        reply: oneshot::Sender<StoreResponse<bool>>,
    },
    ReclaimExpired {
        agent_key: Option<String>,
        now: i64,
        reply: oneshot::Sender<StoreResponse<Vec<String>>>,
    },

    // Gauges
    QueueDepths {
        reply: oneshot::Sender<StoreResponse<Vec<QueueDepth>>>,
    },
    QueueDepthsFor {
        agent_key: String,
        reply: oneshot::Sender<StoreResponse<Vec<(i64, u64)>>>,
    },
    DlqLen {
        agent_key: Option<String>,
        reply: oneshot::Sender<StoreResponse<u64>>,
    },
    DlqDepths {
        reply: oneshot::Sender<StoreResponse<Vec<(String, u64)>>>,
    },
    ListDlq {
        agent_key: Option<String>,
        limit: usize,
        reply: oneshot::Sender<StoreResponse<Vec<msgstore::DlqEntry>>>,
    },
    ReservationCount {
        agent_key: Option<String>,
        reply: oneshot::Sender<StoreResponse<u64>>,
    },

    // Liveness operations
    PutLiveness {
        agent_key: String,
        record: String,
        degraded: bool,
        expires_at: i64,
        reply: oneshot::Sender<StoreResponse<()>>,
    },
    GetLiveness {
        agent_key: String,
        now: i64,
        reply: oneshot::Sender<StoreResponse<Option<LivenessRow>>>,
    },
    ListAlive {
        kind: Option<String>,
        now: i64,
        reply: oneshot::Sender<StoreResponse<Vec<LivenessRow>>>,
    },
    SetDegraded {
        agent_key: String,
        degraded: bool,
        reply: oneshot::Sender<StoreResponse<bool>>,
    },
    RemoveLiveness {
        agent_key: String,
        reply: oneshot::Sender<StoreResponse<bool>>,
    },
    PurgeExpired {
        now: i64,
        reply: oneshot::Sender<StoreResponse<usize>>,
    },

    // Shutdown
    Shutdown,
}
