//! MsgStore - shared message-queue and liveness store backed by SQLite
//!
//! MsgStore is the single source of truth for agent coordination state:
//! per-agent priority queues, time-bounded reservations, dead letters,
//! and TTL-expiring liveness records. Every multi-step operation runs
//! inside one SQLite transaction; the transaction is the atomicity
//! boundary that makes the store safe to share between processes.
//!
//! Agents are addressed by key (`kind:instance`). The store treats
//! message bodies as opaque JSON - interpretation belongs to the caller.

pub mod cli;
pub mod store;

pub use store::{DlqEntry, LivenessRow, QueueDepth, ReadyEntry, ReservedMessage, Store};

/// Current unix timestamp in milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
