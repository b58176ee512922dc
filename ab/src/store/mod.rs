//! Async access to the shared msgstore database
//!
//! The store is the single source of truth for queues, reservations,
//! dead letters, and liveness. This module wraps it in an actor so
//! async callers share one serialized connection.

mod manager;
mod messages;

pub use manager::StoreManager;
pub use messages::{StoreCommand, StoreError, StoreResponse};
