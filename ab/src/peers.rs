//! Peer subsystem interfaces consumed by the bus
//!
//! These traits describe collaborators the hosting service wires in.
//! The bus only consumes them: workflow timeout tracking and resource
//! accounting are implemented elsewhere, and nothing here is required
//! for delivery correctness.

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::AgentKind;

/// Workflow-run timeout and rollback tracking, owned by a peer subsystem
///
/// When installed on the Failure Supervisor, its periodic tick drives
/// `check_timeouts_once` so the peer sweeps on the same cadence as
/// failure detection.
#[async_trait]
pub trait WorkflowMonitor: Send + Sync {
    /// Sweep for timed-out runs/steps; returns how many were flagged
    async fn check_timeouts_once(&self) -> usize;

    /// Serializable metrics for the diagnostics layer
    async fn metrics_snapshot(&self) -> Value;
}

/// Resource usage and allocation queries, owned by a peer subsystem
///
/// The Coordinator may consult this to annotate scheduling decisions;
/// a saturated answer never blocks delivery.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Whether the given agent kind has headroom for more work
    async fn has_capacity(&self, kind: AgentKind) -> bool;

    /// Serializable usage snapshot for the diagnostics layer
    async fn usage_snapshot(&self) -> Value;
}
