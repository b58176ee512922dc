//! Host-supplied restart and fallback capabilities
//!
//! The supervisor decides *when* to act; the hosting service decides
//! *how*. It implements these traits (respawn a process, reroute to a
//! standby, page someone) and passes them in at construction. The bus
//! ships no built-in restart logic.

use async_trait::async_trait;

use crate::domain::AgentId;

/// Attempt to bring a failed agent instance back
#[async_trait]
pub trait RestartStrategy: Send + Sync {
    /// Returns true when the agent is running again
    async fn restart(&self, agent: &AgentId) -> bool;
}

/// Redirect work when an agent cannot be restarted
#[async_trait]
pub trait FallbackStrategy: Send + Sync {
    /// `backup` is a healthy same-kind instance chosen by the
    /// supervisor, when one exists. Returns true when the redirect
    /// took effect; the unhealthy agent stays degraded either way.
    async fn fallback(&self, unhealthy: &AgentId, backup: Option<&AgentId>) -> bool;
}
