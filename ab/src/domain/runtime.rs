//! Per-agent runtime state persisted in liveness records

use serde::{Deserialize, Serialize};

use super::AgentId;

/// Lifecycle status of a registered agent instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Idle,
    Busy,
    Error,
    Degraded,
    Stopped,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Busy => write!(f, "busy"),
            Self::Error => write!(f, "error"),
            Self::Degraded => write!(f, "degraded"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// What an agent reports when refreshing its liveness record
#[derive(Debug, Clone, Copy, Default)]
pub struct Heartbeat {
    pub status: AgentStatus,
    pub requests: u64,
    pub errors: u64,
}

/// The liveness record body stored under the registry namespace
///
/// Created on registration, refreshed by heartbeats, gone when the TTL
/// elapses without a refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRuntimeRecord {
    #[serde(rename = "agent-id")]
    pub agent_id: AgentId,
    pub status: AgentStatus,
    #[serde(rename = "last-heartbeat")]
    pub last_heartbeat: i64,
    #[serde(rename = "started-at")]
    pub started_at: i64,
    pub running: bool,
    pub degraded: bool,
    pub requests: u64,
    pub errors: u64,
}

impl AgentRuntimeRecord {
    /// Fresh record for a newly registered agent
    pub fn new(agent_id: AgentId, now: i64) -> Self {
        Self {
            agent_id,
            status: AgentStatus::Idle,
            last_heartbeat: now,
            started_at: now,
            running: true,
            degraded: false,
            requests: 0,
            errors: 0,
        }
    }

    /// Apply a heartbeat, preserving registration-time fields
    pub fn refresh(&mut self, beat: Heartbeat, now: i64) {
        self.status = beat.status;
        self.requests = beat.requests;
        self.errors = beat.errors;
        self.last_heartbeat = now;
        self.running = !matches!(beat.status, AgentStatus::Stopped);
    }

    /// Milliseconds since this agent registered
    pub fn uptime_ms(&self, now: i64) -> i64 {
        (now - self.started_at).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AgentKind;

    #[test]
    fn test_new_record_defaults() {
        let record = AgentRuntimeRecord::new(AgentId::of(AgentKind::Worker), 1_000);
        assert_eq!(record.status, AgentStatus::Idle);
        assert!(record.running);
        assert!(!record.degraded);
        assert_eq!(record.started_at, 1_000);
    }

    #[test]
    fn test_refresh_updates_heartbeat_fields() {
        let mut record = AgentRuntimeRecord::new(AgentId::of(AgentKind::Worker), 1_000);
        record.refresh(
            Heartbeat {
                status: AgentStatus::Busy,
                requests: 10,
                errors: 2,
            },
            2_000,
        );

        assert_eq!(record.status, AgentStatus::Busy);
        assert_eq!(record.last_heartbeat, 2_000);
        assert_eq!(record.requests, 10);
        assert_eq!(record.errors, 2);
        // Registration time survives refreshes
        assert_eq!(record.started_at, 1_000);
        assert_eq!(record.uptime_ms(3_000), 2_000);
    }

    #[test]
    fn test_stopped_heartbeat_clears_running() {
        let mut record = AgentRuntimeRecord::new(AgentId::of(AgentKind::Worker), 1_000);
        record.refresh(
            Heartbeat {
                status: AgentStatus::Stopped,
                ..Default::default()
            },
            2_000,
        );
        assert!(!record.running);
    }
}
