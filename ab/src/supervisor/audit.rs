//! Bounded audit trail of supervision outcomes

use std::collections::VecDeque;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// Default audit ring capacity
pub const DEFAULT_AUDIT_CAPACITY: usize = 500;

/// What happened to an agent during supervision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditKind {
    RestartAttempted,
    RestartSucceeded,
    RestartFailed,
    FallbackSucceeded,
    FallbackFailed,
    FallbackUnavailable,
    Recovered,
}

/// One supervision outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unix ms
    pub at: i64,
    #[serde(rename = "agent-key")]
    pub agent_key: String,
    pub kind: AuditKind,
}

/// Fixed-capacity ring of audit events; oldest entries fall off
pub struct AuditLog {
    capacity: usize,
    events: RwLock<VecDeque<AuditEvent>>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            events: RwLock::new(VecDeque::new()),
        }
    }

    /// Append an event, evicting the oldest past capacity
    pub fn record(&self, agent_key: &str, kind: AuditKind) {
        let event = AuditEvent {
            at: msgstore::now_ms(),
            agent_key: agent_key.to_string(),
            kind,
        };
        if let Ok(mut events) = self.events.write() {
            events.push_back(event);
            while events.len() > self.capacity {
                events.pop_front();
            }
        }
    }

    /// Most recent `n` events, oldest first
    pub fn recent(&self, n: usize) -> Vec<AuditEvent> {
        self.events
            .read()
            .map(|events| events.iter().rev().take(n).rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.read().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_recent() {
        let log = AuditLog::new(10);
        log.record("worker:a", AuditKind::RestartAttempted);
        log.record("worker:a", AuditKind::RestartSucceeded);

        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].kind, AuditKind::RestartAttempted);
        assert_eq!(recent[1].kind, AuditKind::RestartSucceeded);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = AuditLog::new(3);
        for i in 0..5 {
            log.record(&format!("worker:{}", i), AuditKind::RestartFailed);
        }

        assert_eq!(log.len(), 3);
        let recent = log.recent(10);
        assert_eq!(recent[0].agent_key, "worker:2");
        assert_eq!(recent[2].agent_key, "worker:4");
    }

    #[test]
    fn test_recent_limits_results() {
        let log = AuditLog::new(10);
        for _ in 0..4 {
            log.record("worker:a", AuditKind::Recovered);
        }
        assert_eq!(log.recent(2).len(), 2);
    }

    #[test]
    fn test_audit_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&AuditKind::FallbackUnavailable).unwrap();
        assert_eq!(json, "\"fallback-unavailable\"");
    }
}
