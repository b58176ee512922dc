//! Delivery metrics
//!
//! One MetricsCollector instance is constructed by the host and
//! injected into the Coordinator - there is no global. Counters are
//! plain atomics so recording never contends with readers.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::Priority;

/// Monotonic delivery counters (thread-safe)
#[derive(Debug, Default)]
pub struct MetricsCollector {
    delivered_ok: AtomicU64,
    delivered_error: AtomicU64,
    retries_scheduled: AtomicU64,
    permanent_failures: AtomicU64,
    recovered_total: AtomicU64,
    resource_pressure_events: AtomicU64,
    last_backoff_ms: AtomicI64,
}

impl MetricsCollector {
    /// Create a new collector with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_delivered_ok(&self) {
        self.delivered_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered_error(&self) {
        self.delivered_error.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scheduled retry and the backoff it was given
    pub fn record_retry(&self, backoff_ms: i64) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
        self.last_backoff_ms.store(backoff_ms, Ordering::Relaxed);
    }

    pub fn record_permanent_failure(&self) {
        self.permanent_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovered(&self, count: u64) {
        self.recovered_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_resource_pressure(&self) {
        self.resource_pressure_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough copy of all counters
    pub fn counters(&self) -> Counters {
        Counters {
            delivered_ok: self.delivered_ok.load(Ordering::Relaxed),
            delivered_error: self.delivered_error.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            permanent_failures: self.permanent_failures.load(Ordering::Relaxed),
            recovered_total: self.recovered_total.load(Ordering::Relaxed),
            resource_pressure_events: self.resource_pressure_events.load(Ordering::Relaxed),
            last_backoff_ms: self.last_backoff_ms.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one point in time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    pub delivered_ok: u64,
    pub delivered_error: u64,
    pub retries_scheduled: u64,
    pub permanent_failures: u64,
    pub recovered_total: u64,
    pub resource_pressure_events: u64,
    pub last_backoff_ms: i64,
}

/// Ready-queue depth gauge for one agent/priority pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueGauge {
    pub agent_key: String,
    pub priority: Priority,
    pub depth: u64,
}

/// Dead-letter depth gauge for one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqGauge {
    pub agent_key: String,
    pub depth: u64,
}

/// Full serializable metrics view: counters plus store gauges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: Counters,
    pub queues: Vec<QueueGauge>,
    pub dlq: Vec<DlqGauge>,
    pub reservations: u64,
}

impl MetricsSnapshot {
    /// Ready depth for one agent and priority (0 when absent)
    pub fn queue_depth(&self, agent_key: &str, priority: Priority) -> u64 {
        self.queues
            .iter()
            .find(|g| g.agent_key == agent_key && g.priority == priority)
            .map(|g| g.depth)
            .unwrap_or(0)
    }

    /// Dead-letter depth for one agent (0 when absent)
    pub fn dlq_depth(&self, agent_key: &str) -> u64 {
        self.dlq
            .iter()
            .find(|g| g.agent_key == agent_key)
            .map(|g| g.depth)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = MetricsCollector::new();
        metrics.record_delivered_ok();
        metrics.record_delivered_ok();
        metrics.record_delivered_error();
        metrics.record_retry(4_000);
        metrics.record_permanent_failure();
        metrics.record_recovered(3);

        let counters = metrics.counters();
        assert_eq!(counters.delivered_ok, 2);
        assert_eq!(counters.delivered_error, 1);
        assert_eq!(counters.retries_scheduled, 1);
        assert_eq!(counters.permanent_failures, 1);
        assert_eq!(counters.recovered_total, 3);
        assert_eq!(counters.last_backoff_ms, 4_000);
    }

    #[test]
    fn test_last_backoff_tracks_most_recent() {
        let metrics = MetricsCollector::new();
        metrics.record_retry(2_000);
        metrics.record_retry(8_000);
        assert_eq!(metrics.counters().last_backoff_ms, 8_000);
        assert_eq!(metrics.counters().retries_scheduled, 2);
    }

    #[test]
    fn test_snapshot_gauge_lookup() {
        let snapshot = MetricsSnapshot {
            counters: Counters::default(),
            queues: vec![QueueGauge {
                agent_key: "worker:default".to_string(),
                priority: Priority::High,
                depth: 2,
            }],
            dlq: vec![DlqGauge {
                agent_key: "worker:default".to_string(),
                depth: 1,
            }],
            reservations: 0,
        };

        assert_eq!(snapshot.queue_depth("worker:default", Priority::High), 2);
        assert_eq!(snapshot.queue_depth("worker:default", Priority::Low), 0);
        assert_eq!(snapshot.dlq_depth("worker:default"), 1);
        assert_eq!(snapshot.dlq_depth("planner:default"), 0);
    }
}
