//! AgentBus - agent message coordination and lifecycle supervision
//!
//! AgentBus delivers messages between independently-addressable agents
//! and supervises whether each agent instance is alive and healthy.
//! Delivery is at-least-once: messages queue per agent by priority,
//! consumers take time-bounded reservation leases, failures retry with
//! exponential backoff until they dead-letter, and a recovery scanner
//! reclaims leases abandoned by crashed consumers.
//!
//! # Core Concepts
//!
//! - **Store is truth**: every queue, lease, dead letter, and liveness
//!   record lives in one shared SQLite database; its transactions are
//!   the only cross-process coordination
//! - **Leases, not locks**: a received message is exclusively held
//!   until its visibility timeout, then anyone may reclaim it
//! - **Supervision is contained**: restart and fallback run inside the
//!   Failure Supervisor with host-supplied strategies; senders and
//!   consumers never observe them
//!
//! # Modules
//!
//! - [`domain`] - agent identity, messages, priorities
//! - [`coordinator`] - send/receive/ack/nack facade with retry and recovery
//! - [`registry`] - membership, heartbeat liveness, health checks
//! - [`supervisor`] - failure detection, restart/fallback, audit trail
//! - [`store`] - actor wrapping the shared msgstore database
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod agent;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod metrics;
pub mod peers;
pub mod registry;
pub mod store;
pub mod supervisor;
pub mod tasks;

// Re-export commonly used types
pub use agent::{Agent, HealthReport};
pub use config::Config;
pub use coordinator::{CoordinatorConfig, CoordinatorError, MessageCoordinator, RecoveryScanner, SendReceipt};
pub use domain::{
    AgentId, AgentKind, AgentMessage, AgentRuntimeRecord, AgentStatus, Envelope, FailureKind, Heartbeat, MessageType,
    Priority,
};
pub use metrics::{Counters, MetricsCollector, MetricsSnapshot};
pub use peers::{ResourceManager, WorkflowMonitor};
pub use registry::{AgentRegistry, AgentView, HealthCheckOutcome, RegistryConfig, RegistrySnapshot};
pub use store::{StoreError, StoreManager};
pub use supervisor::{
    AuditEvent, AuditKind, DetectionReport, FailureSupervisor, FallbackStrategy, RestartStrategy, SupervisorConfig,
};
pub use tasks::PeriodicTask;
