//! Domain types: agent identity, messages, priorities, runtime records

mod agent_id;
mod message;
mod priority;
mod runtime;

pub use agent_id::{AgentId, AgentKind};
pub use message::{AgentMessage, Envelope, FailureKind, MessageType};
pub use priority::Priority;
pub use runtime::{AgentRuntimeRecord, AgentStatus, Heartbeat};
