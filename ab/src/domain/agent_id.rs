//! Agent identity: kind plus instance name

use serde::{Deserialize, Serialize};

/// The default instance name for singleton agents
pub const DEFAULT_INSTANCE: &str = "default";

/// Kinds of agents the bus coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Planner,
    Worker,
    Reviewer,
    Monitor,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planner => write!(f, "planner"),
            Self::Worker => write!(f, "worker"),
            Self::Reviewer => write!(f, "reviewer"),
            Self::Monitor => write!(f, "monitor"),
        }
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "planner" => Ok(Self::Planner),
            "worker" => Ok(Self::Worker),
            "reviewer" => Ok(Self::Reviewer),
            "monitor" => Ok(Self::Monitor),
            _ => Err(format!("Unknown agent kind: {}", s)),
        }
    }
}

/// Identity of a logical worker: `(kind, instance)`
///
/// Immutable once constructed. The store-facing form is the key
/// `kind:instance`, which is also the Display rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId {
    pub kind: AgentKind,
    pub instance: String,
}

impl AgentId {
    /// Create an identity with an explicit instance name
    pub fn new(kind: AgentKind, instance: impl Into<String>) -> Self {
        Self {
            kind,
            instance: instance.into(),
        }
    }

    /// Create an identity with the default instance name
    pub fn of(kind: AgentKind) -> Self {
        Self::new(kind, DEFAULT_INSTANCE)
    }

    /// Store addressing key: `kind:instance`
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.instance)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.instance)
    }
}

impl std::str::FromStr for AgentId {
    type Err = String;

    /// Parse `kind` or `kind:instance`; a bare kind gets the default instance
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((kind, instance)) if !instance.is_empty() => Ok(Self::new(kind.parse::<AgentKind>()?, instance)),
            Some((kind, _)) => Ok(Self::of(kind.parse::<AgentKind>()?)),
            None => Ok(Self::of(s.parse::<AgentKind>()?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let id = AgentId::new(AgentKind::Worker, "alpha");
        assert_eq!(id.key(), "worker:alpha");
        assert_eq!(id.to_string(), "worker:alpha");
    }

    #[test]
    fn test_default_instance() {
        let id = AgentId::of(AgentKind::Planner);
        assert_eq!(id.instance, DEFAULT_INSTANCE);
        assert_eq!(id.key(), "planner:default");
    }

    #[test]
    fn test_parse_with_and_without_instance() {
        assert_eq!("worker:alpha".parse::<AgentId>().unwrap(), AgentId::new(AgentKind::Worker, "alpha"));
        assert_eq!("worker".parse::<AgentId>().unwrap(), AgentId::of(AgentKind::Worker));
        assert_eq!("worker:".parse::<AgentId>().unwrap(), AgentId::of(AgentKind::Worker));
        assert!("juggler:x".parse::<AgentId>().is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let id = AgentId::new(AgentKind::Reviewer, "r2");
        let json = serde_json::to_string(&id).unwrap();
        let back: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
