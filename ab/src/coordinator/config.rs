//! Coordinator configuration

/// Tunables for delivery, retry, and recovery
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a reservation lease is valid by default
    pub visibility_timeout_ms: i64,

    /// First-retry backoff; doubles per attempt
    pub base_backoff_ms: i64,

    /// Ceiling for computed backoff
    pub max_backoff_ms: i64,

    /// Attempts before a transient failure dead-letters
    pub max_attempts: u32,

    /// Recovery scanner sweep interval
    pub recovery_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_ms: 30_000,
            base_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            max_attempts: 5,
            recovery_interval_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sane() {
        let config = CoordinatorConfig::default();
        assert!(config.visibility_timeout_ms > 0);
        assert!(config.base_backoff_ms <= config.max_backoff_ms);
        assert!(config.max_attempts >= 1);
    }
}
