//! AgentBus configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorConfig;
use crate::registry::RegistryConfig;
use crate::supervisor::SupervisorConfig;

/// Main AgentBus configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backing store location
    pub storage: StorageConfig,

    /// Delivery, retry, and recovery tuning
    pub coordinator: CoordinatorSettings,

    /// Liveness and health-check tuning
    pub registry: RegistrySettings,

    /// Failure detection tuning
    pub supervisor: SupervisorSettings,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear messages.
    pub fn validate(&self) -> Result<()> {
        if self.coordinator.max_attempts == 0 {
            return Err(eyre::eyre!("coordinator.max-attempts must be at least 1"));
        }
        if self.coordinator.visibility_timeout_ms <= 0 {
            return Err(eyre::eyre!("coordinator.visibility-timeout-ms must be positive"));
        }
        if self.registry.heartbeat_ttl_ms <= 0 {
            return Err(eyre::eyre!("registry.heartbeat-ttl-ms must be positive"));
        }
        if self.supervisor.failure_threshold == 0 {
            return Err(eyre::eyre!("supervisor.failure-threshold must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .agentbus.yml
        let local_config = PathBuf::from(".agentbus.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/agentbus/agentbus.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentbus").join("agentbus.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Backing store location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database shared by every process
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("agentbus")
                .join("bus.db"),
        }
    }
}

/// Delivery and retry tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSettings {
    #[serde(rename = "visibility-timeout-ms")]
    pub visibility_timeout_ms: i64,

    #[serde(rename = "base-backoff-ms")]
    pub base_backoff_ms: i64,

    #[serde(rename = "max-backoff-ms")]
    pub max_backoff_ms: i64,

    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "recovery-interval-ms")]
    pub recovery_interval_ms: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        let defaults = CoordinatorConfig::default();
        Self {
            visibility_timeout_ms: defaults.visibility_timeout_ms,
            base_backoff_ms: defaults.base_backoff_ms,
            max_backoff_ms: defaults.max_backoff_ms,
            max_attempts: defaults.max_attempts,
            recovery_interval_ms: defaults.recovery_interval_ms,
        }
    }
}

impl From<&CoordinatorSettings> for CoordinatorConfig {
    fn from(settings: &CoordinatorSettings) -> Self {
        Self {
            visibility_timeout_ms: settings.visibility_timeout_ms,
            base_backoff_ms: settings.base_backoff_ms,
            max_backoff_ms: settings.max_backoff_ms,
            max_attempts: settings.max_attempts,
            recovery_interval_ms: settings.recovery_interval_ms,
        }
    }
}

/// Liveness and health-check tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    #[serde(rename = "heartbeat-ttl-ms")]
    pub heartbeat_ttl_ms: i64,

    #[serde(rename = "health-check-interval-ms")]
    pub health_check_interval_ms: u64,

    #[serde(rename = "health-check-timeout-ms")]
    pub health_check_timeout_ms: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        let defaults = RegistryConfig::default();
        Self {
            heartbeat_ttl_ms: defaults.heartbeat_ttl_ms,
            health_check_interval_ms: defaults.health_check_interval_ms,
            health_check_timeout_ms: defaults.health_check_timeout_ms,
        }
    }
}

impl From<&RegistrySettings> for RegistryConfig {
    fn from(settings: &RegistrySettings) -> Self {
        Self {
            heartbeat_ttl_ms: settings.heartbeat_ttl_ms,
            health_check_interval_ms: settings.health_check_interval_ms,
            health_check_timeout_ms: settings.health_check_timeout_ms,
        }
    }
}

/// Failure detection tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    #[serde(rename = "detection-interval-ms")]
    pub detection_interval_ms: u64,

    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    #[serde(rename = "audit-capacity")]
    pub audit_capacity: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            detection_interval_ms: defaults.detection_interval_ms,
            failure_threshold: defaults.failure_threshold,
            audit_capacity: defaults.audit_capacity,
        }
    }
}

impl From<&SupervisorSettings> for SupervisorConfig {
    fn from(settings: &SupervisorSettings) -> Self {
        Self {
            detection_interval_ms: settings.detection_interval_ms,
            failure_threshold: settings.failure_threshold,
            audit_capacity: settings.audit_capacity,
        }
    }
}
