//! Engine configuration tree.
//!
//! Loaded by [`crate::infrastructure::config::ConfigLoader`] with
//! hierarchical merging (defaults, yaml file, environment).

use serde::{Deserialize, Serialize};

use super::binding::ExternalBinding;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub automation: AutomationConfig,
    pub event_log: EventLogConfig,
    pub metrics: MetricsConfig,
    pub sync: SyncConfig,
    pub server: ServerConfig,
    pub webhooks: Vec<WebhookEndpointConfig>,
    pub bindings: Vec<ExternalBinding>,
}

/// Which store backs the three collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    /// SQLite database URL; ignored for the memory backend.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: "sqlite:.conveyor/conveyor.db".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// pretty | json
    pub format: String,
    /// Optional log file; stderr when unset.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomationConfig {
    /// How many automated mutations a single originating event may
    /// chain through before dispatch stops evaluating rules.
    pub max_automation_hops: u32,
    /// Install the builtin rule set on startup.
    pub install_default_rules: bool,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            max_automation_hops: 1,
            install_default_rules: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    /// Maximum retained events; oldest are evicted first.
    pub capacity: usize,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self { capacity: 10_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// A status is a bottleneck candidate above this many tasks.
    pub bottleneck_min_tasks: usize,
    /// ... and above this average dwell time in hours.
    pub bottleneck_min_hours: f64,
    /// Fractional change in completed counts that flips the velocity
    /// trend (0.10 = ±10%).
    pub velocity_threshold: f64,
    /// Window scanned by `realtime_health`, in hours.
    pub health_window_hours: i64,
    /// Failures in the health window before `warning` / `critical`.
    pub failure_warning_threshold: usize,
    pub failure_critical_threshold: usize,
    /// Active bottlenecks before `warning` / `critical`.
    pub bottleneck_warning_threshold: usize,
    pub bottleneck_critical_threshold: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            bottleneck_min_tasks: 5,
            bottleneck_min_hours: 48.0,
            velocity_threshold: 0.10,
            health_window_hours: 1,
            failure_warning_threshold: 5,
            failure_critical_threshold: 10,
            bottleneck_warning_threshold: 1,
            bottleneck_critical_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Per-attempt timeout for outbound tracker calls, milliseconds.
    pub request_timeout_ms: u64,
    /// Initial backoff between retries, milliseconds.
    pub initial_backoff_ms: u64,
    /// Give up retrying after this long, milliseconds.
    pub max_elapsed_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 10_000,
            initial_backoff_ms: 500,
            max_elapsed_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9400,
            enable_cors: true,
        }
    }
}

/// One registered webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpointConfig {
    /// Endpoint path, e.g. `/webhooks/agent`.
    pub path: String,
    /// Normalizer to mount: `agent | board | pulls | generic`.
    pub provider: String,
    /// HMAC secret; payloads are rejected on mismatch when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.backend, StorageBackend::Memory);
        assert_eq!(config.automation.max_automation_hops, 1);
        assert_eq!(config.event_log.capacity, 10_000);
        assert!(config.webhooks.is_empty());
        assert!((config.metrics.velocity_threshold - 0.10).abs() < f64::EPSILON);
    }

    #[test]
    fn test_config_deserializes_partial_yaml_shape() {
        let json = serde_json::json!({
            "automation": { "max_automation_hops": 3 },
            "webhooks": [
                { "path": "/webhooks/agent", "provider": "agent" }
            ]
        });
        let config: Config = serde_json::from_value(json).unwrap();
        assert_eq!(config.automation.max_automation_hops, 3);
        // Unset sections fall back to defaults.
        assert!(config.automation.install_default_rules);
        assert_eq!(config.webhooks.len(), 1);
        assert!(config.webhooks[0].secret.is_none());
    }
}
