//! Runtime configuration for the orchestration core.
//!
//! `CoreConfig` is deserialized from TOML. Every section and every field is
//! optional; omitted values fall back to the defaults below.
//!
//! ```toml
//! [event_bus]
//! history_capacity = 1000
//!
//! [query_cache]
//! default_ttl_ms = 300000
//! sweep_interval_ms = 300000
//!
//! [scheduler]
//! max_queue_len = 500
//!
//! [audit]
//! capacity = 10000
//! retention_days = 30
//! sweep_interval_secs = 86400
//! high_risk_threshold = 0.7
//! critical_fields = ["password", "role", "email"]
//!
//! [monitor]
//! history_capacity = 1000
//! alert_capacity = 100
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cadence_contracts::error::{CadenceError, CadenceResult};

use crate::cache::{DEFAULT_CACHE_TTL, DEFAULT_SWEEP_INTERVAL};
use crate::event_bus::DEFAULT_HISTORY_CAPACITY;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub event_bus: EventBusConfig,
    pub query_cache: QueryCacheConfig,
    pub scheduler: SchedulerConfig,
    pub audit: AuditConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Events retained for replay. Zero disables history.
    pub history_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryCacheConfig {
    pub default_ttl_ms: u64,
    pub sweep_interval_ms: u64,
}

impl QueryCacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_CACHE_TTL.as_millis() as u64,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on queued tasks. `None` leaves the queue unbounded.
    pub max_queue_len: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub capacity: usize,
    pub retention_days: u32,
    pub sweep_interval_secs: u64,
    /// Entries scoring strictly above this raise `audit.high_risk`.
    pub high_risk_threshold: f64,
    /// Field names whose modification raises a data change's risk score.
    pub critical_fields: Vec<String>,
}

impl AuditConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            retention_days: 30,
            sweep_interval_secs: 24 * 60 * 60,
            high_risk_threshold: 0.7,
            critical_fields: ["password", "role", "email", "permissions"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Samples kept per metric name.
    pub history_capacity: usize,
    pub alert_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            alert_capacity: 100,
        }
    }
}

impl CoreConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `CadenceError::ConfigError` if the TOML is malformed, does not
    /// match the schema, or holds out-of-range values.
    pub fn from_toml_str(s: &str) -> CadenceResult<Self> {
        let config: CoreConfig = toml::from_str(s).map_err(|e| CadenceError::ConfigError {
            reason: format!("failed to parse core TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it with `from_toml_str`.
    pub fn from_file(path: &Path) -> CadenceResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| CadenceError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject values the components cannot run with.
    pub fn validate(&self) -> CadenceResult<()> {
        let invalid = |reason: &str| {
            Err(CadenceError::ConfigError {
                reason: reason.to_string(),
            })
        };

        if self.query_cache.sweep_interval_ms == 0 {
            return invalid("query_cache.sweep_interval_ms must be greater than zero");
        }
        if self.scheduler.max_queue_len == Some(0) {
            return invalid("scheduler.max_queue_len must be greater than zero when set");
        }
        if self.audit.capacity == 0 {
            return invalid("audit.capacity must be greater than zero");
        }
        if self.audit.sweep_interval_secs == 0 {
            return invalid("audit.sweep_interval_secs must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.audit.high_risk_threshold) {
            return invalid("audit.high_risk_threshold must lie in [0, 1]");
        }
        if self.monitor.history_capacity == 0 || self.monitor.alert_capacity == 0 {
            return invalid("monitor capacities must be greater than zero");
        }
        Ok(())
    }
}
