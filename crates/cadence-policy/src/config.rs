//! Security configuration schema.
//!
//! Every section is optional. An empty document yields the defaults.
//!
//! ```toml
//! violation_risk_threshold = 0.7
//!
//! [rate_limit]
//! window_secs = 60
//! max_requests = 100
//!
//! [payload]
//! max_string_length = 10000
//! max_depth = 10
//!
//! [[permissions]]
//! operation = "DELETE_ARTIST"
//! permission = "artist:delete"
//!
//! [roles]
//! editor = ["artist:create", "artist:update"]
//! admin = ["*"]
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cadence_contracts::error::{CadenceError, CadenceResult};

/// Grants every permission when held directly or through a role.
pub const WILDCARD: &str = "*";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub rate_limit: RateLimitConfig,
    pub payload: PayloadConfig,
    /// Operation → required permission. Operations without a rule need none.
    pub permissions: Vec<PermissionRule>,
    /// Role name → permissions the role grants.
    pub roles: BTreeMap<String, Vec<String>>,
    /// Outcomes at or above this risk are reported even when valid.
    pub violation_risk_threshold: f64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            payload: PayloadConfig::default(),
            permissions: Vec::new(),
            roles: BTreeMap::new(),
            violation_risk_threshold: 0.7,
        }
    }
}

impl SecurityConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `CadenceError::ConfigError` if the TOML is malformed or does
    /// not match the schema.
    pub fn from_toml_str(s: &str) -> CadenceResult<Self> {
        let config: SecurityConfig = toml::from_str(s).map_err(|e| CadenceError::ConfigError {
            reason: format!("failed to parse security TOML: {}", e),
        })?;
        if config.rate_limit.max_requests == 0 || config.rate_limit.window_secs == 0 {
            return Err(CadenceError::ConfigError {
                reason: "rate_limit.window_secs and rate_limit.max_requests must be greater than zero"
                    .to_string(),
            });
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> CadenceResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| CadenceError::ConfigError {
            reason: format!("failed to read security file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Permissions required by `operation`, in declaration order.
    pub fn required_permissions(&self, operation: &str) -> Vec<&str> {
        self.permissions
            .iter()
            .filter(|rule| rule.matches(operation))
            .map(|rule| rule.permission.as_str())
            .collect()
    }

    /// Permissions granted by `roles`.
    pub fn role_permissions<'a>(&'a self, roles: &'a [String]) -> impl Iterator<Item = &'a str> + 'a {
        roles
            .iter()
            .filter_map(|role| self.roles.get(role))
            .flatten()
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub window_secs: u64,
    /// Requests allowed per identifier within one window.
    pub max_requests: usize,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadConfig {
    /// Longest accepted string value, in characters.
    pub max_string_length: usize,
    /// Deepest accepted object/array nesting. The top level is depth 1.
    pub max_depth: usize,
    /// Regexes flagging script injection and similar content.
    pub dangerous_patterns: Vec<String>,
    /// Regexes flagging SQL injection attempts.
    pub sql_patterns: Vec<String>,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_string_length: 10_000,
            max_depth: 10,
            dangerous_patterns: [
                r"(?i)<\s*script\b",
                r"(?i)javascript\s*:",
                r"(?i)\bon(load|error|click|mouseover|focus|submit)\s*=",
                r"(?i)\beval\s*\(",
                r"(?i)<\s*iframe\b",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            sql_patterns: [
                r"(?i)\bunion\s+(all\s+)?select\b",
                r"(?i)\bdrop\s+(table|database)\b",
                r"(?i)\binsert\s+into\b",
                r"(?i)\bdelete\s+from\b",
                r"(?i)'\s*or\s+'?\d+'?\s*=\s*'?\d+",
                r"(?i);\s*(drop|delete|update|insert)\b",
                r"--\s*$",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// One operation → permission requirement.
///
/// `operation` may be `"*"` to require the permission for every operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRule {
    pub operation: String,
    pub permission: String,
}

impl PermissionRule {
    pub fn matches(&self, operation: &str) -> bool {
        self.operation == WILDCARD || self.operation == operation
    }
}
