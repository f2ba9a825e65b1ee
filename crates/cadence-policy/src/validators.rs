//! The independent checks behind `SecurityMiddleware`.
//!
//! Each validator returns a `ValidationOutcome`; the middleware merges them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use tokio::time::Instant;

use cadence_contracts::{
    audit::RiskScore,
    error::{CadenceError, CadenceResult},
    security::{SecurityContext, ValidationOutcome},
};

use crate::config::{PayloadConfig, RateLimitConfig, SecurityConfig, WILDCARD};

const RATE_LIMIT_RISK: f64 = 1.0;
const RATE_LIMIT_WARNING_RISK: f64 = 0.3;
const PERMISSION_RISK: f64 = 0.8;
const INJECTION_RISK: f64 = 0.9;
const OVERSIZE_RISK: f64 = 0.4;
const NESTING_RISK: f64 = 0.5;

// ── Rate limiting ─────────────────────────────────────────────────────────────

/// Sliding-window request counter keyed by caller identifier.
///
/// Only accepted requests are counted, so a rejected caller regains
/// capacity as soon as its oldest accepted request leaves the window.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: usize,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: config.window(),
            max_requests: config.max_requests,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, identifier: &str) -> ValidationOutcome {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let recent = hits.entry(identifier.to_string()).or_default();

        while recent
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            recent.pop_front();
        }

        if recent.len() >= self.max_requests {
            return ValidationOutcome::reject(
                format!(
                    "rate limit exceeded: {} requests per {}s",
                    self.max_requests,
                    self.window.as_secs()
                ),
                RATE_LIMIT_RISK,
            );
        }

        recent.push_back(now);

        let mut outcome = ValidationOutcome::pass();
        if recent.len() * 10 >= self.max_requests * 9 {
            outcome.warnings.push(format!(
                "approaching rate limit: {}/{} requests in window",
                recent.len(),
                self.max_requests
            ));
            outcome.risk_score = RiskScore::new(RATE_LIMIT_WARNING_RISK);
        }
        outcome
    }

    /// Forget identifiers with no request inside the window.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = hits.len();
        hits.retain(|_, recent| {
            recent
                .back()
                .is_some_and(|t| now.duration_since(*t) < self.window)
        });
        before - hits.len()
    }
}

// ── Permissions ───────────────────────────────────────────────────────────────

/// Check that `context` holds every permission `operation` requires.
pub fn check_permissions(
    config: &SecurityConfig,
    operation: &str,
    context: &SecurityContext,
) -> ValidationOutcome {
    let required = config.required_permissions(operation);
    if required.is_empty() {
        return ValidationOutcome::pass();
    }

    let granted: HashSet<&str> = context
        .permissions
        .iter()
        .map(String::as_str)
        .chain(config.role_permissions(&context.roles))
        .collect();
    if granted.contains(WILDCARD) {
        return ValidationOutcome::pass();
    }

    required
        .into_iter()
        .filter(|permission| !granted.contains(permission))
        .map(|permission| {
            ValidationOutcome::reject(
                format!(
                    "missing permission '{}' for operation '{}'",
                    permission, operation
                ),
                PERMISSION_RISK,
            )
        })
        .fold(ValidationOutcome::pass(), ValidationOutcome::merge)
}

// ── Payload inspection ────────────────────────────────────────────────────────

/// Walks a JSON payload looking for oversized strings, deep nesting and
/// injection patterns.
#[derive(Debug)]
pub struct PayloadInspector {
    max_string_length: usize,
    max_depth: usize,
    dangerous: Vec<Regex>,
    sql: Vec<Regex>,
}

impl PayloadInspector {
    /// Compile the configured patterns.
    ///
    /// Returns `CadenceError::ConfigError` naming the first invalid regex.
    pub fn new(config: &PayloadConfig) -> CadenceResult<Self> {
        Ok(Self {
            max_string_length: config.max_string_length,
            max_depth: config.max_depth,
            dangerous: compile(&config.dangerous_patterns)?,
            sql: compile(&config.sql_patterns)?,
        })
    }

    pub fn inspect(&self, payload: &Value) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::pass();
        self.walk(payload, "$", 1, &mut outcome);
        outcome
    }

    fn walk(&self, value: &Value, path: &str, depth: usize, outcome: &mut ValidationOutcome) {
        match value {
            Value::Object(map) => {
                if depth > self.max_depth {
                    self.flag_depth(path, outcome);
                    return;
                }
                for (key, child) in map {
                    self.check_text(key, &format!("{path}.{key} (key)"), outcome);
                    self.walk(child, &format!("{path}.{key}"), depth + 1, outcome);
                }
            }
            Value::Array(items) => {
                if depth > self.max_depth {
                    self.flag_depth(path, outcome);
                    return;
                }
                for (index, child) in items.iter().enumerate() {
                    self.walk(child, &format!("{path}[{index}]"), depth + 1, outcome);
                }
            }
            Value::String(text) => self.check_text(text, path, outcome),
            _ => {}
        }
    }

    fn flag_depth(&self, path: &str, outcome: &mut ValidationOutcome) {
        outcome.is_valid = false;
        outcome.errors.push(format!(
            "payload nesting exceeds depth {} at {}",
            self.max_depth, path
        ));
        outcome.risk_score = outcome.risk_score.max(RiskScore::new(NESTING_RISK));
    }

    fn check_text(&self, text: &str, path: &str, outcome: &mut ValidationOutcome) {
        let mut flag = |message: String, risk: f64| {
            outcome.is_valid = false;
            outcome.errors.push(message);
            outcome.risk_score = outcome.risk_score.max(RiskScore::new(risk));
        };

        if text.chars().count() > self.max_string_length {
            flag(
                format!("{} exceeds {} characters", path, self.max_string_length),
                OVERSIZE_RISK,
            );
        }
        if self.dangerous.iter().any(|re| re.is_match(text)) {
            flag(format!("potentially dangerous content in {}", path), INJECTION_RISK);
        }
        if self.sql.iter().any(|re| re.is_match(text)) {
            flag(format!("possible SQL injection in {}", path), INJECTION_RISK);
        }
    }
}

fn compile(patterns: &[String]) -> CadenceResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|e| CadenceError::ConfigError {
                reason: format!("invalid payload pattern '{}': {}", pattern, e),
            })
        })
        .collect()
}
