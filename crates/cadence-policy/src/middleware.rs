//! The security validation pipeline.
//!
//! `SecurityMiddleware::validate_operation` runs three independent checks
//! and merges them:
//!
//! 1. rate limit on `context.identifier`
//! 2. permissions required by the operation
//! 3. payload inspection
//!
//! Errors concatenate and the risk score is the maximum. An invalid outcome,
//! or one at or above `violation_risk_threshold`, is emitted as
//! `security.violation`.

use std::path::Path;

use serde_json::{json, Value};
use tracing::{debug, warn};

use cadence_contracts::{
    error::CadenceResult,
    event::EventKind,
    security::{SecurityContext, ValidationOutcome},
};
use cadence_core::EventBus;

use crate::config::SecurityConfig;
use crate::validators::{check_permissions, PayloadInspector, RateLimiter};

const SOURCE: &str = "security";

#[derive(Debug)]
pub struct SecurityMiddleware {
    config: SecurityConfig,
    rate_limiter: RateLimiter,
    inspector: PayloadInspector,
    events: EventBus,
}

impl SecurityMiddleware {
    /// Build the validators from `config`.
    ///
    /// Returns `CadenceError::ConfigError` if a payload pattern does not compile.
    pub fn new(config: SecurityConfig, events: EventBus) -> CadenceResult<Self> {
        Ok(Self {
            rate_limiter: RateLimiter::new(&config.rate_limit),
            inspector: PayloadInspector::new(&config.payload)?,
            config,
            events,
        })
    }

    pub fn from_toml_str(s: &str, events: EventBus) -> CadenceResult<Self> {
        Self::new(SecurityConfig::from_toml_str(s)?, events)
    }

    pub fn from_file(path: &Path, events: EventBus) -> CadenceResult<Self> {
        Self::new(SecurityConfig::from_file(path)?, events)
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Validate `operation` on `data` for the caller in `context`.
    pub async fn validate_operation(
        &self,
        operation: &str,
        data: &Value,
        context: &SecurityContext,
    ) -> ValidationOutcome {
        let outcome = self
            .rate_limiter
            .check(&context.identifier)
            .merge(check_permissions(&self.config, operation, context))
            .merge(self.inspector.inspect(data));

        let risk = outcome.risk_score.value();
        if !outcome.is_valid || risk >= self.config.violation_risk_threshold {
            warn!(
                operation,
                identifier = %context.identifier,
                risk,
                errors = ?outcome.errors,
                "security violation"
            );
            self.events
                .emit(
                    EventKind::SECURITY_VIOLATION,
                    json!({
                        "operation": operation,
                        "identifier": context.identifier,
                        "userId": context.user_id,
                        "errors": outcome.errors,
                        "warnings": outcome.warnings,
                        "riskScore": outcome.risk_score,
                    }),
                    SOURCE,
                )
                .await;
        } else {
            debug!(operation, identifier = %context.identifier, risk, "operation validated");
        }

        outcome
    }
}
