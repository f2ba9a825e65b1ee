//! Per-type payload verifier.
//!
//! Verification runs in two phases:
//!
//! 1. **Structural**: the payload is validated against the registered JSON
//!    Schema document, compiled once at registration.
//! 2. **Rules**: each `PayloadRule` is evaluated in order.
//!
//! All failures are collected before returning so callers see the full
//! failure set in one pass.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use tracing::{debug, warn};

use cadence_contracts::{
    command::TypedCommand,
    error::{CadenceError, CadenceResult},
    query::TypedQuery,
};

use crate::schema::{
    PayloadRule, PayloadSchema, RuleCheck, VerificationFailure, VerificationReport,
    JSON_SCHEMA_RULE,
};

/// A caller-supplied rule. Returns `Some(message)` when the payload fails.
pub type RuleFn = Box<dyn Fn(&Value) -> Option<String> + Send + Sync>;

struct CompiledSchema {
    validator: Option<jsonschema::Validator>,
    rules: Vec<PayloadRule>,
}

pub struct SchemaVerifier {
    schemas: RwLock<HashMap<String, CompiledSchema>>,
    functions: RwLock<HashMap<String, RuleFn>>,
}

impl SchemaVerifier {
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// Register `schema` for payloads of `payload_type`, replacing any
    /// previous schema for that type.
    ///
    /// Returns `CadenceError::ConfigError` if the JSON Schema document does
    /// not compile.
    pub fn register(&self, payload_type: impl Into<String>, schema: PayloadSchema) -> CadenceResult<()> {
        let payload_type = payload_type.into();
        let validator = if schema.json_schema.is_null() {
            None
        } else {
            let compiled = jsonschema::validator_for(&schema.json_schema).map_err(|e| {
                CadenceError::ConfigError {
                    reason: format!("invalid JSON Schema for '{}': {}", payload_type, e),
                }
            })?;
            Some(compiled)
        };

        debug!(payload_type = %payload_type, rules = schema.rules.len(), "schema registered");
        self.schemas
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                payload_type,
                CompiledSchema {
                    validator,
                    rules: schema.rules,
                },
            );
        Ok(())
    }

    pub fn register_command<C: TypedCommand>(&self, schema: PayloadSchema) -> CadenceResult<()> {
        self.register(C::TYPE, schema)
    }

    pub fn register_query<Q: TypedQuery>(&self, schema: PayloadSchema) -> CadenceResult<()> {
        self.register(Q::TYPE, schema)
    }

    /// Register a function for `RuleCheck::Custom` rules named `name`.
    /// Registering the same name twice replaces the previous function.
    pub fn register_fn(&self, name: impl Into<String>, f: RuleFn) {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), f);
    }

    pub fn has_schema(&self, payload_type: &str) -> bool {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(payload_type)
    }

    /// Verify `payload` against the schema registered for `payload_type`.
    /// Types without a schema pass.
    pub fn verify(&self, payload_type: &str, payload: &Value) -> VerificationReport {
        let schemas = self.schemas.read().unwrap_or_else(PoisonError::into_inner);
        let Some(schema) = schemas.get(payload_type) else {
            return VerificationReport::pass();
        };

        let mut failures = Vec::new();

        if let Some(validator) = &schema.validator {
            for error in validator.iter_errors(payload) {
                let message = format!("JSON Schema violation at {}: {}", error.instance_path, error);
                warn!(payload_type, %message, "structural validation failure");
                failures.push(VerificationFailure {
                    rule_id: JSON_SCHEMA_RULE.to_string(),
                    message,
                });
            }
        }

        for rule in &schema.rules {
            if let Some(message) = self.evaluate(&rule.check, payload) {
                warn!(payload_type, rule_id = %rule.rule_id, %message, "payload rule failed");
                failures.push(VerificationFailure {
                    rule_id: rule.rule_id.clone(),
                    message,
                });
            }
        }

        debug!(payload_type, failures = failures.len(), "verification complete");
        VerificationReport::from_failures(failures)
    }

    fn evaluate(&self, check: &RuleCheck, payload: &Value) -> Option<String> {
        match check {
            RuleCheck::RequiredField { field_path } => resolve_path(payload, field_path)
                .is_none()
                .then(|| format!("required field '{}' is missing or null", field_path)),

            RuleCheck::AllowedValues { field_path, allowed } => {
                match resolve_path(payload, field_path) {
                    None => Some(format!(
                        "field '{}' is missing; cannot check allowed values",
                        field_path
                    )),
                    Some(actual) if allowed.contains(actual) => None,
                    Some(actual) => Some(format!(
                        "field '{}' has value {} which is not in the allowed set",
                        field_path, actual
                    )),
                }
            }

            RuleCheck::ForbiddenPattern { field_path, pattern } => {
                resolve_path(payload, field_path)
                    .and_then(Value::as_str)
                    .filter(|s| s.contains(pattern.as_str()))
                    .map(|_| {
                        format!("field '{}' contains forbidden pattern '{}'", field_path, pattern)
                    })
            }

            // An unregistered name is itself a failure.
            RuleCheck::Custom { function_name } => {
                let functions = self.functions.read().unwrap_or_else(PoisonError::into_inner);
                match functions.get(function_name) {
                    Some(f) => f(payload),
                    None => Some(format!(
                        "no rule function registered under '{}'",
                        function_name
                    )),
                }
            }
        }
    }
}

impl Default for SchemaVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchemaVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<String> = self
            .schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        f.debug_struct("SchemaVerifier").field("types", &types).finish()
    }
}

/// Resolve a dotted path. Missing segments and JSON `null` yield `None`.
fn resolve_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
        .filter(|v| !v.is_null())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
