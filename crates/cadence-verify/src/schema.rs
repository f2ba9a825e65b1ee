//! Payload schema and report types.
//!
//! A `PayloadSchema` is registered per command or query type. It pairs a
//! JSON Schema document with field rules that JSON Schema cannot express
//! conveniently.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rule id reported for structural JSON Schema failures.
pub const JSON_SCHEMA_RULE: &str = "json-schema";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PayloadSchema {
    /// A JSON Schema document. `null` means no structural constraint.
    #[serde(default)]
    pub json_schema: Value,
    #[serde(default)]
    pub rules: Vec<PayloadRule>,
}

impl PayloadSchema {
    pub fn json(json_schema: Value) -> Self {
        Self {
            json_schema,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule_id: impl Into<String>, check: RuleCheck) -> Self {
        self.rules.push(PayloadRule {
            rule_id: rule_id.into(),
            check,
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadRule {
    /// Referenced in failure reports.
    pub rule_id: String,
    pub check: RuleCheck,
}

/// Field paths are dot-separated, e.g. `"artist.name"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCheck {
    /// The field must be present and non-null.
    RequiredField { field_path: String },

    /// The field must equal one of `allowed`.
    AllowedValues { field_path: String, allowed: Vec<Value> },

    /// A string field must not contain `pattern`. Absent and non-string
    /// fields pass.
    ForbiddenPattern { field_path: String, pattern: String },

    /// Delegate to a function registered with `SchemaVerifier::register_fn`.
    Custom { function_name: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    /// Every failure found. Empty on pass.
    pub failures: Vec<VerificationFailure>,
}

impl VerificationReport {
    pub fn pass() -> Self {
        Self {
            passed: true,
            failures: Vec::new(),
        }
    }

    pub(crate) fn from_failures(failures: Vec<VerificationFailure>) -> Self {
        Self {
            passed: failures.is_empty(),
            failures,
        }
    }

    /// All failure messages joined with `"; "`.
    pub fn summary(&self) -> String {
        self.failures
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationFailure {
    pub rule_id: String,
    pub message: String,
}
