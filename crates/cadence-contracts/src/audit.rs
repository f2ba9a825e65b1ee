//! Audit entry types.
//!
//! An `AuditEntry` is written once and never modified. The trail stores
//! entries newest-last and evicts by capacity and age.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A heuristic severity in `[0, 1]`.
///
/// Construction clamps out-of-range and non-finite input, so a stored score
/// is always a valid probability-like value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RiskScore(f64);

impl RiskScore {
    pub const ZERO: RiskScore = RiskScore(0.0);
    pub const MAX: RiskScore = RiskScore(1.0);

    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 1.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// The larger of two scores.
    pub fn max(self, other: RiskScore) -> RiskScore {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }
}

impl From<f64> for RiskScore {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

/// How the audited operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    Partial,
}

/// Where an entry came from, plus free-form context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditMetadata {
    /// Component or collaborator that produced the entry.
    pub source: String,
    pub version: u32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for AuditMetadata {
    fn default() -> Self {
        Self {
            source: "application".to_string(),
            version: 1,
            extra: serde_json::Map::new(),
        }
    }
}

/// One append-only record in the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: String,
    /// What was done, e.g. `"CREATE_ARTIST"` or `"delete"`.
    pub operation: String,
    /// The kind of thing it was done to, e.g. `"artist"`.
    pub resource: String,
    pub resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    pub metadata: AuditMetadata,
    pub result: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub risk_score: RiskScore,
}

impl AuditEntry {
    /// A successful, zero-risk entry stamped now with a fresh ID.
    pub fn new(
        user_id: impl Into<String>,
        operation: impl Into<String>,
        resource: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            user_id: user_id.into(),
            operation: operation.into(),
            resource: resource.into(),
            resource_id: resource_id.into(),
            old_value: None,
            new_value: None,
            metadata: AuditMetadata::default(),
            result: AuditOutcome::Success,
            error_message: None,
            risk_score: RiskScore::ZERO,
        }
    }

    pub fn with_risk(mut self, score: impl Into<RiskScore>) -> Self {
        self.risk_score = score.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = source.into();
        self
    }

    pub fn with_values(
        mut self,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    /// Mark the entry failed with the given message.
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.result = AuditOutcome::Failure;
        self.error_message = Some(message.into());
        self
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.result = outcome;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.extra.insert(key.into(), value);
        self
    }
}
