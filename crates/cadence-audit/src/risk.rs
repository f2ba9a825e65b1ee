//! Risk heuristics for audited operations.
//!
//! Scores are additive and clamped to `[0, 1]` by `RiskScore`:
//!
//! | operation | base |
//! |-----------|------|
//! | delete    | 0.8  |
//! | update    | 0.3  |
//! | create    | 0.1  |
//!
//! Touching a critical field adds 0.2. A denied access scores 0.5.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cadence_contracts::audit::RiskScore;

const CRITICAL_FIELD_BONUS: f64 = 0.2;
const DENIED_ACCESS_RISK: f64 = 0.5;

/// The kind of data change being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }

    fn base_risk(self) -> f64 {
        match self {
            ChangeKind::Create => 0.1,
            ChangeKind::Update => 0.3,
            ChangeKind::Delete => 0.8,
        }
    }

    /// Infer the change kind from an operation name such as `DELETE_ARTIST`.
    pub fn infer(operation: &str) -> Option<Self> {
        let upper = operation.to_ascii_uppercase();
        let words: Vec<&str> = upper.split(|c: char| !c.is_ascii_alphanumeric()).collect();
        let has = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

        if has(&["DELETE", "REMOVE"]) {
            Some(ChangeKind::Delete)
        } else if has(&["UPDATE", "EDIT"]) {
            Some(ChangeKind::Update)
        } else if has(&["CREATE", "ADD"]) {
            Some(ChangeKind::Create)
        } else {
            None
        }
    }
}

/// Score a change from `old` to `new`.
pub fn data_change_risk(
    kind: ChangeKind,
    old: Option<&Value>,
    new: Option<&Value>,
    critical_fields: &[String],
) -> RiskScore {
    let touched = changed_fields(old, new);
    let critical = touched
        .iter()
        .any(|field| critical_fields.iter().any(|c| c.eq_ignore_ascii_case(field)));

    let mut score = kind.base_risk();
    if critical {
        score += CRITICAL_FIELD_BONUS;
    }
    RiskScore::new(score)
}

/// Score an operation known only by name.
pub fn operation_risk(operation: &str) -> RiskScore {
    ChangeKind::infer(operation).map_or(RiskScore::ZERO, |kind| RiskScore::new(kind.base_risk()))
}

pub fn access_risk(granted: bool) -> RiskScore {
    if granted {
        RiskScore::ZERO
    } else {
        RiskScore::new(DENIED_ACCESS_RISK)
    }
}

/// Top-level object keys whose values differ between `old` and `new`.
///
/// A key present on only one side counts as changed.
pub fn changed_fields(old: Option<&Value>, new: Option<&Value>) -> Vec<String> {
    let empty = serde_json::Map::new();
    let old = old.and_then(Value::as_object).unwrap_or(&empty);
    let new = new.and_then(Value::as_object).unwrap_or(&empty);

    let mut fields: Vec<String> = old
        .keys()
        .chain(new.keys())
        .filter(|key| old.get(*key) != new.get(*key))
        .cloned()
        .collect();
    fields.sort();
    fields.dedup();
    fields
}
