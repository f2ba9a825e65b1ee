//! Query filters and the read-side views of the audit trail.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_contracts::audit::AuditEntry;

/// Criteria for `AuditTrail::query`. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    pub user_id: Option<String>,
    pub operation: Option<String>,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Keep entries scoring at least this much.
    pub min_risk: Option<f64>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
}

impl AuditFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.user_id.as_ref().map_or(true, |u| &entry.user_id == u)
            && self.operation.as_ref().map_or(true, |o| &entry.operation == o)
            && self.resource.as_ref().map_or(true, |r| &entry.resource == r)
            && self.resource_id.as_ref().map_or(true, |r| &entry.resource_id == r)
            && self.from.map_or(true, |from| entry.timestamp >= from)
            && self.to.map_or(true, |to| entry.timestamp <= to)
            && self.min_risk.map_or(true, |min| entry.risk_score.value() >= min)
    }
}

/// Counts over a set of entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub by_operation: BTreeMap<String, usize>,
    pub by_resource: BTreeMap<String, usize>,
    pub by_user: BTreeMap<String, usize>,
    pub by_outcome: BTreeMap<String, usize>,
    pub average_risk: f64,
}

impl AuditSummary {
    pub(crate) fn from_entries<'a>(entries: impl IntoIterator<Item = &'a AuditEntry>) -> Self {
        let mut summary = Self::default();
        let mut total_risk = 0.0;
        let mut count = 0usize;

        for entry in entries {
            *summary.by_operation.entry(entry.operation.clone()).or_default() += 1;
            *summary.by_resource.entry(entry.resource.clone()).or_default() += 1;
            *summary.by_user.entry(entry.user_id.clone()).or_default() += 1;
            let outcome = serde_json::to_value(entry.result)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_default();
            *summary.by_outcome.entry(outcome).or_default() += 1;
            total_risk += entry.risk_score.value();
            count += 1;
        }

        if count > 0 {
            summary.average_risk = total_risk / count as f64;
        }
        summary
    }
}

/// The page of entries matched by a filter plus aggregates over every match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQueryResult {
    /// Newest first, after `offset` and `limit`.
    pub entries: Vec<AuditEntry>,
    pub total_count: usize,
    pub high_risk_count: usize,
    pub failure_count: usize,
    pub summary: AuditSummary,
}

/// Activity over a time window with follow-up suggestions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub generated_at: DateTime<Utc>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_operations: usize,
    pub failed_operations: usize,
    pub high_risk_operations: usize,
    pub unique_users: usize,
    pub failure_rate: f64,
    pub summary: AuditSummary,
    /// Up to ten of the riskiest entries in the window, riskiest first.
    pub high_risk_entries: Vec<AuditEntry>,
    pub recommendations: Vec<String>,
}

/// A self-checking snapshot of the trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditExport {
    pub export_time: DateTime<Utc>,
    pub entry_count: usize,
    pub entries: Vec<AuditEntry>,
    /// SHA-256 (hex) of the serialized `entries`.
    pub checksum: String,
}
