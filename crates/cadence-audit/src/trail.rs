//! The in-memory audit trail.
//!
//! `AuditTrail` keeps entries in append order behind a `Mutex`. Capacity is
//! enforced on every append by dropping the oldest entry; age is enforced by
//! `sweep_expired`, run daily by `spawn_retention_sweeper`.
//!
//! Entries scoring above the configured threshold, or recording a failure,
//! are announced once as `audit.high_risk` at the moment they are logged.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use cadence_contracts::{
    audit::{AuditEntry, AuditOutcome, RiskScore},
    error::{CadenceError, CadenceResult},
    event::{Event, EventKind},
};
use cadence_core::{config::AuditConfig, traits::EventHandler, EventBus, SubscribeOptions, Subscription};

use crate::digest;
use crate::report::{AuditExport, AuditFilter, AuditQueryResult, AuditSummary, ComplianceReport};
use crate::risk::{self, ChangeKind};

const SOURCE: &str = "audit-trail";
const REPORT_HIGH_RISK_LIMIT: usize = 10;
const FAILURE_RATE_LIMIT: f64 = 0.1;

pub struct AuditTrail {
    entries: Mutex<VecDeque<AuditEntry>>,
    config: AuditConfig,
    events: EventBus,
}

impl AuditTrail {
    pub fn new(config: AuditConfig, events: EventBus) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            config,
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn is_high_risk(&self, entry: &AuditEntry) -> bool {
        entry.risk_score.value() > self.config.high_risk_threshold
    }

    /// Append `entry`, evicting the oldest entry when full. A capacity of
    /// zero keeps nothing but still raises high-risk alerts.
    pub async fn log(&self, entry: AuditEntry) {
        let alert = self.is_high_risk(&entry) || entry.result == AuditOutcome::Failure;
        if self.config.capacity > 0 {
            let mut entries = self.lock();
            while entries.len() >= self.config.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }

        debug!(
            entry_id = %entry.id,
            user_id = %entry.user_id,
            operation = %entry.operation,
            risk = entry.risk_score.value(),
            "audit entry recorded"
        );

        if alert {
            warn!(
                entry_id = %entry.id,
                operation = %entry.operation,
                resource = %entry.resource,
                risk = entry.risk_score.value(),
                outcome = ?entry.result,
                "high-risk audit entry"
            );
            self.events
                .emit(EventKind::AUDIT_HIGH_RISK, json!(entry), SOURCE)
                .await;
        }
    }

    /// Record a create, update or delete of `resource_id`, scored by
    /// `risk::data_change_risk`.
    pub async fn track_data_change(
        &self,
        user_id: &str,
        kind: ChangeKind,
        resource: &str,
        resource_id: &str,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) -> AuditEntry {
        let score = risk::data_change_risk(
            kind,
            old_value.as_ref(),
            new_value.as_ref(),
            &self.config.critical_fields,
        );
        let changed = risk::changed_fields(old_value.as_ref(), new_value.as_ref());
        let entry = AuditEntry::new(user_id, kind.as_str(), resource, resource_id)
            .with_values(old_value, new_value)
            .with_risk(score)
            .with_source("data-change")
            .with_meta("changedFields", json!(changed));
        self.log(entry.clone()).await;
        entry
    }

    /// Record an access attempt. Denials are logged as failures.
    pub async fn track_access(
        &self,
        user_id: &str,
        resource: &str,
        resource_id: &str,
        granted: bool,
        reason: Option<&str>,
    ) -> AuditEntry {
        let mut entry = AuditEntry::new(user_id, "access", resource, resource_id)
            .with_risk(risk::access_risk(granted))
            .with_source("access-control");
        if !granted {
            entry = entry.failed(reason.unwrap_or("access denied"));
        }
        self.log(entry.clone()).await;
        entry
    }

    /// Entries matching `filter`, newest first, with aggregates over every match.
    pub fn query(&self, filter: &AuditFilter) -> AuditQueryResult {
        let mut matched: Vec<AuditEntry> = self
            .lock()
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total_count = matched.len();
        let high_risk_count = matched.iter().filter(|e| self.is_high_risk(e)).count();
        let failure_count = matched
            .iter()
            .filter(|e| e.result == AuditOutcome::Failure)
            .count();
        let summary = AuditSummary::from_entries(&matched);

        let entries = matched
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();

        AuditQueryResult {
            entries,
            total_count,
            high_risk_count,
            failure_count,
            summary,
        }
    }

    /// Summarize the last `window` of activity.
    pub fn compliance_report(&self, window: chrono::Duration) -> ComplianceReport {
        let period_end = Utc::now();
        let period_start = period_end - window;
        let result = self.query(&AuditFilter {
            from: Some(period_start),
            to: Some(period_end),
            ..AuditFilter::default()
        });

        let total = result.total_count;
        let failure_rate = if total == 0 {
            0.0
        } else {
            result.failure_count as f64 / total as f64
        };
        let unique_users = result
            .entries
            .iter()
            .map(|e| e.user_id.as_str())
            .collect::<BTreeSet<_>>()
            .len();

        let mut high_risk_entries: Vec<AuditEntry> = result
            .entries
            .iter()
            .filter(|e| self.is_high_risk(e))
            .cloned()
            .collect();
        high_risk_entries.sort_by(|a, b| b.risk_score.value().total_cmp(&a.risk_score.value()));
        high_risk_entries.truncate(REPORT_HIGH_RISK_LIMIT);

        let mut recommendations = Vec::new();
        if total == 0 {
            recommendations.push("No audited activity in this period; confirm audit capture is attached.".to_string());
        }
        if failure_rate > FAILURE_RATE_LIMIT {
            recommendations.push(format!(
                "Failure rate is {:.1}%; investigate the failing operations.",
                failure_rate * 100.0
            ));
        }
        if result.high_risk_count > 0 {
            recommendations.push(format!(
                "{} high-risk operations recorded; review them with their owners.",
                result.high_risk_count
            ));
        }
        let deletes = result
            .entries
            .iter()
            .filter(|e| ChangeKind::infer(&e.operation) == Some(ChangeKind::Delete))
            .count();
        if deletes > 0 {
            recommendations.push(format!(
                "{} deletions recorded; verify each was authorised.",
                deletes
            ));
        }

        info!(total, failure_rate, high_risk = result.high_risk_count, "compliance report generated");

        ComplianceReport {
            generated_at: period_end,
            period_start,
            period_end,
            total_operations: total,
            failed_operations: result.failure_count,
            high_risk_operations: result.high_risk_count,
            unique_users,
            failure_rate,
            summary: result.summary,
            high_risk_entries,
            recommendations,
        }
    }

    /// Snapshot every entry, oldest first, with a checksum.
    pub fn export(&self) -> CadenceResult<AuditExport> {
        let entries: Vec<AuditEntry> = self.lock().iter().cloned().collect();
        Ok(AuditExport {
            export_time: Utc::now(),
            entry_count: entries.len(),
            checksum: digest::checksum(&entries)?,
            entries,
        })
    }

    pub fn export_json(&self) -> CadenceResult<String> {
        serde_json::to_string_pretty(&self.export()?).map_err(CadenceError::from)
    }

    /// Drop entries older than the retention period. Returns how many.
    pub fn sweep_expired(&self) -> usize {
        let cutoff = Utc::now() - self.config.retention();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|e| e.timestamp >= cutoff);
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, retention_days = self.config.retention_days, "expired audit entries removed");
        }
        removed
    }

    /// Run `sweep_expired` on the configured interval until the trail is dropped.
    pub fn spawn_retention_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let trail = Arc::downgrade(self);
        let every = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(trail) = trail.upgrade() else {
                    break;
                };
                trail.sweep_expired();
            }
        })
    }

    /// Record entries automatically from bus traffic.
    ///
    /// Subscribes to command outcomes, agent task outcomes and security
    /// violations. The subscriptions hold only a weak reference to the trail.
    pub fn attach(self: &Arc<Self>, bus: &EventBus) -> Vec<Subscription> {
        let mappings: [(&str, fn(&Event) -> AuditEntry); 5] = [
            (EventKind::COMMAND_EXECUTED, command_entry),
            (EventKind::COMMAND_FAILED, command_entry),
            (EventKind::AGENT_TASK_COMPLETED, agent_entry),
            (EventKind::AGENT_TASK_FAILED, agent_entry),
            (EventKind::SECURITY_VIOLATION, violation_entry),
        ];

        mappings
            .into_iter()
            .map(|(kind, map)| {
                let sink = AuditSink {
                    trail: Arc::downgrade(self),
                    map,
                };
                bus.subscribe(kind, Arc::new(sink), SubscribeOptions::default())
            })
            .collect()
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("entries", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

struct AuditSink {
    trail: Weak<AuditTrail>,
    map: fn(&Event) -> AuditEntry,
}

#[async_trait]
impl EventHandler for AuditSink {
    async fn handle(&self, event: &Event) -> CadenceResult<()> {
        if let Some(trail) = self.trail.upgrade() {
            trail.log((self.map)(event)).await;
        }
        Ok(())
    }
}

fn text<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

fn command_entry(event: &Event) -> AuditEntry {
    let p = &event.payload;
    let operation = text(p, "type").unwrap_or("unknown");
    let resource_id = text(p, "correlationId")
        .map(String::from)
        .unwrap_or_else(|| event.id.0.to_string());

    let entry = AuditEntry::new(
        text(p, "userId").unwrap_or("system"),
        operation,
        "command",
        resource_id,
    )
    .with_source(event.source.clone())
    .with_risk(risk::operation_risk(operation))
    .with_values(None, p.get("payload").cloned())
    .with_meta("executionTime", p.get("executionTime").cloned().unwrap_or(Value::Null));

    match text(p, "error") {
        Some(error) if event.event_type == EventKind::COMMAND_FAILED => entry.failed(error),
        _ => entry,
    }
}

fn agent_entry(event: &Event) -> AuditEntry {
    let p = &event.payload;
    let entry = AuditEntry::new(
        "system",
        text(p, "type").unwrap_or("agent.task"),
        "agent_task",
        text(p, "taskId").unwrap_or("unknown"),
    )
    .with_source(event.source.clone())
    .with_values(None, p.get("output").filter(|v| !v.is_null()).cloned())
    .with_meta("retryCount", p.get("retryCount").cloned().unwrap_or(Value::Null));

    if event.event_type == EventKind::AGENT_TASK_FAILED {
        entry.failed(text(p, "error").unwrap_or("task failed"))
    } else {
        entry
    }
}

fn violation_entry(event: &Event) -> AuditEntry {
    let p = &event.payload;
    let user = text(p, "userId").or_else(|| text(p, "identifier")).unwrap_or("anonymous");
    let errors: Vec<&str> = p
        .get("errors")
        .and_then(Value::as_array)
        .map(|errs| errs.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    let score = p
        .get("riskScore")
        .and_then(Value::as_f64)
        .map_or(RiskScore::MAX, RiskScore::new);

    let entry = AuditEntry::new(user, text(p, "operation").unwrap_or("unknown"), "security", user)
        .with_source(event.source.clone())
        .with_risk(score);

    if errors.is_empty() {
        entry.with_meta("warnings", p.get("warnings").cloned().unwrap_or(Value::Null))
    } else {
        entry.failed(format!("security violation: {}", errors.join("; ")))
    }
}
