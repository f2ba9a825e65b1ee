//! # cadence-audit
//!
//! Bounded, append-only audit trail for the Cadence orchestration core.
//!
//! ## Overview
//!
//! Every entry carries a risk score in `[0, 1]`. Entries above the configured
//! threshold, or recording a failure, raise exactly one `audit.high_risk`
//! event. The trail can populate itself from bus traffic via `attach`, and
//! exports a checksummed snapshot for off-process archiving.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cadence_audit::{AuditTrail, AuditFilter};
//!
//! let trail = Arc::new(AuditTrail::new(config.audit.clone(), events.clone()));
//! trail.attach(&events);
//! trail.spawn_retention_sweeper();
//!
//! let recent = trail.query(&AuditFilter::for_user("u-1"));
//! let export = trail.export()?;
//! assert!(cadence_audit::verify_export(&export));
//! ```

pub mod digest;
pub mod report;
pub mod risk;
pub mod trail;

pub use digest::{checksum, verify_export};
pub use report::{AuditExport, AuditFilter, AuditQueryResult, AuditSummary, ComplianceReport};
pub use risk::ChangeKind;
pub use trail::AuditTrail;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use serde_json::{json, Value};

    use cadence_contracts::{
        audit::{AuditEntry, AuditOutcome},
        command::Command,
        event::EventKind,
    };
    use cadence_core::{config::AuditConfig, CommandBus, EventBus};

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn trail_with(config: AuditConfig) -> (Arc<AuditTrail>, EventBus) {
        let events = EventBus::new();
        (Arc::new(AuditTrail::new(config, events.clone())), events)
    }

    fn trail() -> (Arc<AuditTrail>, EventBus) {
        trail_with(AuditConfig::default())
    }

    // ── Logging and alerts ────────────────────────────────────────────────────

    #[tokio::test]
    async fn high_risk_entry_raises_exactly_one_event() {
        let (trail, events) = trail();
        let entry = AuditEntry::new("u-1", "DELETE_ARTIST", "artist", "a1").with_risk(0.9);
        let id = entry.id.clone();

        trail.log(entry).await;

        let alerts = events.history(Some(EventKind::AUDIT_HIGH_RISK));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].payload["id"], json!(id));
        assert_eq!(alerts[0].payload["riskScore"], json!(0.9));
    }

    #[tokio::test]
    async fn threshold_is_exclusive_and_failures_always_alert() {
        let (trail, events) = trail();

        trail.log(AuditEntry::new("u-1", "op", "r", "1").with_risk(0.7)).await;
        assert!(events.history(Some(EventKind::AUDIT_HIGH_RISK)).is_empty());

        trail.log(AuditEntry::new("u-1", "op", "r", "2").failed("boom")).await;
        assert_eq!(events.history(Some(EventKind::AUDIT_HIGH_RISK)).len(), 1);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let (trail, _events) = trail_with(AuditConfig {
            capacity: 3,
            ..AuditConfig::default()
        });

        for n in 0..5 {
            trail.log(AuditEntry::new("u", "op", "r", n.to_string())).await;
        }

        let export = trail.export().unwrap();
        let ids: Vec<&str> = export.entries.iter().map(|e| e.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3", "4"]);
    }

    #[tokio::test]
    async fn zero_capacity_keeps_nothing_but_still_alerts() {
        let (trail, events) = trail_with(AuditConfig {
            capacity: 0,
            ..AuditConfig::default()
        });

        trail.log(AuditEntry::new("u", "op", "r", "1")).await;
        trail.log(AuditEntry::new("u", "op", "r", "2").with_risk(0.95)).await;

        assert!(trail.is_empty());
        assert_eq!(events.history(Some(EventKind::AUDIT_HIGH_RISK)).len(), 1);
    }

    // ── Tracking helpers ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn data_change_risk_follows_operation_and_fields() {
        let (trail, events) = trail();

        let created = trail
            .track_data_change("u-1", ChangeKind::Create, "artist", "a1", None, Some(json!({ "name": "Kim" })))
            .await;
        assert_eq!(created.risk_score.value(), 0.1);
        assert_eq!(created.operation, "create");

        let updated = trail
            .track_data_change(
                "u-1",
                ChangeKind::Update,
                "user",
                "u-2",
                Some(json!({ "name": "Lee", "role": "viewer" })),
                Some(json!({ "name": "Lee", "role": "admin" })),
            )
            .await;
        assert!((updated.risk_score.value() - 0.5).abs() < 1e-9);
        assert_eq!(updated.metadata.extra["changedFields"], json!(["role"]));

        let deleted = trail
            .track_data_change("u-1", ChangeKind::Delete, "artist", "a1", Some(json!({ "name": "Kim" })), None)
            .await;
        assert!((deleted.risk_score.value() - 0.8).abs() < 1e-9);

        assert_eq!(events.history(Some(EventKind::AUDIT_HIGH_RISK)).len(), 1);
    }

    #[tokio::test]
    async fn denied_access_is_a_failure() {
        let (trail, _events) = trail();

        trail.track_access("u-1", "artist", "a1", true, None).await;
        let denied = trail
            .track_access("u-2", "artist", "a1", false, Some("missing role"))
            .await;

        assert_eq!(denied.result, AuditOutcome::Failure);
        assert_eq!(denied.error_message.as_deref(), Some("missing role"));
        assert_eq!(denied.risk_score.value(), 0.5);
        assert_eq!(trail.len(), 2);
    }

    #[test]
    fn change_kind_inferred_from_whole_words() {
        assert_eq!(ChangeKind::infer("DELETE_ARTIST"), Some(ChangeKind::Delete));
        assert_eq!(ChangeKind::infer("artist.update"), Some(ChangeKind::Update));
        assert_eq!(ChangeKind::infer("CREATE_ARTIST"), Some(ChangeKind::Create));
        assert_eq!(ChangeKind::infer("GET_ADDRESS"), None);
    }

    // ── Query and reporting ───────────────────────────────────────────────────

    #[tokio::test]
    async fn query_filters_sorts_and_paginates() {
        let (trail, _events) = trail();
        let base = Utc::now() - Duration::minutes(10);

        for n in 0..6 {
            let mut entry = AuditEntry::new(if n % 2 == 0 { "alice" } else { "bob" }, "UPDATE_ARTIST", "artist", n.to_string())
                .with_risk(if n == 4 { 0.95 } else { 0.3 });
            entry.timestamp = base + Duration::minutes(n);
            trail.log(entry).await;
        }

        let page = trail.query(&AuditFilter {
            user_id: Some("alice".into()),
            limit: Some(2),
            ..AuditFilter::default()
        });

        assert_eq!(page.total_count, 3);
        assert_eq!(page.high_risk_count, 1);
        let ids: Vec<&str> = page.entries.iter().map(|e| e.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["4", "2"]);
        assert_eq!(page.summary.by_user.get("alice"), Some(&3));
        assert_eq!(page.summary.by_outcome.get("success"), Some(&3));

        let offset = trail.query(&AuditFilter {
            user_id: Some("alice".into()),
            offset: 2,
            ..AuditFilter::default()
        });
        assert_eq!(offset.entries.len(), 1);
        assert_eq!(offset.entries[0].resource_id, "0");

        let risky = trail.query(&AuditFilter {
            min_risk: Some(0.9),
            ..AuditFilter::default()
        });
        assert_eq!(risky.total_count, 1);

        let window = trail.query(&AuditFilter {
            from: Some(base + Duration::minutes(3)),
            ..AuditFilter::default()
        });
        assert_eq!(window.total_count, 3);
    }

    #[tokio::test]
    async fn compliance_report_recommends_follow_up() {
        let (trail, _events) = trail();
        trail.log(AuditEntry::new("alice", "CREATE_ARTIST", "artist", "a1").with_risk(0.1)).await;
        trail.log(AuditEntry::new("bob", "DELETE_ARTIST", "artist", "a1").with_risk(0.8)).await;
        trail.log(AuditEntry::new("bob", "UPDATE_ARTIST", "artist", "a2").failed("conflict")).await;

        let report = trail.compliance_report(Duration::hours(1));

        assert_eq!(report.total_operations, 3);
        assert_eq!(report.failed_operations, 1);
        assert_eq!(report.high_risk_operations, 1);
        assert_eq!(report.unique_users, 2);
        assert!(report.failure_rate > 0.3);
        assert_eq!(report.high_risk_entries.len(), 1);
        assert!(report.recommendations.iter().any(|r| r.contains("Failure rate")));
        assert!(report.recommendations.iter().any(|r| r.contains("deletions")));
    }

    #[test]
    fn empty_report_flags_missing_capture() {
        let (trail, _events) = trail();
        let report = trail.compliance_report(Duration::days(1));
        assert_eq!(report.total_operations, 0);
        assert_eq!(report.failure_rate, 0.0);
        assert_eq!(report.recommendations.len(), 1);
    }

    // ── Export and retention ──────────────────────────────────────────────────

    #[tokio::test]
    async fn export_checksum_detects_tampering() {
        let (trail, _events) = trail();
        trail.log(AuditEntry::new("u-1", "CREATE_ARTIST", "artist", "a1")).await;
        trail.log(AuditEntry::new("u-1", "UPDATE_ARTIST", "artist", "a1")).await;

        let mut export = trail.export().unwrap();
        assert_eq!(export.entry_count, 2);
        assert_eq!(export.checksum.len(), 64);
        assert!(verify_export(&export));

        export.entries[0].user_id = "mallory".into();
        assert!(!verify_export(&export));

        let json: Value = serde_json::from_str(&trail.export_json().unwrap()).unwrap();
        assert_eq!(json["entryCount"], json!(2));
    }

    #[tokio::test]
    async fn sweep_removes_entries_past_retention() {
        let (trail, _events) = trail();
        let mut stale = AuditEntry::new("u-1", "op", "r", "old");
        stale.timestamp = Utc::now() - Duration::days(31);
        trail.log(stale).await;
        trail.log(AuditEntry::new("u-1", "op", "r", "new")).await;

        assert_eq!(trail.sweep_expired(), 1);
        assert_eq!(trail.export().unwrap().entries[0].resource_id, "new");
    }

    // ── Bus integration ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn attach_records_command_outcomes() {
        let (trail, events) = trail();
        let subscriptions = trail.attach(&events);
        assert_eq!(subscriptions.len(), 5);

        let bus = CommandBus::new(events.clone());
        bus.register_fn("DELETE_ARTIST", |_cmd| async { Ok(json!({ "deleted": true })) })
            .unwrap();

        bus.execute(Command::new("DELETE_ARTIST", json!({ "id": "a1" })).with_user("u-9"))
            .await;
        bus.execute(Command::new("MISSING", Value::Null)).await;

        let result = trail.query(&AuditFilter::default());
        assert_eq!(result.total_count, 2);
        assert_eq!(result.failure_count, 1);

        let deleted = trail.query(&AuditFilter::for_user("u-9"));
        assert_eq!(deleted.entries[0].operation, "DELETE_ARTIST");
        assert!((deleted.entries[0].risk_score.value() - 0.8).abs() < 1e-9);

        assert_eq!(events.history(Some(EventKind::AUDIT_HIGH_RISK)).len(), 2);
    }

    #[tokio::test]
    async fn attach_records_security_violations() {
        let (trail, events) = trail();
        trail.attach(&events);

        events
            .emit(
                EventKind::SECURITY_VIOLATION,
                json!({
                    "operation": "CREATE_ARTIST",
                    "identifier": "10.0.0.1",
                    "errors": ["rate limit exceeded"],
                    "riskScore": 1.0,
                }),
                "security",
            )
            .await;

        let result = trail.query(&AuditFilter::for_user("10.0.0.1"));
        assert_eq!(result.total_count, 1);
        assert_eq!(result.entries[0].resource, "security");
        assert_eq!(result.entries[0].risk_score.value(), 1.0);
        assert!(result.entries[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("rate limit exceeded"));
    }

    #[tokio::test]
    async fn dropped_trail_stops_recording() {
        let (trail, events) = trail();
        trail.attach(&events);
        drop(trail);

        events
            .emit(EventKind::COMMAND_EXECUTED, json!({ "type": "PING" }), "test")
            .await;
        assert!(events.history(Some(EventKind::AUDIT_HIGH_RISK)).is_empty());
    }
}
