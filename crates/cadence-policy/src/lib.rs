//! # cadence-policy
//!
//! Security validation for the Cadence orchestration core, configured from
//! TOML.
//!
//! ## Overview
//!
//! `SecurityMiddleware` merges three validators into one `ValidationOutcome`:
//!
//! - **Rate limiting**: a sliding window per caller identifier.
//! - **Permissions**: operation → permission rules, granted directly or
//!   through roles. `"*"` grants everything.
//! - **Payload inspection**: string length, nesting depth, and regex
//!   patterns for script and SQL injection.
//!
//! Invalid or high-risk outcomes are emitted as `security.violation`.
//! `SecurityGate` plugs the whole pipeline into a `CommandBus`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cadence_policy::{SecurityGate, SecurityMiddleware};
//!
//! let security = Arc::new(SecurityMiddleware::from_file(path, events.clone())?);
//! commands.use_middleware(Arc::new(SecurityGate::new(security.clone())));
//!
//! let outcome = security
//!     .validate_operation("CREATE_ARTIST", &payload, &SecurityContext::for_user("u-1"))
//!     .await;
//! ```

pub mod config;
pub mod gate;
pub mod middleware;
pub mod validators;

pub use config::{PayloadConfig, PermissionRule, RateLimitConfig, SecurityConfig};
pub use gate::SecurityGate;
pub use middleware::SecurityMiddleware;
pub use validators::{check_permissions, PayloadInspector, RateLimiter};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::{json, Value};

    use cadence_contracts::{
        command::Command,
        error::CadenceError,
        event::EventKind,
        security::SecurityContext,
    };
    use cadence_core::{CommandBus, EventBus};

    use super::*;

    const RULES: &str = r#"
        [[permissions]]
        operation = "DELETE_ARTIST"
        permission = "artist:delete"

        [roles]
        editor = ["artist:create", "artist:update"]
        admin = ["*"]
    "#;

    fn security(toml: &str) -> (SecurityMiddleware, EventBus) {
        let events = EventBus::new();
        let security = SecurityMiddleware::from_toml_str(toml, events.clone()).unwrap();
        (security, events)
    }

    fn nested(levels: usize) -> Value {
        (0..levels).fold(json!("leaf"), |inner, _| json!({ "n": inner }))
    }

    // ── Rate limiting ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn hundred_and_first_request_is_rejected() {
        let (security, events) = security("");
        let ctx = SecurityContext::new("client-1");

        for _ in 0..100 {
            let outcome = security.validate_operation("PING", &json!({}), &ctx).await;
            assert!(outcome.is_valid);
        }

        let outcome = security.validate_operation("PING", &json!({}), &ctx).await;
        assert!(!outcome.is_valid);
        assert_eq!(outcome.risk_score.value(), 1.0);
        assert!(outcome.errors[0].contains("rate limit exceeded"));

        let violations = events.history(Some(EventKind::SECURITY_VIOLATION));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].payload["identifier"], "client-1");

        // Other identifiers have their own window.
        let other = SecurityContext::new("client-2");
        assert!(security.validate_operation("PING", &json!({}), &other).await.is_valid);
    }

    #[tokio::test]
    async fn approaching_the_limit_warns() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            window_secs: 60,
            max_requests: 10,
        });

        for _ in 0..8 {
            assert!(limiter.check("c").warnings.is_empty());
        }
        let ninth = limiter.check("c");
        assert!(ninth.is_valid);
        assert_eq!(ninth.warnings.len(), 1);
        assert_eq!(ninth.risk_score.value(), 0.3);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_forward() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            window_secs: 60,
            max_requests: 2,
        });

        assert!(limiter.check("c").is_valid);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.check("c").is_valid);
        assert!(!limiter.check("c").is_valid);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.check("c").is_valid);
        assert!(!limiter.check("c").is_valid);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.prune(), 1);
        assert!(limiter.check("c").is_valid);
    }

    // ── Permissions ──────────────────────────────────────────────────────────

    #[test]
    fn permissions_come_from_grants_and_roles() {
        let config = SecurityConfig::from_toml_str(RULES).unwrap();

        let anonymous = SecurityContext::new("anon");
        let denied = check_permissions(&config, "DELETE_ARTIST", &anonymous);
        assert!(!denied.is_valid);
        assert_eq!(denied.risk_score.value(), 0.8);
        assert_eq!(
            denied.errors,
            vec!["missing permission 'artist:delete' for operation 'DELETE_ARTIST'"]
        );

        let direct = SecurityContext::for_user("u-1").with_permission("artist:delete");
        assert!(check_permissions(&config, "DELETE_ARTIST", &direct).is_valid);

        let editor = SecurityContext::for_user("u-2").with_role("editor");
        assert!(!check_permissions(&config, "DELETE_ARTIST", &editor).is_valid);

        let admin = SecurityContext::for_user("u-3").with_role("admin");
        assert!(check_permissions(&config, "DELETE_ARTIST", &admin).is_valid);

        // No rule, no requirement.
        assert!(check_permissions(&config, "GET_ARTIST", &anonymous).is_valid);
    }

    #[test]
    fn wildcard_rule_applies_to_every_operation() {
        let config = SecurityConfig::from_toml_str(
            r#"
            [[permissions]]
            operation = "*"
            permission = "api:access"
            "#,
        )
        .unwrap();

        assert_eq!(config.required_permissions("ANYTHING"), vec!["api:access"]);
        let ctx = SecurityContext::new("c");
        assert!(!check_permissions(&config, "ANYTHING", &ctx).is_valid);
        let ctx = ctx.with_permission("api:access");
        assert!(check_permissions(&config, "ANYTHING", &ctx).is_valid);
    }

    // ── Payload inspection ───────────────────────────────────────────────────

    #[test]
    fn script_and_sql_payloads_are_flagged() {
        let inspector = PayloadInspector::new(&PayloadConfig::default()).unwrap();

        let clean = inspector.inspect(&json!({ "name": "Nina Simone", "genres": ["jazz", "soul"] }));
        assert!(clean.is_valid);
        assert_eq!(clean.risk_score.value(), 0.0);

        let script = inspector.inspect(&json!({ "bio": "<script>alert(1)</script>" }));
        assert!(!script.is_valid);
        assert_eq!(script.risk_score.value(), 0.9);
        assert_eq!(script.errors, vec!["potentially dangerous content in $.bio"]);

        let sql = inspector.inspect(&json!({ "tags": ["ok", "1' OR 1=1"] }));
        assert!(!sql.is_valid);
        assert_eq!(sql.errors, vec!["possible SQL injection in $.tags[1]"]);

        let drop = inspector.inspect(&json!({ "name": "x; DROP TABLE artists" }));
        assert!(!drop.is_valid);

        let key = inspector.inspect(&json!({ "<script>": 1 }));
        assert!(!key.is_valid);
    }

    #[test]
    fn ordinary_words_are_not_injection() {
        let inspector = PayloadInspector::new(&PayloadConfig::default()).unwrap();
        let outcome = inspector.inspect(&json!({
            "bio": "Selected works, from the union of two bands, and a drop in tempo",
            "note": "online only",
        }));
        assert!(outcome.is_valid, "{:?}", outcome.errors);
    }

    #[test]
    fn oversized_and_deep_payloads_are_rejected() {
        let inspector = PayloadInspector::new(&PayloadConfig {
            max_string_length: 5,
            ..PayloadConfig::default()
        })
        .unwrap();

        let long = inspector.inspect(&json!({ "name": "abcdef" }));
        assert!(!long.is_valid);
        assert_eq!(long.risk_score.value(), 0.4);

        let inspector = PayloadInspector::new(&PayloadConfig::default()).unwrap();
        assert!(inspector.inspect(&nested(10)).is_valid);
        let deep = inspector.inspect(&nested(11));
        assert!(!deep.is_valid);
        assert_eq!(deep.risk_score.value(), 0.5);
        assert!(deep.errors[0].starts_with("payload nesting exceeds depth 10"));
    }

    // ── Pipeline ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn outcomes_merge_across_validators() {
        let (security, events) = security(RULES);
        let ctx = SecurityContext::for_user("u-1");

        let outcome = security
            .validate_operation("DELETE_ARTIST", &json!({ "id": "<script>" }), &ctx)
            .await;
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.risk_score.value(), 0.9);

        let event = &events.history(Some(EventKind::SECURITY_VIOLATION))[0];
        assert_eq!(event.payload["operation"], "DELETE_ARTIST");
        assert_eq!(event.payload["userId"], "u-1");
        assert_eq!(event.payload["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn valid_low_risk_operations_raise_nothing() {
        let (security, events) = security(RULES);
        let ctx = SecurityContext::for_user("u-1").with_role("editor");

        let outcome = security
            .validate_operation("CREATE_ARTIST", &json!({ "name": "Miles Davis" }), &ctx)
            .await;
        assert!(outcome.is_valid);
        assert!(events.history(Some(EventKind::SECURITY_VIOLATION)).is_empty());
    }

    // ── Configuration ────────────────────────────────────────────────────────

    #[test]
    fn config_parses_with_defaults() {
        let config = SecurityConfig::from_toml_str(
            r#"
            [rate_limit]
            max_requests = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.rate_limit.max_requests, 5);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.payload.max_depth, 10);
        assert_eq!(config.violation_risk_threshold, 0.7);

        assert_eq!(SecurityConfig::from_toml_str("").unwrap(), SecurityConfig::default());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let zero = SecurityConfig::from_toml_str("[rate_limit]\nmax_requests = 0");
        assert!(matches!(zero, Err(CadenceError::ConfigError { .. })));

        let malformed = SecurityConfig::from_toml_str("rate_limit = [");
        assert!(matches!(malformed, Err(CadenceError::ConfigError { .. })));

        let bad_regex = SecurityMiddleware::from_toml_str(
            "[payload]\nsql_patterns = [\"(unclosed\"]",
            EventBus::new(),
        );
        match bad_regex {
            Err(CadenceError::ConfigError { reason }) => assert!(reason.contains("(unclosed")),
            other => panic!("expected ConfigError, got {:?}", other.map(|_| ())),
        }
    }

    // ── Command bus gate ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn gate_blocks_unauthorised_commands() {
        let (security, events) = security(RULES);
        let bus = CommandBus::new(events.clone());
        bus.use_middleware(Arc::new(SecurityGate::new(Arc::new(security))));
        bus.register_fn("DELETE_ARTIST", |cmd| async move {
            Ok(cmd.metadata.extra.get("securityRisk").cloned().unwrap_or(Value::Null))
        })
        .unwrap();

        let denied = bus
            .execute(Command::new("DELETE_ARTIST", json!({ "id": "a-1" })).with_user("u-1"))
            .await;
        assert!(!denied.success);
        let error = denied.error.unwrap();
        assert!(error.contains("security"));
        assert!(error.contains("missing permission 'artist:delete'"));

        let allowed = bus
            .execute(
                Command::new("DELETE_ARTIST", json!({ "id": "a-1" }))
                    .with_user("u-2")
                    .with_meta("roles", json!(["admin"])),
            )
            .await;
        assert!(allowed.success);
        assert_eq!(allowed.data, Some(json!(0.0)));

        assert_eq!(events.history(Some(EventKind::SECURITY_VIOLATION)).len(), 1);
    }

    #[tokio::test]
    async fn custom_resolver_supplies_the_context() {
        let (security, events) = security(RULES);
        let bus = CommandBus::new(events);
        bus.use_middleware(Arc::new(SecurityGate::with_resolver(
            Arc::new(security),
            |_cmd| SecurityContext::new("service").with_permission("*"),
        )));
        bus.register_fn("DELETE_ARTIST", |_cmd| async { Ok(Value::Null) })
            .unwrap();

        let result = bus.execute(Command::new("DELETE_ARTIST", json!({}))).await;
        assert!(result.success);
    }
}
