//! Scenario 4: Security validation
//!
//!   1. a client calls `validate_operation` 101 times in one window
//!      → the 101st call is rejected with risk 1.0
//!   2. a script injection in an artist bio → blocked at the command bus
//!   3. every rejection is visible as a `security.violation` event

use serde_json::json;

use cadence_contracts::{
    command::Command,
    error::CadenceResult,
    event::EventKind,
    security::SecurityContext,
};

use crate::handlers::CreateArtist;
use crate::runtime::CmsRuntime;

use super::{as_editor, verdict};

pub async fn run_scenario(runtime: &CmsRuntime) -> CadenceResult<()> {
    println!("=== Scenario 4: Security Validation ===");
    println!();

    let security = runtime.security();
    let limit = security.config().rate_limit.max_requests;
    let client = SecurityContext::new("crawler-7");

    let mut last = None;
    for _ in 0..=limit {
        last = Some(
            security
                .validate_operation("LIST_ARTISTS", &json!({}), &client)
                .await,
        );
    }
    if let Some(outcome) = last {
        println!(
            "  Request #{} from crawler-7:   isValid={}, riskScore={}",
            limit + 1,
            outcome.is_valid,
            outcome.risk_score.value()
        );
        for error in &outcome.errors {
            println!("    reason: {}", error);
        }
    }

    let injected = runtime
        .registry()
        .commands()
        .execute(as_editor(Command::typed(&CreateArtist {
            name: "Totally Real Band".to_string(),
            genres: vec![],
            bio: "<script>document.location='https://example.invalid'</script>".to_string(),
        })?))
        .await;
    println!("  CREATE_ARTIST with <script>:  {}", verdict(injected.success));
    if let Some(error) = &injected.error {
        println!("    reason: {}", error);
    }

    let sql = runtime
        .registry()
        .commands()
        .execute(as_editor(Command::new(
            "UPDATE_ARTIST",
            json!({ "id": "artist-seed-1", "bio": "x'; DROP TABLE artists; --" }),
        )))
        .await;
    println!("  UPDATE_ARTIST with SQL:       {}", verdict(sql.success));

    let violations = runtime
        .registry()
        .events()
        .history(Some(EventKind::SECURITY_VIOLATION));
    println!();
    println!("  security.violation events so far: {}", violations.len());
    println!();
    println!("  Scenario 4 complete.");
    println!();

    Ok(())
}
