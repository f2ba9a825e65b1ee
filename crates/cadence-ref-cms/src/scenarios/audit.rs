//! Scenario 5: Audit and monitoring
//!
//! Reads back what the earlier scenarios left behind: the compliance report
//! over the last hour, high-risk entries, a checksummed export, and the
//! performance monitor's view of bus latency.

use cadence_audit::{verify_export, AuditFilter};
use cadence_contracts::error::CadenceResult;

use crate::runtime::CmsRuntime;

pub async fn run_scenario(runtime: &CmsRuntime) -> CadenceResult<()> {
    println!("=== Scenario 5: Audit and Monitoring ===");
    println!();

    let audit = runtime.audit();
    let report = audit.compliance_report(chrono::Duration::hours(1));
    println!("  Compliance report (last hour)");
    println!("    operations:       {}", report.total_operations);
    println!("    failed:           {}", report.failed_operations);
    println!("    high risk:        {}", report.high_risk_operations);
    println!("    unique users:     {}", report.unique_users);
    println!("    failure rate:     {:.1}%", report.failure_rate * 100.0);
    for recommendation in &report.recommendations {
        println!("    recommendation:   {}", recommendation);
    }
    println!();

    let risky = audit.query(&AuditFilter {
        min_risk: Some(audit.config().high_risk_threshold),
        limit: Some(5),
        ..AuditFilter::default()
    });
    println!("  Highest-risk entries ({} total)", risky.total_count);
    for entry in &risky.entries {
        println!(
            "    {:.2}  {:<14} {:<10} by {}",
            entry.risk_score.value(),
            entry.operation,
            entry.resource,
            entry.user_id
        );
    }
    println!();

    let export = audit.export()?;
    println!(
        "  Export: {} entries, checksum {}…  integrity {}",
        export.entry_count,
        &export.checksum[..12.min(export.checksum.len())],
        if verify_export(&export) { "VERIFIED" } else { "FAILED" }
    );
    println!();

    let monitor = runtime.monitor();
    for name in ["command.duration", "query.duration", "agent.task.duration"] {
        if let Some(stats) = monitor.metric_stats(name, None) {
            println!(
                "  {:<20} n={:<4} avg={:.3}ms p95={:.3}ms max={:.3}ms",
                name, stats.count, stats.avg, stats.p95, stats.max
            );
        }
    }
    let status = monitor.system_status();
    println!(
        "  System status: {:?} ({} warning, {} critical alert(s))",
        status.status, status.warning_alerts, status.critical_alerts
    );
    println!();
    println!("  Scenario 5 complete.");
    println!();

    Ok(())
}
