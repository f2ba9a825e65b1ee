//! Scenario 3: Index rebuild on the agent pool
//!
//! Queues one `index-artist` task per stored artist and a `publish-index`
//! task that depends on all of them. The publish task only runs once every
//! index task has succeeded. The finished index is then searched through the
//! query bus.

use std::time::Duration;

use cadence_contracts::{error::CadenceResult, query::Query};

use crate::catalogue::Artist;
use crate::handlers::SearchArtists;
use crate::runtime::CmsRuntime;

const PUBLISH_DEADLINE: Duration = Duration::from_secs(10);

pub async fn run_scenario(runtime: &CmsRuntime) -> CadenceResult<()> {
    println!("=== Scenario 3: Index Rebuild on the Agent Pool ===");
    println!();

    let publish = runtime.index_catalogue()?;
    let queued = runtime.pool().status();
    println!(
        "  Queued: {} task(s) for {} agent(s) {:?}",
        queued.queue_size + queued.in_flight,
        queued.total_agents,
        queued.agents_by_type
    );

    let waited = tokio::time::timeout(PUBLISH_DEADLINE, runtime.pool().wait_for_result(&publish)).await;
    match waited.ok().flatten() {
        Some(result) if result.success => {
            let output = result.output.unwrap_or_default();
            println!(
                "  publish-index:  OK after {} dependencies, {} term(s) indexed",
                output["dependencies"], output["terms"]
            );
        }
        Some(result) => {
            println!("  publish-index:  FAILED ({})", result.error.unwrap_or_default());
        }
        None => println!("  publish-index:  did not finish within {:?}", PUBLISH_DEADLINE),
    }

    let status = runtime.pool().status();
    println!(
        "  Pool: {} completed ({} ok, {} failed), {} still queued",
        status.completed_tasks, status.successful_tasks, status.failed_tasks, status.queue_size
    );
    println!();

    for text in ["electronic", "drum machines", "opera"] {
        let result = runtime
            .registry()
            .queries()
            .execute(Query::typed(&SearchArtists {
                text: text.to_string(),
            })?)
            .await;
        let names: Vec<String> = result
            .data_as::<Vec<Artist>>()?
            .unwrap_or_default()
            .into_iter()
            .map(|a| a.name)
            .collect();
        println!("  search {:<16} → {:?}", format!("\"{}\"", text), names);
    }

    println!();
    println!("  Scenario 3 complete.");
    println!();

    Ok(())
}
