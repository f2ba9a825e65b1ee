//! Scenario 2: Cached artist queries
//!
//!   1. LIST_ARTISTS twice with a 1s TTL → second answer comes from cache
//!   2. an artist write invalidates every cached artist query
//!   3. LIST_ARTISTS again → re-executed against the store
//!   4. GET_ARTIST without an id → rejected by the payload rules

use std::time::Duration;

use serde_json::json;

use cadence_contracts::{
    command::Command,
    error::CadenceResult,
    query::{Query, QueryResult},
};

use crate::catalogue::Artist;
use crate::handlers::{CreateArtist, GetArtist, ListArtists};
use crate::runtime::CmsRuntime;

use super::{as_admin, verdict};

fn describe(label: &str, result: &QueryResult) {
    let count = result
        .data_as::<Vec<Artist>>()
        .ok()
        .flatten()
        .map_or(0, |artists| artists.len());
    println!(
        "  {:<28} {} artist(s), fromCache={}, {:.3}ms",
        label,
        count,
        result.from_cache(),
        result.metadata.execution_time
    );
}

pub async fn run_scenario(runtime: &CmsRuntime) -> CadenceResult<()> {
    println!("=== Scenario 2: Cached Artist Queries ===");
    println!();

    let queries = runtime.registry().queries();
    let list = || -> CadenceResult<Query> {
        Ok(Query::typed(&ListArtists::default())?.with_cache_ttl(Duration::from_secs(1)))
    };

    describe("LIST_ARTISTS (first call):", &queries.execute(list()?).await);
    describe("LIST_ARTISTS (second call):", &queries.execute(list()?).await);

    let created = runtime
        .registry()
        .commands()
        .execute(as_admin(Command::typed(&CreateArtist {
            name: "Noor Tallis".to_string(),
            genres: vec!["electronic".to_string()],
            bio: String::new(),
        })?))
        .await;
    println!("  CREATE_ARTIST (admin):       {}  → artist cache invalidated", verdict(created.success));

    describe("LIST_ARTISTS (after write):", &queries.execute(list()?).await);

    let electronic = queries
        .execute(Query::typed(&ListArtists {
            genre: Some("electronic".to_string()),
        })?)
        .await;
    describe("LIST_ARTISTS genre=electronic:", &electronic);

    let found = queries
        .execute(Query::typed(&GetArtist {
            id: "artist-seed-2".to_string(),
        })?)
        .await;
    let name = found
        .data
        .as_ref()
        .and_then(|d| d["name"].as_str())
        .unwrap_or("?")
        .to_string();
    println!("  GET_ARTIST artist-seed-2:    {}  name={}", verdict(found.success), name);

    let missing_id = queries.execute(Query::new("GET_ARTIST", json!({}))).await;
    println!("  GET_ARTIST (no id):          {}", verdict(missing_id.success));
    if let Some(error) = &missing_id.error {
        println!("    reason: {}", error);
    }

    println!();
    println!("  Cached entries: {}", queries.cache().len());
    println!();
    println!("  Scenario 2 complete.");
    println!();

    Ok(())
}
