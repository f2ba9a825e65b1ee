//! # cadence-ref-cms
//!
//! Artist catalogue reference collaborator for the Cadence orchestration
//! core.
//!
//! Demonstrates the intended wiring with an in-memory catalogue:
//!
//! 1. **Commands**: typed `CREATE_ARTIST` / `UPDATE_ARTIST` / `DELETE_ARTIST`
//!    handlers behind the security gate and schema validation, each write
//!    recorded as an audited data change.
//! 2. **Queries**: cached `GET_ARTIST` / `LIST_ARTISTS` / `SEARCH_ARTISTS`,
//!    invalidated by a subscriber on every artist write.
//! 3. **Scheduling**: writes queue `index-artist` tasks on the agent pool; a
//!    `publish-index` task waits on a whole rebuild through dependencies.
//! 4. **Observation**: the audit trail and performance monitor populate
//!    themselves from bus events.
//!
//! All data is fictional. No storage I/O is performed.

pub mod catalogue;
pub mod handlers;
pub mod indexer;
pub mod runtime;
pub mod scenarios;

pub use runtime::CmsRuntime;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use cadence_audit::{AuditFilter, ChangeKind};
    use cadence_contracts::{
        audit::AuditOutcome,
        command::Command,
        event::EventKind,
        query::Query,
    };

    use super::catalogue::{Artist, ArtistChanges, ArtistStore};
    use super::handlers::{CreateArtist, DeleteArtist, GetArtist, ListArtists, SearchArtists, UpdateArtist};
    use super::indexer::SearchIndex;
    use super::scenarios::{self, as_admin, as_editor};
    use super::*;

    fn runtime() -> CmsRuntime {
        CmsRuntime::with_defaults().unwrap()
    }

    async fn create(runtime: &CmsRuntime, name: &str) -> Artist {
        let result = runtime
            .registry()
            .commands()
            .execute(as_editor(
                Command::typed(&CreateArtist {
                    name: name.to_string(),
                    genres: vec!["folk".to_string()],
                    bio: String::new(),
                })
                .unwrap(),
            ))
            .await;
        assert!(result.success, "{:?}", result.error);
        result.data_as::<Artist>().unwrap().unwrap()
    }

    // ── Catalogue ────────────────────────────────────────────────────────────

    #[test]
    fn store_lists_by_name_and_genre() {
        let store = ArtistStore::seeded();
        assert_eq!(store.len(), 3);

        let names: Vec<String> = store.list(None).into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Ada Lumen", "Marek Vossberg", "The Quiet Harbour"]);

        let electronic = store.list(Some("Electronic"));
        assert_eq!(electronic.len(), 2);
    }

    #[test]
    fn update_returns_before_and_after() {
        let store = ArtistStore::seeded();
        let (before, after) = store
            .update(
                "artist-seed-2",
                ArtistChanges {
                    bio: Some("Now a five-piece.".to_string()),
                    ..ArtistChanges::default()
                },
            )
            .unwrap();

        assert_eq!(before.name, after.name);
        assert_ne!(before.bio, after.bio);
        assert!(store.update("missing", ArtistChanges::default()).is_none());
    }

    #[test]
    fn search_index_intersects_terms() {
        let index = SearchIndex::new();
        index.index("a", "Ada Lumen ambient electronic");
        index.index("b", "Marek jazz electronic");

        assert_eq!(index.search("electronic"), vec!["a", "b"]);
        assert_eq!(index.search("Electronic JAZZ"), vec!["b"]);
        assert!(index.search("opera").is_empty());
        assert!(index.search("").is_empty());

        index.remove("b");
        assert_eq!(index.search("electronic"), vec!["a"]);
        assert!(index.search("jazz").is_empty());
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_is_stored_and_audited() {
        let runtime = runtime();
        let artist = create(&runtime, "Kim").await;

        assert_eq!(runtime.store().get(&artist.id).unwrap().name, "Kim");

        let changes = runtime.audit().query(&AuditFilter {
            resource: Some("artist".to_string()),
            ..AuditFilter::for_user("editor-1")
        });
        assert_eq!(changes.total_count, 1);
        assert_eq!(changes.entries[0].operation, ChangeKind::Create.as_str());
        assert_eq!(changes.entries[0].resource_id, artist.id);
    }

    #[tokio::test]
    async fn delete_requires_the_delete_permission() {
        let runtime = runtime();
        let commands = runtime.registry().commands();
        let delete = || Command::typed(&DeleteArtist { id: "artist-seed-1".to_string() }).unwrap();

        let denied = commands.execute(as_editor(delete())).await;
        assert!(!denied.success);
        assert!(denied.error.unwrap().contains("artist:delete"));
        assert!(runtime.store().get("artist-seed-1").is_some());

        let deleted = commands.execute(as_admin(delete())).await;
        assert!(deleted.success);
        assert!(runtime.store().get("artist-seed-1").is_none());

        let violations = runtime.audit().query(&AuditFilter {
            resource: Some("security".to_string()),
            ..AuditFilter::default()
        });
        assert_eq!(violations.total_count, 1);
        assert_eq!(violations.entries[0].result, AuditOutcome::Failure);
    }

    #[tokio::test]
    async fn anonymous_writes_are_rejected() {
        let runtime = runtime();
        let result = runtime
            .registry()
            .commands()
            .execute(Command::new("CREATE_ARTIST", json!({ "name": "Nobody" })))
            .await;
        assert!(!result.success);
        assert_eq!(runtime.store().len(), 3);
    }

    #[tokio::test]
    async fn malformed_payloads_never_reach_the_store() {
        let runtime = runtime();
        let commands = runtime.registry().commands();

        let wrong_type = commands
            .execute(as_editor(Command::new("CREATE_ARTIST", json!({ "name": 7 }))))
            .await;
        assert!(wrong_type.error.unwrap().starts_with("validation failed"));

        let extra_field = commands
            .execute(as_editor(Command::new(
                "CREATE_ARTIST",
                json!({ "name": "Kim", "label": "x" }),
            )))
            .await;
        assert!(!extra_field.success);

        let unknown = commands
            .execute(as_editor(
                Command::typed(&UpdateArtist {
                    id: "artist-404".to_string(),
                    changes: ArtistChanges::default(),
                })
                .unwrap(),
            ))
            .await;
        assert!(unknown.error.unwrap().contains("not found"));

        assert_eq!(runtime.store().len(), 3);
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn artist_writes_invalidate_cached_queries() {
        let runtime = runtime();
        let queries = runtime.registry().queries();
        let list = || Query::typed(&ListArtists::default()).unwrap();

        assert!(!queries.execute(list()).await.from_cache());
        let cached = queries.execute(list()).await;
        assert!(cached.from_cache());
        assert_eq!(cached.data_as::<Vec<Artist>>().unwrap().unwrap().len(), 3);

        create(&runtime, "Kim").await;

        let fresh = queries.execute(list()).await;
        assert!(!fresh.from_cache());
        assert_eq!(fresh.data_as::<Vec<Artist>>().unwrap().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn get_artist_reports_missing_ids() {
        let runtime = runtime();
        let queries = runtime.registry().queries();

        let found = queries
            .execute(Query::typed(&GetArtist { id: "artist-seed-3".to_string() }).unwrap())
            .await;
        assert_eq!(found.data_as::<Artist>().unwrap().unwrap().name, "Marek Vossberg");

        let missing = queries
            .execute(Query::typed(&GetArtist { id: "artist-404".to_string() }).unwrap())
            .await;
        assert!(!missing.success);

        let no_id = queries.execute(Query::new("GET_ARTIST", json!({}))).await;
        assert!(no_id.error.unwrap().contains("required field 'id'"));
    }

    // ── Scheduling ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn index_rebuild_publishes_after_every_artist() {
        let runtime = runtime();
        let publish = runtime.index_catalogue().unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            runtime.pool().wait_for_result(&publish),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(result.success);
        assert_eq!(result.output.unwrap()["dependencies"], 3);

        let completed = runtime.registry().events().history(Some(EventKind::AGENT_TASK_COMPLETED));
        let publish_position = completed
            .iter()
            .position(|e| e.payload["taskId"] == publish.as_str())
            .unwrap();
        assert_eq!(publish_position, 3);

        let found = runtime
            .registry()
            .queries()
            .execute(Query::typed(&SearchArtists { text: "drum".to_string() }).unwrap())
            .await;
        let names: Vec<String> = found
            .data_as::<Vec<Artist>>()
            .unwrap()
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Marek Vossberg"]);
    }

    #[tokio::test]
    async fn shutdown_stops_every_agent() {
        let runtime = runtime();
        runtime.shutdown().await;

        let status = runtime.pool().status();
        assert_eq!(status.stopped_agents, status.total_agents);
        assert_eq!(status.queue_size, 0);
    }

    // ── Scenarios ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn all_scenarios_run_against_one_runtime() {
        let runtime = runtime();

        scenarios::commands::run_scenario(&runtime).await.unwrap();
        scenarios::queries::run_scenario(&runtime).await.unwrap();
        scenarios::scheduler::run_scenario(&runtime).await.unwrap();
        scenarios::security::run_scenario(&runtime).await.unwrap();
        scenarios::audit::run_scenario(&runtime).await.unwrap();

        assert!(!runtime
            .registry()
            .events()
            .history(Some(EventKind::SECURITY_VIOLATION))
            .is_empty());
        assert!(runtime.audit().len() > 0);
    }
}
