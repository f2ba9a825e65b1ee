//! Artist commands, queries and the handlers that own the catalogue.
//!
//! Writes go through the command bus, are recorded as data changes in the
//! audit trail, and schedule a re-index on the agent pool. Reads go through
//! the query bus and are cached until the next artist write invalidates them.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use cadence_agents::AgentPool;
use cadence_audit::{AuditTrail, ChangeKind};
use cadence_contracts::{
    command::{CommandMetadata, TypedCommand},
    error::{CadenceError, CadenceResult},
    event::EventKind,
    query::TypedQuery,
    task::AgentTask,
};
use cadence_core::{BusRegistry, QueryBus, SubscribeOptions, Subscription};

use crate::catalogue::{audit_view, Artist, ArtistChanges, ArtistStore};
use crate::indexer::{SearchIndex, INDEX_ARTIST};

/// Substring shared by the cache keys of every artist query.
const ARTIST_CACHE_PATTERN: &str = "ARTIST";

const RESOURCE: &str = "artist";

const ARTIST_WRITES: [&str; 3] = [CreateArtist::TYPE, UpdateArtist::TYPE, DeleteArtist::TYPE];

// ── Commands ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateArtist {
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub bio: String,
}

impl TypedCommand for CreateArtist {
    const TYPE: &'static str = "CREATE_ARTIST";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateArtist {
    pub id: String,
    #[serde(flatten)]
    pub changes: ArtistChanges,
}

impl TypedCommand for UpdateArtist {
    const TYPE: &'static str = "UPDATE_ARTIST";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteArtist {
    pub id: String,
}

impl TypedCommand for DeleteArtist {
    const TYPE: &'static str = "DELETE_ARTIST";
}

// ── Queries ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetArtist {
    pub id: String,
}

impl TypedQuery for GetArtist {
    const TYPE: &'static str = "GET_ARTIST";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListArtists {
    #[serde(default)]
    pub genre: Option<String>,
}

impl TypedQuery for ListArtists {
    const TYPE: &'static str = "LIST_ARTISTS";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchArtists {
    pub text: String,
}

impl TypedQuery for SearchArtists {
    const TYPE: &'static str = "SEARCH_ARTISTS";
}

// ── Registration ──────────────────────────────────────────────────────────────

/// Everything the artist handlers need.
#[derive(Clone)]
pub struct CatalogueContext {
    pub store: Arc<ArtistStore>,
    pub index: Arc<SearchIndex>,
    pub audit: Arc<AuditTrail>,
    pub pool: Arc<AgentPool>,
}

impl CatalogueContext {
    fn schedule_index(&self, artist: &Artist) {
        let task = AgentTask::new(
            format!("index-{}-{}", artist.id, artist.updated_at.timestamp_micros()),
            INDEX_ARTIST,
            json!(artist),
        )
        .with_max_retries(1);

        if let Err(e) = self.pool.add_task(task) {
            warn!(artist_id = %artist.id, error = %e, "could not schedule indexing");
        }
    }
}

fn actor(meta: &CommandMetadata) -> &str {
    meta.user_id.as_deref().unwrap_or("system")
}

fn not_found(id: &str) -> CadenceError {
    CadenceError::handler(format!("artist '{}' not found", id))
}

/// Register every artist command and query handler.
///
/// Returns `CadenceError::DuplicateHandler` if any artist type is already
/// registered on `registry`.
pub fn register_handlers(registry: &BusRegistry, ctx: CatalogueContext) -> CadenceResult<()> {
    let commands = registry.commands();
    let queries = registry.queries();

    let c = ctx.clone();
    commands.register_typed(move |cmd: CreateArtist, meta: CommandMetadata| {
        let c = c.clone();
        async move {
            let artist = c.store.create(cmd.name, cmd.genres, cmd.bio);
            c.audit
                .track_data_change(
                    actor(&meta),
                    ChangeKind::Create,
                    RESOURCE,
                    &artist.id,
                    None,
                    Some(audit_view(&artist)),
                )
                .await;
            c.schedule_index(&artist);
            Ok::<_, CadenceError>(artist)
        }
    })?;

    let c = ctx.clone();
    commands.register_typed(move |cmd: UpdateArtist, meta: CommandMetadata| {
        let c = c.clone();
        async move {
            let (before, after) = c
                .store
                .update(&cmd.id, cmd.changes)
                .ok_or_else(|| not_found(&cmd.id))?;
            c.audit
                .track_data_change(
                    actor(&meta),
                    ChangeKind::Update,
                    RESOURCE,
                    &after.id,
                    Some(audit_view(&before)),
                    Some(audit_view(&after)),
                )
                .await;
            c.schedule_index(&after);
            Ok::<_, CadenceError>(after)
        }
    })?;

    let c = ctx.clone();
    commands.register_typed(move |cmd: DeleteArtist, meta: CommandMetadata| {
        let c = c.clone();
        async move {
            let removed = c.store.remove(&cmd.id).ok_or_else(|| not_found(&cmd.id))?;
            c.index.remove(&removed.id);
            c.audit
                .track_data_change(
                    actor(&meta),
                    ChangeKind::Delete,
                    RESOURCE,
                    &removed.id,
                    Some(audit_view(&removed)),
                    None,
                )
                .await;
            Ok::<_, CadenceError>(json!({ "id": removed.id, "deleted": true }))
        }
    })?;

    let store = ctx.store.clone();
    queries.register_typed(move |q: GetArtist, _meta| {
        let artist = store.get(&q.id);
        async move { artist.ok_or_else(|| not_found(&q.id)) }
    })?;

    let store = ctx.store.clone();
    queries.register_typed(move |q: ListArtists, _meta| {
        let artists = store.list(q.genre.as_deref());
        async move { Ok::<_, CadenceError>(artists) }
    })?;

    let (store, index) = (ctx.store.clone(), ctx.index.clone());
    queries.register_typed(move |q: SearchArtists, _meta| {
        let found: Vec<Artist> = index
            .search(&q.text)
            .iter()
            .filter_map(|id| store.get(id))
            .collect();
        async move { Ok::<_, CadenceError>(found) }
    })?;

    debug!("artist handlers registered");
    Ok(())
}

/// Drop cached artist query results after every successful artist write.
///
/// The subscription holds only a weak reference to the query bus.
pub fn invalidate_on_write(registry: &BusRegistry) -> Subscription {
    let queries: Weak<QueryBus> = Arc::downgrade(registry.queries());
    registry.events().subscribe_fn(
        EventKind::COMMAND_EXECUTED,
        SubscribeOptions::priority(10),
        move |event| {
            let queries = queries.clone();
            async move {
                let is_artist_write = event
                    .payload
                    .get("type")
                    .and_then(|t| t.as_str())
                    .is_some_and(|t| ARTIST_WRITES.contains(&t));
                if let (true, Some(queries)) = (is_artist_write, queries.upgrade()) {
                    let dropped = queries.invalidate_cache(Some(ARTIST_CACHE_PATTERN));
                    debug!(dropped, "artist query cache invalidated");
                }
                Ok(())
            }
        },
    )
}
