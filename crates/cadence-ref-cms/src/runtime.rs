//! One-stop construction of every Cadence component for the catalogue.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::info;

use cadence_agents::{AgentPool, SubAgent};
use cadence_audit::AuditTrail;
use cadence_contracts::{
    error::CadenceResult,
    task::{AgentTask, TaskId},
};
use cadence_core::{BusRegistry, CoreConfig, Subscription};
use cadence_monitor::PerformanceMonitor;
use cadence_policy::{SecurityConfig, SecurityGate, SecurityMiddleware};
use cadence_verify::{PayloadSchema, RuleCheck, SchemaValidation, SchemaVerifier};

use crate::catalogue::ArtistStore;
use crate::handlers::{self, CatalogueContext, CreateArtist, GetArtist, SearchArtists, UpdateArtist};
use crate::indexer::{IndexArtistAgent, PublishIndexAgent, SearchIndex, INDEX_ARTIST, PUBLISH_INDEX};

/// Security rules shipped with the catalogue.
pub const DEFAULT_SECURITY: &str = include_str!("../config/security.toml");

/// Core settings shipped with the catalogue.
pub const DEFAULT_CORE: &str = include_str!("../config/core.toml");

/// Indexing agents started by [`CmsRuntime::new`].
const INDEX_AGENTS: usize = 2;

/// The assembled artist catalogue.
///
/// Built once at startup and shared by reference. Must be constructed
/// inside a tokio runtime.
pub struct CmsRuntime {
    registry: BusRegistry,
    pool: Arc<AgentPool>,
    audit: Arc<AuditTrail>,
    monitor: Arc<PerformanceMonitor>,
    security: Arc<SecurityMiddleware>,
    verifier: Arc<SchemaVerifier>,
    store: Arc<ArtistStore>,
    index: Arc<SearchIndex>,
    _subscriptions: Vec<Subscription>,
}

impl CmsRuntime {
    /// Wire every component from `core` and `security` and seed the
    /// catalogue.
    ///
    /// Returns `CadenceError::ConfigError` if either configuration fails
    /// validation.
    pub fn new(core: CoreConfig, security: SecurityConfig) -> CadenceResult<Self> {
        core.validate()?;

        let registry = BusRegistry::new(&core);
        let events = registry.events().clone();

        let audit = Arc::new(AuditTrail::new(core.audit.clone(), events.clone()));
        let monitor = Arc::new(PerformanceMonitor::new(core.monitor.clone(), events.clone()));
        monitor.set_threshold("command.duration", 250.0, 1000.0);
        monitor.set_threshold("agent.task.duration", 2000.0, 10000.0);

        let security = Arc::new(SecurityMiddleware::new(security, events.clone())?);
        let verifier = Arc::new(SchemaVerifier::new());
        register_schemas(&verifier)?;

        let validation = Arc::new(SchemaValidation::new(verifier.clone()));
        registry
            .commands()
            .use_middleware(Arc::new(SecurityGate::new(security.clone())));
        registry.commands().use_middleware(validation.clone());
        registry.queries().use_middleware(validation);

        let pool = Arc::new(AgentPool::with_max_queue_len(core.scheduler.max_queue_len));
        let store = Arc::new(ArtistStore::seeded());
        let index = Arc::new(SearchIndex::new());

        for n in 0..INDEX_AGENTS {
            pool.register_agent(Arc::new(SubAgent::new(
                format!("indexer-{}", n + 1),
                Arc::new(IndexArtistAgent::new(index.clone())),
                events.clone(),
            )))?;
        }
        pool.register_agent(Arc::new(SubAgent::new(
            "publisher-1",
            Arc::new(PublishIndexAgent::new(index.clone())),
            events.clone(),
        )))?;

        handlers::register_handlers(
            &registry,
            CatalogueContext {
                store: store.clone(),
                index: index.clone(),
                audit: audit.clone(),
                pool: pool.clone(),
            },
        )?;

        let mut subscriptions = audit.attach(&events);
        subscriptions.extend(monitor.attach(&events));
        subscriptions.push(handlers::invalidate_on_write(&registry));

        info!(
            artists = store.len(),
            agents = pool.status().total_agents,
            "catalogue runtime ready"
        );

        Ok(Self {
            registry,
            pool,
            audit,
            monitor,
            security,
            verifier,
            store,
            index,
            _subscriptions: subscriptions,
        })
    }

    /// The runtime with the bundled `config/` files.
    pub fn with_defaults() -> CadenceResult<Self> {
        Self::new(
            CoreConfig::from_toml_str(DEFAULT_CORE)?,
            SecurityConfig::from_toml_str(DEFAULT_SECURITY)?,
        )
    }

    /// Load the core settings from `path` and keep the bundled security
    /// rules.
    pub fn from_core_file(path: &Path) -> CadenceResult<Self> {
        Self::new(
            CoreConfig::from_file(path)?,
            SecurityConfig::from_toml_str(DEFAULT_SECURITY)?,
        )
    }

    /// Start the cache sweep and the audit retention sweep.
    pub fn start_background_tasks(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.registry.start_background_tasks(),
            self.audit.spawn_retention_sweeper(),
        ]
    }

    pub fn registry(&self) -> &BusRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<AgentPool> {
        &self.pool
    }

    pub fn audit(&self) -> &Arc<AuditTrail> {
        &self.audit
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn security(&self) -> &Arc<SecurityMiddleware> {
        &self.security
    }

    pub fn verifier(&self) -> &Arc<SchemaVerifier> {
        &self.verifier
    }

    pub fn store(&self) -> &Arc<ArtistStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    /// Queue an index task for every stored artist plus a publish task that
    /// depends on all of them. Returns the publish task's ID.
    ///
    /// Returns `CadenceError::QueueFull` if the scheduler cannot take the
    /// whole batch.
    pub fn index_catalogue(&self) -> CadenceResult<TaskId> {
        let publish = TaskId::new(format!("publish-{}", uuid::Uuid::new_v4().simple()));
        let mut task = AgentTask::new(publish.clone(), PUBLISH_INDEX, json!({})).with_priority(-1);

        for artist in self.store.list(None) {
            let id = TaskId::new(format!("reindex-{}", artist.id));
            self.pool.add_task(
                AgentTask::new(id.clone(), INDEX_ARTIST, json!(artist))
                    .with_timeout(Duration::from_secs(5))
                    .with_max_retries(2),
            )?;
            task = task.depends_on(id);
        }

        self.pool.add_task(task)?;
        Ok(publish)
    }

    /// Stop every agent and drop queued work.
    pub async fn shutdown(&self) {
        self.pool.cleanup().await;
        info!("catalogue runtime stopped");
    }
}

impl std::fmt::Debug for CmsRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CmsRuntime")
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .field("audit", &self.audit)
            .field("artists", &self.store.len())
            .finish_non_exhaustive()
    }
}

fn register_schemas(verifier: &SchemaVerifier) -> CadenceResult<()> {
    let genres = json!({ "type": "array", "items": { "type": "string" }, "maxItems": 10 });

    verifier.register_command::<CreateArtist>(PayloadSchema::json(json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "minLength": 1, "maxLength": 200 },
            "genres": genres.clone(),
            "bio": { "type": "string" }
        },
        "required": ["name"],
        "additionalProperties": false
    })))?;

    verifier.register_command::<UpdateArtist>(
        PayloadSchema::json(json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" },
                "name": { "type": "string", "minLength": 1, "maxLength": 200 },
                "genres": genres,
                "bio": { "type": "string" }
            },
            "required": ["id"]
        }))
        .with_rule(
            "id-no-slash",
            RuleCheck::ForbiddenPattern {
                field_path: "id".to_string(),
                pattern: "/".to_string(),
            },
        ),
    )?;

    verifier.register_query::<GetArtist>(PayloadSchema::default().with_rule(
        "id",
        RuleCheck::RequiredField {
            field_path: "id".to_string(),
        },
    ))?;

    verifier.register_query::<SearchArtists>(PayloadSchema::json(json!({
        "type": "object",
        "properties": { "text": { "type": "string", "minLength": 2 } },
        "required": ["text"]
    })))?;

    Ok(())
}
