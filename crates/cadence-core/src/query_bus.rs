//! Query dispatch with a TTL result cache.
//!
//! Pipeline per `execute()`:
//!
//!   cache key → [live entry? return fromCache] → before-middleware → handler
//!     → after-middleware → cache store
//!
//! A cache hit bypasses middleware and handler entirely. Only a result that
//! came through every after-middleware successfully is cached. Every execution emits `query.executed`; failures also emit
//! `system.error`.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use cadence_contracts::{
    error::{CadenceError, CadenceResult},
    event::EventKind,
    query::{Query, QueryMetadata, QueryResult, TypedQuery},
};

use crate::cache::{cache_key, QueryCache};
use crate::event_bus::EventBus;
use crate::handler::{FnQueryHandler, TypedQueryHandler};
use crate::middleware::{LoggingMiddleware, ValidationMiddleware};
use crate::traits::{QueryHandler, QueryMiddleware};
use crate::{elapsed_ms, read_lock, write_lock};

const SOURCE: &str = "query-bus";

/// Routes queries to their registered handler and caches successes.
pub struct QueryBus {
    handlers: RwLock<HashMap<String, Arc<dyn QueryHandler>>>,
    middleware: RwLock<Vec<Arc<dyn QueryMiddleware>>>,
    cache: Arc<QueryCache>,
    events: EventBus,
}

impl QueryBus {
    /// A bus with no middleware and the given cache.
    pub fn new(events: EventBus, cache: QueryCache) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
            cache: Arc::new(cache),
            events,
        }
    }

    /// A bus with the built-in validation and logging middleware installed.
    pub fn with_default_middleware(events: EventBus, cache: QueryCache) -> Self {
        let bus = Self::new(events, cache);
        bus.use_middleware(Arc::new(ValidationMiddleware));
        bus.use_middleware(Arc::new(LoggingMiddleware));
        bus
    }

    pub fn register_handler(
        &self,
        query_type: impl Into<String>,
        handler: Arc<dyn QueryHandler>,
    ) -> CadenceResult<()> {
        let query_type = query_type.into();
        let mut handlers = write_lock(&self.handlers);
        if handlers.contains_key(&query_type) {
            return Err(CadenceError::DuplicateHandler {
                kind: "query",
                type_name: query_type,
            });
        }
        debug!(query_type = %query_type, "query handler registered");
        handlers.insert(query_type, handler);
        Ok(())
    }

    pub fn register_fn<F, Fut>(&self, query_type: impl Into<String>, f: F) -> CadenceResult<()>
    where
        F: Fn(Query) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CadenceResult<serde_json::Value>> + Send + 'static,
    {
        self.register_handler(query_type, Arc::new(FnQueryHandler(f)))
    }

    pub fn register_typed<Q, F, Fut, R>(&self, f: F) -> CadenceResult<()>
    where
        Q: TypedQuery,
        F: Fn(Q, QueryMetadata) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CadenceResult<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.register_handler(Q::TYPE, Arc::new(TypedQueryHandler::<Q, F>::new(f)))
    }

    pub fn use_middleware(&self, middleware: Arc<dyn QueryMiddleware>) {
        debug!(middleware = middleware.name(), "query middleware installed");
        write_lock(&self.middleware).push(middleware);
    }

    pub fn has_handler(&self, query_type: &str) -> bool {
        read_lock(&self.handlers).contains_key(query_type)
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Remove cached results whose key contains `pattern`, or all of them.
    pub fn invalidate_cache(&self, pattern: Option<&str>) -> usize {
        let removed = self.cache.invalidate(pattern);
        debug!(pattern = ?pattern, removed, "query cache invalidated");
        removed
    }

    /// Start the periodic expiry sweep.
    pub fn spawn_cache_sweeper(&self, every: Duration) -> JoinHandle<()> {
        self.cache.spawn_sweeper(every)
    }

    /// Answer `query`, from cache when a live entry exists.
    pub async fn execute(&self, query: Query) -> QueryResult {
        let started = Instant::now();
        let key = query
            .metadata
            .cache_key
            .clone()
            .unwrap_or_else(|| cache_key(&query.query_type, &query.params));

        if let Some(data) = self.cache.get(&key) {
            let result = QueryResult::ok(data, elapsed_ms(started), true);
            debug!(query_type = %query.query_type, cache_key = %key, "query served from cache");
            self.emit_executed(&query, &result).await;
            return result;
        }

        let ttl = query.cache_ttl();
        let outcome = AssertUnwindSafe(self.run_pipeline(query.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(CadenceError::handler("query handler panicked")));

        let execution_time = elapsed_ms(started);

        match outcome {
            Ok(mut result) => {
                if let (true, Some(data)) = (result.success, &result.data) {
                    self.cache.insert(key.as_str(), data.clone(), ttl);
                }
                result.metadata.execution_time = execution_time;
                self.emit_executed(&query, &result).await;
                result
            }
            Err(e) => {
                let message = e.to_string();
                warn!(query_type = %query.query_type, error = %message, "query failed");
                let result = QueryResult::failed(message.clone(), execution_time);
                self.emit_executed(&query, &result).await;
                self.events
                    .emit(
                        EventKind::SYSTEM_ERROR,
                        json!({
                            "component": SOURCE,
                            "type": query.query_type,
                            "error": message,
                        }),
                        SOURCE,
                    )
                    .await;
                result
            }
        }
    }

    async fn run_pipeline(&self, mut query: Query) -> CadenceResult<QueryResult> {
        let middleware: Vec<Arc<dyn QueryMiddleware>> = read_lock(&self.middleware).clone();

        for mw in &middleware {
            query = mw.before(query).await?;
        }

        let handler = read_lock(&self.handlers)
            .get(&query.query_type)
            .cloned()
            .ok_or_else(|| CadenceError::NoHandler {
                kind: "query",
                type_name: query.query_type.clone(),
            })?;

        let data = handler.handle(&query).await?;
        let mut result = QueryResult::ok(data, 0.0, false);
        for mw in &middleware {
            result = mw.after(&query, result).await?;
        }

        Ok(result)
    }

    async fn emit_executed(&self, query: &Query, result: &QueryResult) {
        self.events
            .emit(
                EventKind::QUERY_EXECUTED,
                json!({
                    "type": query.query_type,
                    "userId": query.metadata.user_id,
                    "success": result.success,
                    "fromCache": result.metadata.from_cache,
                    "executionTime": result.metadata.execution_time,
                    "error": result.error,
                }),
                SOURCE,
            )
            .await;
    }
}
