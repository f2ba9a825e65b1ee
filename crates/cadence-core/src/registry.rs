//! The explicitly constructed home of the shared buses.
//!
//! A `BusRegistry` is built once at startup and handed to every consumer.
//! Cloning it shares the same buses.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::QueryCache;
use crate::command_bus::CommandBus;
use crate::config::CoreConfig;
use crate::event_bus::EventBus;
use crate::query_bus::QueryBus;

#[derive(Clone)]
pub struct BusRegistry {
    events: EventBus,
    commands: Arc<CommandBus>,
    queries: Arc<QueryBus>,
    config: CoreConfig,
}

impl BusRegistry {
    /// Build the three buses with the built-in middleware installed.
    pub fn new(config: &CoreConfig) -> Self {
        let events = EventBus::with_history_capacity(config.event_bus.history_capacity);
        let commands = Arc::new(CommandBus::with_default_middleware(events.clone()));
        let queries = Arc::new(QueryBus::with_default_middleware(
            events.clone(),
            QueryCache::new(config.query_cache.default_ttl()),
        ));

        info!(
            history_capacity = config.event_bus.history_capacity,
            cache_ttl_ms = config.query_cache.default_ttl_ms,
            "bus registry initialised"
        );

        Self {
            events,
            commands,
            queries,
            config: config.clone(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn commands(&self) -> &Arc<CommandBus> {
        &self.commands
    }

    pub fn queries(&self) -> &Arc<QueryBus> {
        &self.queries
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Start the query cache sweep at the configured interval.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_background_tasks(&self) -> JoinHandle<()> {
        self.queries
            .spawn_cache_sweeper(self.config.query_cache.sweep_interval())
    }
}

impl Default for BusRegistry {
    fn default() -> Self {
        Self::new(&CoreConfig::default())
    }
}

impl std::fmt::Debug for BusRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusRegistry")
            .field("events", &self.events)
            .field("command_types", &self.commands.registered_types())
            .finish_non_exhaustive()
    }
}
