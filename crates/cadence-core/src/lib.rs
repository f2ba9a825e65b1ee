//! # cadence-core
//!
//! The in-process dispatch layer of the Cadence orchestration core.
//!
//! This crate provides:
//! - `EventBus`: priority-ordered publish/subscribe with bounded history and replay
//! - `CommandBus` and `QueryBus`: single-handler dispatch behind middleware chains
//! - `QueryCache`: the TTL cache behind the query bus
//! - `BusRegistry` and `CoreConfig`: one-time construction from TOML
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cadence_core::{BusRegistry, CoreConfig};
//!
//! let registry = BusRegistry::new(&CoreConfig::from_file(path)?);
//! registry.commands().register_typed(|cmd: CreateArtist, _meta| async move { ... })?;
//! let result = registry.commands().execute(Command::typed(&cmd)?).await;
//! ```

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::time::Instant;

pub mod cache;
pub mod command_bus;
pub mod config;
pub mod event_bus;
pub mod handler;
pub mod middleware;
pub mod query_bus;
pub mod registry;
pub mod traits;

pub use cache::QueryCache;
pub use command_bus::CommandBus;
pub use config::CoreConfig;
pub use event_bus::{EventBus, SubscribeOptions, Subscription};
pub use query_bus::QueryBus;
pub use registry::BusRegistry;

/// Milliseconds elapsed since `start`, with sub-millisecond precision.
pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
