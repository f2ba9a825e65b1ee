//! Core trait definitions for the Cadence dispatch layer.
//!
//! These traits define the seams collaborators plug into:
//!
//! - `EventHandler`: reacts to an emitted event
//! - `CommandHandler`: performs the single write for one command type
//! - `QueryHandler`: answers one query type
//! - `CommandMiddleware` and `QueryMiddleware`: wrap every dispatch
//!
//! The buses own the ordering. Handlers never see each other and never
//! decide whether a failure reaches the caller.

use async_trait::async_trait;

use cadence_contracts::{
    command::{Command, CommandResult},
    error::CadenceResult,
    event::Event,
    query::{Query, QueryResult},
};

/// A subscriber registered on the `EventBus`.
///
/// Errors returned here are logged by the bus and never reach the emitter.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> CadenceResult<()>;
}

/// The one handler registered for a command type.
///
/// Returns the `data` placed into the successful `CommandResult`.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: &Command) -> CadenceResult<serde_json::Value>;
}

/// The one handler registered for a query type.
///
/// A successful return value is cached by the query bus.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    async fn handle(&self, query: &Query) -> CadenceResult<serde_json::Value>;
}

/// A step in the command pipeline.
///
/// `before` runs for every middleware in registration order before the
/// handler and may replace the command. `after` runs in the same order with
/// the successful result. Returning `Err` from either aborts the dispatch and
/// produces a failed `CommandResult`.
#[async_trait]
pub trait CommandMiddleware: Send + Sync {
    /// Stable name used in logs and error messages.
    fn name(&self) -> &str;

    async fn before(&self, command: Command) -> CadenceResult<Command> {
        Ok(command)
    }

    async fn after(&self, _command: &Command, result: CommandResult) -> CadenceResult<CommandResult> {
        Ok(result)
    }
}

/// A step in the query pipeline. Skipped entirely on a cache hit.
#[async_trait]
pub trait QueryMiddleware: Send + Sync {
    fn name(&self) -> &str;

    async fn before(&self, query: Query) -> CadenceResult<Query> {
        Ok(query)
    }

    async fn after(&self, _query: &Query, result: QueryResult) -> CadenceResult<QueryResult> {
        Ok(result)
    }
}
