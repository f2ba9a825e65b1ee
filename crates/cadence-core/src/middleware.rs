//! Built-in bus middleware: request validation and trace logging.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use cadence_contracts::{
    command::{Command, CommandResult},
    error::{CadenceError, CadenceResult},
    query::{Query, QueryResult},
};

use crate::traits::{CommandMiddleware, QueryMiddleware};

/// Rejects requests without a type and stamps missing command timestamps.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidationMiddleware;

#[async_trait]
impl CommandMiddleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    async fn before(&self, mut command: Command) -> CadenceResult<Command> {
        if command.command_type.trim().is_empty() {
            return Err(CadenceError::validation("command type is required"));
        }
        if command.metadata.timestamp.is_none() {
            command.metadata.timestamp = Some(Utc::now());
        }
        Ok(command)
    }
}

#[async_trait]
impl QueryMiddleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    async fn before(&self, query: Query) -> CadenceResult<Query> {
        if query.query_type.trim().is_empty() {
            return Err(CadenceError::validation("query type is required"));
        }
        Ok(query)
    }
}

/// Emits a `debug!` trace before and after every dispatch.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMiddleware;

#[async_trait]
impl CommandMiddleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before(&self, command: Command) -> CadenceResult<Command> {
        debug!(
            command_type = %command.command_type,
            user_id = ?command.metadata.user_id,
            correlation_id = ?command.metadata.correlation_id,
            "executing command"
        );
        Ok(command)
    }

    async fn after(&self, command: &Command, result: CommandResult) -> CadenceResult<CommandResult> {
        debug!(
            command_type = %command.command_type,
            success = result.success,
            "command handled"
        );
        Ok(result)
    }
}

#[async_trait]
impl QueryMiddleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before(&self, query: Query) -> CadenceResult<Query> {
        debug!(query_type = %query.query_type, user_id = ?query.metadata.user_id, "executing query");
        Ok(query)
    }

    async fn after(&self, query: &Query, result: QueryResult) -> CadenceResult<QueryResult> {
        debug!(query_type = %query.query_type, success = result.success, "query handled");
        Ok(result)
    }
}
