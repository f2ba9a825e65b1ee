//! Command dispatch: one handler per type behind an ordered middleware chain.
//!
//! Pipeline per `execute()`:
//!
//!   before-middleware (in order) → handler lookup → handler → after-middleware (in order)
//!
//! Any error along the way, including a missing handler or a panicking
//! handler, becomes a `success: false` result. The caller never receives an
//! `Err`. Outcomes are announced on the event bus: `command.executed` on
//! success, `command.failed` plus `system.error` on failure.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, warn};

use cadence_contracts::{
    command::{Command, CommandMetadata, CommandResult, TypedCommand},
    error::{CadenceError, CadenceResult},
    event::EventKind,
};

use crate::event_bus::EventBus;
use crate::handler::{FnCommandHandler, TypedCommandHandler};
use crate::middleware::{LoggingMiddleware, ValidationMiddleware};
use crate::traits::{CommandHandler, CommandMiddleware};
use crate::{elapsed_ms, read_lock, write_lock};

const SOURCE: &str = "command-bus";

/// Routes commands to their registered handler.
pub struct CommandBus {
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
    middleware: RwLock<Vec<Arc<dyn CommandMiddleware>>>,
    events: EventBus,
}

impl CommandBus {
    /// A bus with no middleware installed.
    pub fn new(events: EventBus) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            middleware: RwLock::new(Vec::new()),
            events,
        }
    }

    /// A bus with the built-in validation and logging middleware installed.
    pub fn with_default_middleware(events: EventBus) -> Self {
        let bus = Self::new(events);
        bus.use_middleware(Arc::new(ValidationMiddleware));
        bus.use_middleware(Arc::new(LoggingMiddleware));
        bus
    }

    /// Register the handler for `command_type`.
    ///
    /// Returns `DuplicateHandler` if the type already has one.
    pub fn register_handler(
        &self,
        command_type: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> CadenceResult<()> {
        let command_type = command_type.into();
        let mut handlers = write_lock(&self.handlers);
        if handlers.contains_key(&command_type) {
            return Err(CadenceError::DuplicateHandler {
                kind: "command",
                type_name: command_type,
            });
        }
        debug!(command_type = %command_type, "command handler registered");
        handlers.insert(command_type, handler);
        Ok(())
    }

    /// Register an async closure over the raw command.
    pub fn register_fn<F, Fut>(&self, command_type: impl Into<String>, f: F) -> CadenceResult<()>
    where
        F: Fn(Command) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CadenceResult<serde_json::Value>> + Send + 'static,
    {
        self.register_handler(command_type, Arc::new(FnCommandHandler(f)))
    }

    /// Register an async closure over a typed payload under `C::TYPE`.
    pub fn register_typed<C, F, Fut, R>(&self, f: F) -> CadenceResult<()>
    where
        C: TypedCommand,
        F: Fn(C, CommandMetadata) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CadenceResult<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.register_handler(C::TYPE, Arc::new(TypedCommandHandler::<C, F>::new(f)))
    }

    /// Append a middleware to the chain.
    pub fn use_middleware(&self, middleware: Arc<dyn CommandMiddleware>) {
        debug!(middleware = middleware.name(), "command middleware installed");
        write_lock(&self.middleware).push(middleware);
    }

    pub fn has_handler(&self, command_type: &str) -> bool {
        read_lock(&self.handlers).contains_key(command_type)
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = read_lock(&self.handlers).keys().cloned().collect();
        types.sort();
        types
    }

    /// Dispatch `command` and report the outcome.
    pub async fn execute(&self, command: Command) -> CommandResult {
        let started = Instant::now();
        let command_type = command.command_type.clone();
        let user_id = command.metadata.user_id.clone();
        let correlation_id = command.metadata.correlation_id.clone();
        let payload = command.payload.clone();

        let outcome = AssertUnwindSafe(self.run_pipeline(command))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(CadenceError::handler("command handler panicked")));

        let execution_time = elapsed_ms(started);

        match outcome {
            Ok(mut result) => {
                result.metadata.execution_time = execution_time;
                self.events
                    .emit(
                        EventKind::COMMAND_EXECUTED,
                        json!({
                            "type": command_type,
                            "userId": user_id,
                            "correlationId": correlation_id,
                            "payload": payload,
                            "data": result.data,
                            "success": true,
                            "executionTime": execution_time,
                        }),
                        SOURCE,
                    )
                    .await;
                result
            }
            Err(e) => {
                let message = e.to_string();
                warn!(command_type = %command_type, error = %message, "command failed");

                self.events
                    .emit(
                        EventKind::COMMAND_FAILED,
                        json!({
                            "type": command_type,
                            "userId": user_id,
                            "correlationId": correlation_id,
                            "payload": payload,
                            "error": message,
                            "success": false,
                            "executionTime": execution_time,
                        }),
                        SOURCE,
                    )
                    .await;
                self.events
                    .emit(
                        EventKind::SYSTEM_ERROR,
                        json!({
                            "component": SOURCE,
                            "type": command_type,
                            "error": message,
                        }),
                        SOURCE,
                    )
                    .await;

                CommandResult::failed(message, execution_time)
            }
        }
    }

    async fn run_pipeline(&self, mut command: Command) -> CadenceResult<CommandResult> {
        let middleware: Vec<Arc<dyn CommandMiddleware>> = read_lock(&self.middleware).clone();

        for mw in &middleware {
            command = mw.before(command).await?;
        }

        let handler = read_lock(&self.handlers)
            .get(&command.command_type)
            .cloned()
            .ok_or_else(|| CadenceError::NoHandler {
                kind: "command",
                type_name: command.command_type.clone(),
            })?;

        let data = handler.handle(&command).await?;
        let mut result = CommandResult::ok(data, 0.0);

        for mw in &middleware {
            result = mw.after(&command, result).await?;
        }

        Ok(result)
    }
}
