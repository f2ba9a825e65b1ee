//! `SecurityMiddleware` as a command bus middleware.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use cadence_contracts::{
    command::Command,
    error::{CadenceError, CadenceResult},
    security::SecurityContext,
};
use cadence_core::traits::CommandMiddleware;

use crate::middleware::SecurityMiddleware;

type ContextResolver = dyn Fn(&Command) -> SecurityContext + Send + Sync;

/// Rejects commands that fail security validation.
///
/// Passing commands gain `securityRisk` (and `securityWarnings`, when there
/// are any) in their metadata.
pub struct SecurityGate {
    security: Arc<SecurityMiddleware>,
    resolve: Box<ContextResolver>,
}

impl SecurityGate {
    /// A gate that reads the caller from command metadata: `userId` as the
    /// identifier, plus optional `roles` and `permissions` string arrays.
    pub fn new(security: Arc<SecurityMiddleware>) -> Self {
        Self::with_resolver(security, context_from_metadata)
    }

    pub fn with_resolver<F>(security: Arc<SecurityMiddleware>, resolve: F) -> Self
    where
        F: Fn(&Command) -> SecurityContext + Send + Sync + 'static,
    {
        Self {
            security,
            resolve: Box::new(resolve),
        }
    }
}

#[async_trait]
impl CommandMiddleware for SecurityGate {
    fn name(&self) -> &str {
        "security"
    }

    async fn before(&self, command: Command) -> CadenceResult<Command> {
        let context = (self.resolve)(&command);
        let outcome = self
            .security
            .validate_operation(&command.command_type, &command.payload, &context)
            .await;

        if !outcome.is_valid {
            return Err(CadenceError::MiddlewareFailed {
                middleware: "security".to_string(),
                reason: outcome.errors.join("; "),
            });
        }

        let mut command = command.with_meta("securityRisk", json!(outcome.risk_score));
        if !outcome.warnings.is_empty() {
            command = command.with_meta("securityWarnings", json!(outcome.warnings));
        }
        Ok(command)
    }
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Default resolver used by [`SecurityGate::new`].
pub fn context_from_metadata(command: &Command) -> SecurityContext {
    let metadata = &command.metadata;
    let mut context = match &metadata.user_id {
        Some(user) => SecurityContext::for_user(user.clone()),
        None => SecurityContext::new("anonymous"),
    };
    context.roles = strings(metadata.extra.get("roles"));
    context.permissions = strings(metadata.extra.get("permissions"));
    context
}
