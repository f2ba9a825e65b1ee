use std::sync::Arc;

use async_trait::async_trait;

use cadence_contracts::{
    command::Command,
    error::{CadenceError, CadenceResult},
    query::Query,
};
use cadence_core::traits::{CommandMiddleware, QueryMiddleware};

use crate::verifier::SchemaVerifier;

/// Rejects commands and queries whose payload fails the schema registered
/// for their type. The same instance can be installed on both buses.
#[derive(Debug, Clone)]
pub struct SchemaValidation {
    verifier: Arc<SchemaVerifier>,
}

impl SchemaValidation {
    pub fn new(verifier: Arc<SchemaVerifier>) -> Self {
        Self { verifier }
    }

    pub fn verifier(&self) -> &Arc<SchemaVerifier> {
        &self.verifier
    }

    fn check(&self, payload_type: &str, payload: &serde_json::Value) -> CadenceResult<()> {
        let report = self.verifier.verify(payload_type, payload);
        if report.passed {
            Ok(())
        } else {
            Err(CadenceError::validation(report.summary()))
        }
    }
}

#[async_trait]
impl CommandMiddleware for SchemaValidation {
    fn name(&self) -> &str {
        "schema"
    }

    async fn before(&self, command: Command) -> CadenceResult<Command> {
        self.check(&command.command_type, &command.payload)?;
        Ok(command)
    }
}

#[async_trait]
impl QueryMiddleware for SchemaValidation {
    fn name(&self) -> &str {
        "schema"
    }

    async fn before(&self, query: Query) -> CadenceResult<Query> {
        self.check(&query.query_type, &query.params)?;
        Ok(query)
    }
}
