//! Closure adapters for the handler traits.
//!
//! Most collaborators register plain async closures rather than writing a
//! struct per handler. These wrappers lift such closures into the trait
//! objects the buses store.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;

use cadence_contracts::{
    command::{Command, CommandMetadata, TypedCommand},
    error::CadenceResult,
    event::Event,
    query::{Query, QueryMetadata, TypedQuery},
};

use crate::traits::{CommandHandler, EventHandler, QueryHandler};

/// An `EventHandler` backed by an async closure taking the event by value.
pub struct FnEventHandler<F>(pub F);

#[async_trait]
impl<F, Fut> EventHandler for FnEventHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync,
    Fut: Future<Output = CadenceResult<()>> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> CadenceResult<()> {
        (self.0)(event.clone()).await
    }
}

/// A `CommandHandler` backed by an async closure over the raw command.
pub struct FnCommandHandler<F>(pub F);

#[async_trait]
impl<F, Fut> CommandHandler for FnCommandHandler<F>
where
    F: Fn(Command) -> Fut + Send + Sync,
    Fut: Future<Output = CadenceResult<serde_json::Value>> + Send + 'static,
{
    async fn handle(&self, command: &Command) -> CadenceResult<serde_json::Value> {
        (self.0)(command.clone()).await
    }
}

/// A `QueryHandler` backed by an async closure over the raw query.
pub struct FnQueryHandler<F>(pub F);

#[async_trait]
impl<F, Fut> QueryHandler for FnQueryHandler<F>
where
    F: Fn(Query) -> Fut + Send + Sync,
    Fut: Future<Output = CadenceResult<serde_json::Value>> + Send + 'static,
{
    async fn handle(&self, query: &Query) -> CadenceResult<serde_json::Value> {
        (self.0)(query.clone()).await
    }
}

/// A `CommandHandler` that decodes the payload into `C` before calling `f`
/// and serializes whatever `f` returns.
pub struct TypedCommandHandler<C, F> {
    f: F,
    _payload: PhantomData<fn() -> C>,
}

impl<C, F> TypedCommandHandler<C, F> {
    pub fn new(f: F) -> Self {
        Self { f, _payload: PhantomData }
    }
}

#[async_trait]
impl<C, F, Fut, R> CommandHandler for TypedCommandHandler<C, F>
where
    C: TypedCommand,
    F: Fn(C, CommandMetadata) -> Fut + Send + Sync,
    Fut: Future<Output = CadenceResult<R>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    async fn handle(&self, command: &Command) -> CadenceResult<serde_json::Value> {
        let payload = command.decode::<C>()?;
        let output = (self.f)(payload, command.metadata.clone()).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// The query-side counterpart of [`TypedCommandHandler`].
pub struct TypedQueryHandler<Q, F> {
    f: F,
    _params: PhantomData<fn() -> Q>,
}

impl<Q, F> TypedQueryHandler<Q, F> {
    pub fn new(f: F) -> Self {
        Self { f, _params: PhantomData }
    }
}

#[async_trait]
impl<Q, F, Fut, R> QueryHandler for TypedQueryHandler<Q, F>
where
    Q: TypedQuery,
    F: Fn(Q, QueryMetadata) -> Fut + Send + Sync,
    Fut: Future<Output = CadenceResult<R>> + Send + 'static,
    R: Serialize + Send + 'static,
{
    async fn handle(&self, query: &Query) -> CadenceResult<serde_json::Value> {
        let params = query.decode::<Q>()?;
        let output = (self.f)(params, query.metadata.clone()).await?;
        Ok(serde_json::to_value(output)?)
    }
}
