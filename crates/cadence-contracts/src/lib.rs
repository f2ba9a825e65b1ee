//! # cadence-contracts
//!
//! Shared types, event kinds, and error contracts for the Cadence
//! orchestration core.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod audit;
pub mod command;
pub mod error;
pub mod event;
pub mod metric;
pub mod query;
pub mod security;
pub mod task;
