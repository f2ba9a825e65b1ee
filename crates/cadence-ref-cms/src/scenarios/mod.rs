//! Catalogue demo scenarios.
//!
//! Each scenario drives a shared `CmsRuntime` through one part of the
//! orchestration core and prints what happened. They are independent and
//! can run in any order against the same runtime.

use serde_json::json;

use cadence_contracts::command::Command;

pub mod audit;
pub mod commands;
pub mod queries;
pub mod scheduler;
pub mod security;

/// Attach an editor identity (`artist:create`, `artist:update`).
pub fn as_editor(command: Command) -> Command {
    command
        .with_user("editor-1")
        .with_meta("roles", json!(["editor"]))
}

/// Attach an admin identity (every permission).
pub fn as_admin(command: Command) -> Command {
    command
        .with_user("admin-1")
        .with_meta("roles", json!(["admin"]))
}

fn verdict(success: bool) -> &'static str {
    if success {
        "OK"
    } else {
        "REJECTED"
    }
}
