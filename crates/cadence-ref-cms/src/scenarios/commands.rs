//! Scenario 1: Artist commands
//!
//! Walks one artist through its lifecycle on the command bus:
//!   1. editor creates the artist → handler stores it, index task queued
//!   2. editor renames it → audited as a critical-field update
//!   3. editor tries to delete it → security gate rejects (no artist:delete)
//!   4. admin deletes it
//!   5. malformed payload → schema validation rejects before the handler
//!   6. unknown command type → failure result, never a panic

use serde_json::json;

use cadence_contracts::{
    command::{Command, TypedCommand},
    error::CadenceResult,
};

use crate::handlers::{CreateArtist, DeleteArtist, UpdateArtist};
use crate::runtime::CmsRuntime;

use super::{as_admin, as_editor, verdict};

pub async fn run_scenario(runtime: &CmsRuntime) -> CadenceResult<()> {
    println!("=== Scenario 1: Artist Commands ===");
    println!();

    let bus = runtime.registry().commands();

    let created = bus
        .execute(as_editor(Command::typed(&CreateArtist {
            name: "Kim".to_string(),
            genres: vec!["pop".to_string()],
            bio: "Debut single out now.".to_string(),
        })?))
        .await;
    let id = created
        .data
        .as_ref()
        .and_then(|d| d["id"].as_str())
        .unwrap_or("?")
        .to_string();
    println!("  CREATE_ARTIST (editor):      {}  id={}", verdict(created.success), id);

    let renamed = bus
        .execute(as_editor(Command::new(
            UpdateArtist::TYPE,
            json!({ "id": id, "name": "Kim & The Lanterns" }),
        )))
        .await;
    println!("  UPDATE_ARTIST (editor):      {}", verdict(renamed.success));

    let denied = bus
        .execute(as_editor(Command::typed(&DeleteArtist { id: id.clone() })?))
        .await;
    println!("  DELETE_ARTIST (editor):      {}", verdict(denied.success));
    if let Some(error) = &denied.error {
        println!("    reason: {}", error);
    }

    let deleted = bus
        .execute(as_admin(Command::typed(&DeleteArtist { id })?))
        .await;
    println!("  DELETE_ARTIST (admin):       {}", verdict(deleted.success));

    let malformed = bus
        .execute(as_editor(Command::new(
            CreateArtist::TYPE,
            json!({ "name": 7 }),
        )))
        .await;
    println!("  CREATE_ARTIST (bad payload): {}", verdict(malformed.success));
    if let Some(error) = &malformed.error {
        println!("    reason: {}", error);
    }

    let unknown = bus.execute(Command::new("MERGE_ARTISTS", json!({}))).await;
    println!("  MERGE_ARTISTS (no handler):  {}", verdict(unknown.success));
    if let Some(error) = &unknown.error {
        println!("    reason: {}", error);
    }

    println!();
    println!("  Catalogue size: {} artist(s)", runtime.store().len());
    println!();
    println!("  Scenario 1 complete.");
    println!();

    Ok(())
}
