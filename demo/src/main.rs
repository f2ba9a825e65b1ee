//! Cadence Artist Catalogue Demo CLI
//!
//! Runs one or all of the catalogue scenarios against a single runtime.
//! Every scenario uses the real Cadence components (buses, agent pool,
//! audit trail, monitor, security and schema middleware) wired together
//! over an in-memory catalogue.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- commands
//!   cargo run -p demo -- --config crates/cadence-ref-cms/config/core.toml scheduler

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cadence_contracts::error::CadenceResult;
use cadence_ref_cms::{scenarios, CmsRuntime};

// ── CLI definition ────────────────────────────────────────────────────────────

/// Cadence in-process orchestration core demo.
///
/// Each subcommand runs one or all of the artist catalogue scenarios.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "Cadence artist catalogue demo",
    long_about = "Runs Cadence catalogue scenarios showing command dispatch, cached queries,\n\
                  dependency-aware scheduling, security validation, and auditing."
)]
struct Cli {
    /// Core configuration TOML. Defaults to the bundled catalogue settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all five scenarios in sequence.
    RunAll,
    /// Scenario 1: Artist commands (security gate, schema validation).
    Commands,
    /// Scenario 2: Cached artist queries and invalidation.
    Queries,
    /// Scenario 3: Index rebuild on the agent pool.
    Scheduler,
    /// Scenario 4: Rate limiting and payload inspection.
    Security,
    /// Scenario 5: Compliance report, export and metrics.
    Audit,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    match run(cli).await {
        Ok(()) => {
            println!("All selected scenarios completed successfully.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> CadenceResult<()> {
    let runtime = match &cli.config {
        Some(path) => CmsRuntime::from_core_file(path)?,
        None => CmsRuntime::with_defaults()?,
    };
    let background = runtime.start_background_tasks();
    info!(tasks = background.len(), "background sweeps started");

    match cli.command {
        Command::RunAll => {
            scenarios::commands::run_scenario(&runtime).await?;
            scenarios::queries::run_scenario(&runtime).await?;
            scenarios::scheduler::run_scenario(&runtime).await?;
            scenarios::security::run_scenario(&runtime).await?;
            scenarios::audit::run_scenario(&runtime).await?;
        }
        Command::Commands => scenarios::commands::run_scenario(&runtime).await?,
        Command::Queries => scenarios::queries::run_scenario(&runtime).await?,
        Command::Scheduler => scenarios::scheduler::run_scenario(&runtime).await?,
        Command::Security => scenarios::security::run_scenario(&runtime).await?,
        Command::Audit => {
            // Give the report something to show.
            scenarios::commands::run_scenario(&runtime).await?;
            scenarios::audit::run_scenario(&runtime).await?;
        }
    }

    runtime.shutdown().await;
    for handle in background {
        handle.abort();
    }
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("Cadence: In-process Orchestration Core");
    println!("Artist Catalogue Demo");
    println!("=======================================");
    println!();
    println!("Request path per command:");
    println!("  [1] Validation + logging middleware");
    println!("  [2] Security gate: rate limit, permissions, payload inspection");
    println!("  [3] Schema validation against the registered JSON Schema");
    println!("  [4] Typed handler runs; data change audited; index task queued");
    println!("  [5] command.executed fans out to audit trail, monitor, cache invalidation");
    println!();
}
