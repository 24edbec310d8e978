//! Orchard CLI - database migrations and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Create the KV and browser session tables
//! orchard-cli migrate
//!
//! # Delete expired KV rows
//! orchard-cli kv purge-expired
//!
//! # Print a fresh session secret
//! orchard-cli secret generate
//! ```
//!
//! # Environment Variables
//!
//! - `ORCHARD_KV_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "orchard-cli")]
#[command(author, version, about = "Orchard CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Maintain the KV store
    Kv {
        #[command(subcommand)]
        action: KvAction,
    },
    /// Manage secrets
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
}

#[derive(Subcommand)]
enum KvAction {
    /// Delete expired entries
    PurgeExpired,
}

#[derive(Subcommand)]
enum SecretAction {
    /// Print a random session secret
    Generate {
        /// Secret length in characters
        #[arg(short, long, default_value_t = 64)]
        length: usize,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Kv { action } => match action {
            KvAction::PurgeExpired => commands::kv::purge_expired().await?,
        },
        Commands::Secret { action } => match action {
            SecretAction::Generate { length } => commands::secret::generate(length)?,
        },
    }
    Ok(())
}
