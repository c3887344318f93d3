//! Restwell CLI - Database migrations, catalog seeding and payment tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! rw-cli migrate
//!
//! # Load or update products from YAML
//! rw-cli seed products crates/cli/seed/products.yaml
//!
//! # Ask PhonePe about payments pending for more than 15 minutes
//! rw-cli payments reconcile --older-than-minutes 15
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed products` - Upsert catalog documents by slug
//! - `payments reconcile` - Poll the gateway for stale pending payments

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rw-cli")]
#[command(author, version, about = "Restwell CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Seed the database from files
    Seed {
        #[command(subcommand)]
        target: SeedTarget,
    },
    /// Payment maintenance
    Payments {
        #[command(subcommand)]
        action: PaymentsAction,
    },
}

#[derive(Subcommand)]
enum SeedTarget {
    /// Upsert products from a YAML file
    Products {
        /// Path to the YAML file
        file: String,

        /// Validate the file without writing to the database
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum PaymentsAction {
    /// Poll PhonePe for payments still pending
    Reconcile {
        /// Only consider payments untouched for at least this many minutes
        #[arg(long, default_value_t = 15)]
        older_than_minutes: i64,
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
        Commands::Seed { target } => match target {
            SeedTarget::Products { file, dry_run } => {
                commands::seed::products(&file, dry_run).await?;
            }
        },
        Commands::Payments { action } => match action {
            PaymentsAction::Reconcile { older_than_minutes } => {
                commands::payments::reconcile(older_than_minutes).await?;
            }
        },
    }
    Ok(())
}
