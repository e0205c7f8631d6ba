//! Counsel CLI and REST API entry point.
//!
//! Binary name: `counsel`
//!
//! Parses CLI arguments, initializes the database and services, then
//! dispatches to the appropriate command handler or starts the REST API
//! server.

mod http;
mod state;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use counsel_types::money::Amount;
use state::AppState;

/// Session lifecycle and billing for the Counsel marketplace.
#[derive(Parser)]
#[command(name = "counsel", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Suppress all output except errors.
    #[arg(long, global = true)]
    quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON (for log shippers).
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "8080", env = "COUNSEL_PORT")]
        port: u16,

        /// Host address to bind.
        #[arg(long, default_value = "127.0.0.1", env = "COUNSEL_HOST")]
        host: String,
    },

    /// Seed local data for development.
    Seed {
        #[command(subcommand)]
        resource: SeedResource,
    },
}

#[derive(Subcommand)]
enum SeedResource {
    /// Create or update an advisor's per-minute rate.
    Advisor {
        /// Advisor id (a fresh one is generated when omitted).
        #[arg(long)]
        id: Option<Uuid>,

        /// Rate per minute, in cents.
        #[arg(long)]
        rate_cents: u64,
    },

    /// Deposit funds into a wallet.
    Wallet {
        /// Account id (a fresh one is generated when omitted).
        #[arg(long)]
        id: Option<Uuid>,

        /// Amount to deposit, in cents.
        #[arg(long)]
        amount_cents: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,counsel=debug",
        _ => "trace",
    };
    counsel_observe::tracing_setup::init_tracing(Some(filter), cli.json_logs)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Initialize application state (DB, services)
    let state = AppState::init().await?;

    match cli.command {
        Commands::Serve { port, host } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!(%addr, "counsel API listening");
            println!("Counsel API listening on http://{addr}");

            let router = http::router::build_router(state);
            axum::serve(listener, router).await?;
        }

        Commands::Seed { resource } => match resource {
            SeedResource::Advisor { id, rate_cents } => {
                let advisor_id = id.unwrap_or_else(Uuid::now_v7);
                state
                    .rates
                    .set_rate(&advisor_id, Amount::from_cents(rate_cents))
                    .await
                    .map_err(|e| anyhow::anyhow!("failed to seed advisor: {e}"))?;
                println!(
                    "advisor {advisor_id} rate set to {}",
                    Amount::from_cents(rate_cents)
                );
            }
            SeedResource::Wallet { id, amount_cents } => {
                let account_id = id.unwrap_or_else(Uuid::now_v7);
                state
                    .wallet
                    .deposit(&account_id, Amount::from_cents(amount_cents))
                    .await
                    .map_err(|e| anyhow::anyhow!("failed to seed wallet: {e}"))?;
                println!(
                    "wallet {account_id} credited with {}",
                    Amount::from_cents(amount_cents)
                );
            }
        },
    }

    Ok(())
}
