//! `claims` — clinic claims batch CLI
//!
//! # Usage
//!
//! ```bash
//! # Enhance last week's visits with clinical details
//! claims enhance --from 2024-03-04 --to 2024-03-08
//!
//! # Gate the same range before submitting
//! claims validate --from 2024-03-04 --to 2024-03-08
//!
//! # Dry-run the portal fill for MHC visits, drafts only
//! claims submit --portal-only --from 2024-03-04 --to 2024-03-08 --save-as-draft
//! ```
//!
//! # Environment Variables
//!
//! * `CLAIMS_DATABASE_URL` / `DATABASE_URL` - PostgreSQL connection string
//! * `CLAIMS_BRIDGE_URL` - automation-bridge sidecar base URL
//! * `CLAIMS_BRIDGE_TOKEN` - bridge bearer token, if configured
//! * `CLAIMS_BRIDGE_TIMEOUT_SECS` - per-request bridge timeout (default: 120)
//! * `CLAIMS_LOG_LEVEL` / `RUST_LOG` - log level (default: info)

mod cli;
mod commands;
mod config;
mod summary;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Cli, Commands};
use crate::config::CliConfig;

#[tokio::main]
async fn main() {
    // Load .env if present (useful for local development)
    dotenvy::dotenv().ok();

    let args = Cli::parse();
    let config = CliConfig::load();
    init_tracing(&config.log_level);

    let code = match run(args, config).await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(error = %error, "run aborted");
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(code);
}

async fn run(args: Cli, config: CliConfig) -> anyhow::Result<i32> {
    let app = commands::App::connect(config).await?;

    match args.command {
        Commands::Enhance { scope, batch } => app.enhance(&scope, &batch).await,
        Commands::Submit {
            scope,
            batch,
            submission,
        } => app.submit(&scope, &batch, &submission).await,
        Commands::Validate { scope } => app.validate(&scope).await,
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
