//! Club Ledger - chat-driven social club ledger
//!
//! Features:
//! - Airtable or Baserow as the data source, chosen by configuration
//! - In-process table cache with coalesced fetches
//! - Telegram-first UX

use clap::Parser;
use clubledger::backend::RELOAD_TABLES;
use clubledger::{telegram, BackendConfig, ProviderKind, APP_NAME, APP_VERSION};

// =============================================================================
// CLI
// =============================================================================

/// Club Ledger - sessions, members, drinks and quotes over chat
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Chat-driven social club ledger")]
#[command(version)]
struct Cli {
    /// Data provider (overrides CLUB_PROVIDER)
    #[arg(short, long, value_enum)]
    provider: Option<ProviderKind>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Load every table once, print row counts and exit
    #[arg(long)]
    check: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "info,clubledger=info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    tracing::info!("Club Ledger v{}", APP_VERSION);

    let config = BackendConfig::from_env(cli.provider)?;
    let backend = config.backend()?;
    tracing::info!("Using {} provider", backend.provider_name());

    if cli.check {
        let listings = backend.tables(false, &[]).await?;
        for (table, rows) in RELOAD_TABLES.iter().zip(&listings) {
            println!("{table}: {} rows", rows.len());
        }
        return Ok(());
    }

    tracing::info!("Starting Telegram interface...");
    telegram::run_telegram_bot(backend).await?;

    Ok(())
}
