//! # stsdesk - STS Operations Record Server
//!
//! The main binary for the stsdesk versioned record ledger.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for records, reviews, audit and export
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │            apps/stsdesk (THE BINARY)          │
//! │                                               │
//! │    ┌─────────────┐        ┌─────────────┐     │
//! │    │    CLI      │        │  HTTP API   │     │
//! │    │   (clap)    │        │   (axum)    │     │
//! │    └──────┬──────┘        └──────┬──────┘     │
//! │           └───────────┬──────────┘            │
//! │                       ▼                       │
//! │               ┌──────────────┐                │
//! │               │ stsdesk-core │                │
//! │               │ (THE LEDGER) │                │
//! │               └──────────────┘                │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! stsdesk server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! stsdesk status
//! stsdesk create -k ofd-inspection -f inspection.json
//! stsdesk amend -k ofd-inspection -i 7 -f changes.json
//! stsdesk verify
//! ```

use clap::Parser;
use stsdesk::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // STSDESK_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("STSDESK_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stsdesk=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  ███████╗████████╗███████╗██████╗ ███████╗███████╗██╗  ██╗
  ██╔════╝╚══██╔══╝██╔════╝██╔══██╗██╔════╝██╔════╝██║ ██╔╝
  ███████╗   ██║   ███████╗██║  ██║█████╗  ███████╗█████╔╝
  ╚════██║   ██║   ╚════██║██║  ██║██╔══╝  ╚════██║██╔═██╗
  ███████║   ██║   ███████║██████╔╝███████╗███████║██║  ██╗
  ╚══════╝   ╚═╝   ╚══════╝╚═════╝ ╚══════╝╚══════╝╚═╝  ╚═╝

  STS Operations Records v{}

  Append-only • Versioned • Audited
"#,
        env!("CARGO_PKG_VERSION")
    );
}
