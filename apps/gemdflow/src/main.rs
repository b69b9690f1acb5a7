//! # gemdflow
//!
//! Turns lab files dropped into a folder into gemd provenance documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 apps/gemdflow (THE BINARY)               │
//! │                                                          │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────┐   │
//! │  │    CLI      │   │  TOML rules  │   │   tracing    │   │
//! │  │   (clap)    │   │   (toml)     │   │  subscriber  │   │
//! │  └──────┬──────┘   └──────┬───────┘   └──────────────┘   │
//! │         └────────┬────────┘                              │
//! │                  ▼                                       │
//! │          ┌───────────────┐                               │
//! │          │ gemdflow-core │                               │
//! │          │  (THE LOGIC)  │                               │
//! │          └───────────────┘                               │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! gemdflow init
//! gemdflow watch -c rules.toml --files-folder lab --gemd-folder gemd --instantiate-build
//! gemdflow graph --gemd-folder gemd --which all --output graph.json
//! ```

use clap::Parser;
use gemdflow::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // GEMDFLOW_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("GEMDFLOW_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gemdflow=info,gemdflow_core=info".into());

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
        println!("gemdflow v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
