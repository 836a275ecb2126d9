//! hubflow - process shipments from the command line

use anyhow::Result;
use clap::{Parser, Subcommand};
use hubflow_cli::commands;
use hubflow_cli::{ConfigOverrides, ReviewerKind};
use hubflow_shipment::ShipmentEngine;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hubflow")]
#[command(about = "Hierarchical shipment / stop / PO workflow runner", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a shipment document
    Run {
        /// Path to the shipment JSON
        file: PathBuf,

        /// Emit one JSON progress event per line instead of a summary
        #[arg(long)]
        stream: bool,

        /// Where escalation decisions come from
        #[arg(short, long, value_enum, default_value = "console")]
        reviewer: ReviewerKind,

        /// Engine settings file (TOML)
        #[arg(short, long, env = "HUBFLOW_CONFIG")]
        config: Option<PathBuf>,

        /// Maximum POs of one stop resolved at the same time
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Reviewer calls allowed per escalated PO
        #[arg(long)]
        max_review_attempts: Option<u32>,
    },

    /// Check a shipment document without processing it
    Validate {
        /// Path to the shipment JSON
        file: PathBuf,
    },

    /// Print a sample shipment document
    Sample,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries results
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(rust_log)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Commands::Run {
            file,
            stream,
            reviewer,
            config,
            max_concurrency,
            max_review_attempts,
        } => {
            let overrides = ConfigOverrides {
                max_concurrency,
                max_review_attempts,
            };
            let config = commands::load_config(config.as_deref(), &overrides)?;
            let shipment = commands::load_shipment(&file)?;
            let engine = ShipmentEngine::new(config, reviewer.build())?;

            if stream {
                commands::run_streaming(&engine, shipment, &mut stdout).await
            } else {
                commands::run(&engine, shipment, &mut stdout).await
            }
        }
        Commands::Validate { file } => commands::validate(&file, &mut stdout),
        Commands::Sample => {
            serde_json::to_writer_pretty(&mut stdout, &commands::sample_shipment())?;
            writeln!(stdout)?;
            Ok(())
        }
    }
}
