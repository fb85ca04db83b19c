//! # Rhizome CLI (`rhz`)
//!
//! The `rhz` binary drives the connection pipeline over documents produced
//! by an upstream extraction stage.
//!
//! ## Usage
//!
//! ```bash
//! rhz --config ./config/rhz.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rhz init` | Create the SQLite database and run schema migrations |
//! | `rhz map <document.json>` | Map anchors onto chunks and transfer metadata |
//! | `rhz connect <document.json>` | Run detection and persist connections |
//! | `rhz connections <chunk_id>` | List stored connections for a chunk |
//! | `rhz stats` | Summarize stored connections |
//!
//! Logs go to stderr; set `RUST_LOG` (default `info`) to adjust.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use rhizome::{config, connect_cmd, connections, migrate, stats};

/// Rhizome: connection detection for a personal reading library.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rhz.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rhz",
    about = "Rhizome: anchor mapping and multi-engine connection detection",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rhz.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Map a document's anchors onto its chunks.
    ///
    /// Runs the coordinate mapper and metadata transfer only. Nothing is
    /// written to the database.
    Map {
        /// Document JSON: `{document_id, chunks, anchors}`.
        document: PathBuf,

        /// Print enriched chunks and matches as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Detect connections for a document and store them.
    ///
    /// Previous connections sourced from this document's chunks are
    /// replaced.
    Connect {
        /// Document JSON: `{document_id, chunks, anchors}`.
        document: PathBuf,

        /// Enriched chunks from other documents to use as candidates.
        #[arg(long)]
        library: Option<PathBuf>,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List stored connections for a chunk, strongest first.
    Connections {
        chunk_id: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Show connection counts per engine and relation type.
    Stats,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Map { document, json } => {
            connect_cmd::run_map(&cfg, &document, json).await?;
        }
        Commands::Connect {
            document,
            library,
            json,
        } => {
            connect_cmd::run_connect(&cfg, &document, library.as_deref(), json).await?;
        }
        Commands::Connections {
            chunk_id,
            limit,
            json,
        } => {
            connections::run_connections(&cfg, &chunk_id, limit, json).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
