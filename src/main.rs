//! # GTC Q&A CLI (`gtc-qa`)
//!
//! ## Usage
//!
//! ```bash
//! gtc-qa --config ./config/gtc-qa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gtc-qa init` | Create the SQLite database and run schema migrations |
//! | `gtc-qa refresh` | Register new documents from the GTC catalog |
//! | `gtc-qa documents` | List known documents and their status |
//! | `gtc-qa questions` | List questions and their answers |
//! | `gtc-qa ask <id> "<prompt>"` | Ask about a document and wait for the answer |
//! | `gtc-qa serve` | Start the HTTP API |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gtc_qa::{commands, config, migrate};

/// GTC Q&A: ask questions about insurance general terms and conditions.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/gtc-qa.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "gtc-qa",
    about = "Question answering over insurance general terms and conditions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/gtc-qa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Fetch catalog metadata and register documents not seen before.
    Refresh,

    /// List documents.
    Documents {
        #[arg(long, default_value_t = 0)]
        skip: i64,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },

    /// List questions.
    Questions {
        #[arg(long, default_value_t = 0)]
        skip: i64,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },

    /// Ask a question about a document.
    ///
    /// Downloads and indexes the document first if needed, then prints
    /// the answered (or failed) question.
    Ask {
        /// Local document id (see `gtc-qa documents`).
        document_id: i64,
        /// The question text.
        prompt: String,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind`. Requires an API key in `[server].api_key`
    /// or the `API_KEY` environment variable.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Refresh => {
            commands::run_refresh(&cfg).await?;
        }
        Commands::Documents { skip, limit } => {
            commands::run_documents(&cfg, skip, limit).await?;
        }
        Commands::Questions { skip, limit } => {
            commands::run_questions(&cfg, skip, limit).await?;
        }
        Commands::Ask {
            document_id,
            prompt,
        } => {
            commands::run_ask(&cfg, document_id, &prompt).await?;
        }
        Commands::Serve => {
            commands::run_serve(&cfg).await?;
        }
    }

    Ok(())
}
