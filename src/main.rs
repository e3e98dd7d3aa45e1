//! # ragdesk CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragdesk ingest` | Upload new PDFs from the data folder and archive them |
//! | `ragdesk chat` | Interactive question answering with citations |
//! | `ragdesk search "<query>"` | Raw similarity search against the index |
//! | `ragdesk status` | Show the ingestion state file and pending PDFs |
//!
//! ## Examples
//!
//! ```bash
//! ragdesk ingest --dry-run
//! ragdesk ingest --progress json
//! ragdesk --config ./ragdesk.toml chat
//! ragdesk search "travel reimbursement" --limit 3
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use ragdesk::progress::ProgressMode;
use ragdesk::{chat, config, ingest, search, status};

const DEFAULT_CONFIG_FILE: &str = "ragdesk.toml";

/// Ask questions about your PDFs, with sources.
///
/// Settings come from an optional TOML file plus environment variables
/// (`DATA_FOLDER`, `PINECONE_INDEX_NAME`, `PINECONE_API_KEY`, `GOOGLE_API_KEY`,
/// `GEMINI_MODEL`). A `.env` file in the working directory is loaded first.
#[derive(Parser)]
#[command(name = "ragdesk", version, about)]
struct Cli {
    /// Path to a TOML configuration file.
    ///
    /// Defaults to `./ragdesk.toml` when that file exists; otherwise built-in
    /// defaults plus environment variables are used.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest new PDFs from the data folder.
    ///
    /// Files whose content hash is already recorded are skipped. Each new
    /// file is archived into `processed/` and recorded only after all of its
    /// chunks have been uploaded.
    Ingest {
        /// Hash, load, and split only; print counts without uploading.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of PDFs to consider.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress on stderr: `off`, `human`, or `json`.
        /// Defaults to `human` when stderr is a terminal, `json` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Start an interactive chat session in the terminal.
    Chat,

    /// Print the passages nearest to a query.
    Search {
        query: String,

        /// Number of passages (defaults to `retrieval.top_k`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show what has been ingested and what is waiting.
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = Path::new(DEFAULT_CONFIG_FILE);
        default.is_file().then(|| default.to_path_buf())
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(config_path(cli.config).as_deref())?;

    match cli.command {
        Commands::Ingest {
            dry_run,
            limit,
            progress,
        } => {
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&cfg, dry_run, limit, mode).await?;
        }
        Commands::Chat => {
            chat::run_chat(&cfg).await?;
        }
        Commands::Search { query, limit } => {
            search::run_search(&cfg, &query, limit).await?;
        }
        Commands::Status => {
            status::run_status(&cfg)?;
        }
    }

    Ok(())
}
