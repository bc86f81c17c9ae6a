//! # Harborlight CLI (`harbor`)
//!
//! The `harbor` binary is the primary interface for Harborlight. It keeps a
//! vector index synchronized with a curated document archive and answers
//! questions against it, falling back to a web search when the knowledge
//! base comes up short.
//!
//! ## Usage
//!
//! ```bash
//! harbor --config ./config/harborlight.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harbor sync` | Synchronize the vector index with the archive |
//! | `harbor ask "<question>"` | Answer a question with provenance |
//! | `harbor status` | Show whether the index is up to date |
//! | `harbor serve` | Start the JSON HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Rebuild the index if the archive changed
//! harbor sync --config ./config/harborlight.toml
//!
//! # Rebuild unconditionally
//! harbor sync --force
//!
//! # See what a sync would do without writing anything
//! harbor sync --dry-run
//!
//! # Ask a question
//! harbor ask "what does vitamin c do?"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use harborlight::config;
use harborlight::fingerprint;
use harborlight::index::IndexManager;
use harborlight::orchestrator::Orchestrator;
use harborlight::server;
use harborlight::update::{self, Updater};

/// Harborlight CLI — grounded question answering over a curated document
/// archive.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/harborlight.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "harbor",
    about = "Harborlight — grounded question answering over a curated document archive",
    version,
    long_about = "Harborlight extracts text from a zip archive of documents, chunks and embeds it \
    into a remote vector index, and answers questions grounded on retrieved context. Answers that \
    the model flags as uncertain fall back to a web search, and every answer discloses whether it \
    came from the knowledge base or the web."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harborlight.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Synchronize the vector index with the document archive.
    ///
    /// Fingerprints the archive and skips all work when nothing changed.
    /// Otherwise extracts, chunks, embeds, and upserts every document, and
    /// persists the new fingerprint only after the index write succeeds.
    Sync {
        /// Rebuild even when the archive fingerprint is unchanged.
        #[arg(long)]
        force: bool,

        /// Show document and chunk counts without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Answer a question against the knowledge base.
    ///
    /// Retrieves context from the vector index, generates a grounded
    /// answer, and falls back to a web search when the answer is flagged
    /// as uncertain. Prints the answer and its provenance.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Show whether the index is up to date with the archive.
    Status,

    /// Start the JSON HTTP server.
    ///
    /// Binds to the address configured in `[server].bind` and exposes
    /// `POST /answer`, `POST /sync`, and `GET /health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync { force, dry_run } => {
            if dry_run {
                let preview = update::preview(&cfg)?;
                println!(
                    "Archive: {} ({})",
                    cfg.archive.path.display(),
                    if preview.changed { "changed" } else { "unchanged" }
                );
                println!("Fingerprint: {}", preview.fingerprint);
                println!(
                    "Would index {} documents as {} chunks.",
                    preview.documents, preview.chunks
                );
                return Ok(());
            }

            let manager = IndexManager::from_config(&cfg)?;
            let report = Updater::new().run(&cfg, &manager, force).await?;
            if report.skipped {
                println!("Archive unchanged, nothing to do.");
            } else {
                println!(
                    "Indexed {} documents as {} chunks ({} records upserted).",
                    report.documents, report.chunks, report.records_upserted
                );
            }
            println!("Fingerprint: {}", report.fingerprint);
        }

        Commands::Ask { question } => {
            let manager = Arc::new(IndexManager::from_config(&cfg)?);
            let orchestrator = Orchestrator::from_config(&cfg, manager)?;
            let answer = orchestrator.answer(&question).await?;
            println!("{}", answer.text);
            println!();
            println!("[source: {}]", answer.source.as_str());
        }

        Commands::Status => {
            let archive_path = Path::new(&cfg.archive.path);
            let bytes = std::fs::read(archive_path).map_err(|e| {
                anyhow::anyhow!("Failed to read archive {}: {}", archive_path.display(), e)
            })?;
            let current = fingerprint::fingerprint_bytes(&bytes);
            let persisted = fingerprint::read_state(Path::new(&cfg.archive.state_path))?;

            println!("Archive:   {}", cfg.archive.path.display());
            println!("Current:   {}", current);
            match persisted {
                Some(last) if last == current => println!("Status:    up to date"),
                Some(last) => {
                    println!("Persisted: {}", last);
                    println!("Status:    update needed (run `harbor sync`)");
                }
                None => println!("Status:    never synchronized (run `harbor sync`)"),
            }
        }

        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
