//! Knowledge-base synchronization: detect archive changes, rebuild the
//! index, and persist the fingerprint only after a fully successful run.
//!
//! The fingerprint sidecar is the commit record. It is written last, so a
//! failed run leaves the previous fingerprint in place and the next run
//! retries the whole update. Concurrent updates are excluded with an async
//! mutex held for the duration of a run.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::fingerprint;
use crate::index::IndexManager;
use crate::loader::load_archive;
use crate::models::Chunk;

/// Outcome of a synchronization run.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    /// True when the archive fingerprint matched and nothing was done.
    pub skipped: bool,
    pub documents: usize,
    pub chunks: usize,
    pub records_upserted: u64,
    /// Hex SHA-256 of the archive bytes this run observed.
    pub fingerprint: String,
}

/// Serializes synchronization runs; at most one proceeds at a time.
pub struct Updater {
    lock: Mutex<()>,
}

impl Updater {
    pub fn new() -> Self {
        Self { lock: Mutex::new(()) }
    }

    /// Run a synchronization.
    ///
    /// Skips all work when the archive fingerprint matches the persisted
    /// state, unless `force` is set. The fingerprint is written only after
    /// the index write succeeds.
    pub async fn run(
        &self,
        config: &Config,
        manager: &IndexManager,
        force: bool,
    ) -> Result<UpdateReport> {
        let _guard = self.lock.lock().await;

        let archive_path = Path::new(&config.archive.path);
        let state_path = Path::new(&config.archive.state_path);

        let bytes = std::fs::read(archive_path)
            .with_context(|| format!("Failed to read archive: {}", archive_path.display()))?;
        let current = fingerprint::fingerprint_bytes(&bytes);

        if !force && !fingerprint::needs_update(&bytes, state_path)? {
            info!(fingerprint = %current, "archive unchanged, skipping update");
            return Ok(UpdateReport {
                skipped: true,
                documents: 0,
                chunks: 0,
                records_upserted: 0,
                fingerprint: current,
            });
        }

        let documents = load_archive(archive_path)?;
        let chunks = chunk_all(config, &documents);
        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "archive changed, rebuilding index"
        );

        manager.ensure_index().await?;
        let records_upserted = manager.upsert_chunks(&chunks).await?;

        fingerprint::write_state(state_path, &current)?;
        info!(records_upserted, fingerprint = %current, "update complete");

        Ok(UpdateReport {
            skipped: false,
            documents: documents.len(),
            chunks: chunks.len(),
            records_upserted,
            fingerprint: current,
        })
    }
}

impl Default for Updater {
    fn default() -> Self {
        Self::new()
    }
}

fn chunk_all(config: &Config, documents: &[crate::models::Document]) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| {
            chunk_document(
                doc,
                config.chunking.max_chars,
                config.chunking.overlap_chars,
            )
        })
        .collect()
}

/// What an update would do, without touching the index or the state file.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub changed: bool,
    pub documents: usize,
    pub chunks: usize,
    pub fingerprint: String,
}

/// Inspect the archive against the persisted state. Read-only.
pub fn preview(config: &Config) -> Result<Preview> {
    let archive_path = Path::new(&config.archive.path);
    let state_path = Path::new(&config.archive.state_path);

    let bytes = std::fs::read(archive_path)
        .with_context(|| format!("Failed to read archive: {}", archive_path.display()))?;
    let fingerprint = fingerprint::fingerprint_bytes(&bytes);
    let changed = fingerprint::needs_update(&bytes, state_path)?;

    let documents = load_archive(archive_path)?;
    let chunks = chunk_all(config, &documents);

    Ok(Preview {
        changed,
        documents: documents.len(),
        chunks: chunks.len(),
        fingerprint,
    })
}
