//! Document extraction from the knowledge-base archive.
//!
//! Opens the ZIP archive, extracts entries with supported extensions into a
//! temporary scratch directory, and parses each one into a [`Document`]
//! through a type-appropriate parser (plain text, Markdown, PDF text
//! extraction). Unsupported extensions are skipped, not errored; an entry
//! that fails to parse is logged and excluded without failing the batch.
//! Only an unreadable or corrupt archive aborts the load.

use std::io::Read;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::{Document, SourceKind};

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Load failure. Fatal to the update cycle; the caller leaves the archive
/// fingerprint stale so the next run retries.
#[derive(Debug)]
pub enum LoadError {
    /// The archive could not be opened or is corrupt.
    Archive(String),
    /// The scratch area could not be prepared.
    Scratch(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Archive(e) => write!(f, "unreadable archive: {}", e),
            LoadError::Scratch(e) => write!(f, "scratch area failed: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

/// Extract all supported documents from the archive at `path`.
///
/// Returns documents in deterministic (entry-path) order.
pub fn load_archive(path: &Path) -> Result<Vec<Document>, LoadError> {
    let origin = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let file = std::fs::File::open(path).map_err(|e| LoadError::Archive(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| LoadError::Archive(e.to_string()))?;

    let scratch = tempfile::tempdir().map_err(|e| LoadError::Scratch(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(e) => e,
            Err(e) => {
                warn!(entry = i, error = %e, "skipping unreadable archive entry");
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }

        // Reject entries that would escape the scratch dir.
        let rel = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                warn!(name = entry.name(), "skipping entry with unsafe path");
                continue;
            }
        };

        let ext = rel
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if SourceKind::from_extension(&ext).is_none() {
            debug!(name = entry.name(), "skipping unsupported extension");
            continue;
        }

        let mut bytes = Vec::new();
        if let Err(e) = entry.take(MAX_ENTRY_BYTES).read_to_end(&mut bytes) {
            warn!(name = %rel.display(), error = %e, "skipping entry: read failed");
            continue;
        }
        if bytes.len() as u64 >= MAX_ENTRY_BYTES {
            warn!(name = %rel.display(), "skipping entry: exceeds size limit");
            continue;
        }

        let target = scratch.path().join(&rel);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LoadError::Scratch(e.to_string()))?;
        }
        std::fs::write(&target, &bytes).map_err(|e| LoadError::Scratch(e.to_string()))?;
    }

    // Enumerate the scratch area in sorted order so document order is
    // deterministic regardless of archive entry order.
    let mut paths: Vec<std::path::PathBuf> = WalkDir::new(scratch.path())
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for file_path in paths {
        let rel = file_path
            .strip_prefix(scratch.path())
            .unwrap_or(&file_path)
            .to_string_lossy()
            .replace('\\', "/");

        let ext = file_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        // Only supported extensions were extracted above.
        let kind = match SourceKind::from_extension(&ext) {
            Some(k) => k,
            None => continue,
        };

        let text = match parse_entry(&file_path, kind) {
            Ok(t) => t,
            Err(e) => {
                warn!(document = %rel, error = %e, "failed to parse entry, excluding");
                continue;
            }
        };

        if text.trim().is_empty() {
            debug!(document = %rel, "skipping empty document");
            continue;
        }

        documents.push(Document {
            path: rel,
            text,
            kind,
            origin: origin.clone(),
        });
    }

    debug!(count = documents.len(), archive = %origin, "archive loaded");
    Ok(documents)
}

/// Parse one extracted file into text, dispatched by document type.
fn parse_entry(path: &Path, kind: SourceKind) -> anyhow::Result<String> {
    match kind {
        SourceKind::PlainText | SourceKind::Markdown => Ok(std::fs::read_to_string(path)?),
        SourceKind::PdfExtract => {
            let bytes = std::fs::read(path)?;
            Ok(pdf_extract::extract_text_from_mem(&bytes)?)
        }
    }
}
