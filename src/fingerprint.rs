//! Content-addressed change detection for the knowledge-base archive.
//!
//! The fingerprint is a SHA-256 hash of the archive's full byte content,
//! persisted hex-encoded in a single-value sidecar file. Equality of
//! fingerprints means no re-indexing is required; hashing content rather
//! than mtimes avoids false negatives from touch-without-modify and false
//! positives from clock skew.
//!
//! The caller persists the new fingerprint only after an update completes,
//! so a crash mid-update leaves the stale value behind and the next run
//! retries safely.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Hash the archive bytes into a lowercase hex fingerprint.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Read the last persisted fingerprint. An absent file yields `None`.
pub fn read_state(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fingerprint state: {}", path.display()))?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_string()))
}

/// Persist a fingerprint, creating parent directories as needed.
pub fn write_state(path: &Path, fingerprint: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, fingerprint)
        .with_context(|| format!("Failed to write fingerprint state: {}", path.display()))?;
    Ok(())
}

/// True when the archive content differs from the last persisted
/// fingerprint, or no fingerprint has been persisted yet.
pub fn needs_update(archive_bytes: &[u8], state_path: &Path) -> Result<bool> {
    let current = fingerprint_bytes(archive_bytes);
    match read_state(state_path)? {
        Some(last) => Ok(last != current),
        None => Ok(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_state_requires_update() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("fp");
        assert!(needs_update(b"archive bytes", &state).unwrap());
    }

    #[test]
    fn matching_fingerprint_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("nested/fp");
        let bytes = b"archive bytes";
        write_state(&state, &fingerprint_bytes(bytes)).unwrap();
        assert!(!needs_update(bytes, &state).unwrap());
    }

    #[test]
    fn single_byte_change_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("fp");
        let bytes = b"archive bytes".to_vec();
        write_state(&state, &fingerprint_bytes(&bytes)).unwrap();

        let mut flipped = bytes.clone();
        flipped[0] ^= 0x01;
        assert_ne!(fingerprint_bytes(&bytes), fingerprint_bytes(&flipped));
        assert!(needs_update(&flipped, &state).unwrap());
    }

    #[test]
    fn state_roundtrip_trims_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("fp");
        std::fs::write(&state, "abc123\n").unwrap();
        assert_eq!(read_state(&state).unwrap().as_deref(), Some("abc123"));
    }
}
