//! Content-hash build cache.
//!
//! A cache snapshot maps absolute source paths to the blake3 hash of their
//! content at the last successful write. A path is considered unchanged iff
//! its current hash equals the stored one; absence means "never built".
//!
//! The snapshot on disk is replaced wholesale at the end of a successful
//! pass. A failed pass therefore never advances (or corrupts) the cache:
//! a subsequent pass will not falsely believe partial output is complete.
//! Content and image caches live in separate files with the same format.

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

use crate::log;

/// Path-to-hash snapshot persisted as a JSON object.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct Snapshot(FxHashMap<String, String>);

/// One build cache: the snapshot from the previous pass plus the entries
/// recorded during the current pass.
#[derive(Debug)]
pub struct BuildCache {
    file: PathBuf,
    previous: Snapshot,
    current: Snapshot,
}

impl BuildCache {
    /// Load a snapshot file. A missing file is an empty cache; a malformed
    /// one logs a warning and is treated as empty (everything rebuilds).
    pub fn load(file: &Path) -> Self {
        let previous = match fs::read_to_string(file) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                log!("warn"; "discarding malformed cache {}: {err}", file.display());
                Snapshot::default()
            }),
            Err(_) => Snapshot::default(),
        };

        Self {
            file: file.to_path_buf(),
            previous,
            current: Snapshot::default(),
        }
    }

    /// Whether `path` (with content hash `hash`) must be regenerated.
    ///
    /// Always true for a non-incremental pass.
    pub fn should_rebuild(&self, path: &Path, hash: &str, full: bool) -> bool {
        if full {
            return true;
        }
        self.previous.0.get(&key(path)).is_none_or(|stored| stored != hash)
    }

    /// Record a path as built with the given content hash. Recorded entries
    /// form the next snapshot.
    pub fn record(&mut self, path: &Path, hash: String) {
        self.current.0.insert(key(path), hash);
    }

    /// Persist the entries recorded this pass, replacing the previous
    /// snapshot wholesale.
    pub fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.current)?;
        fs::write(&self.file, json)
            .with_context(|| format!("Failed to write cache {}", self.file.display()))?;
        Ok(())
    }

    #[cfg(test)]
    fn previous_len(&self) -> usize {
        self.previous.0.len()
    }
}

fn key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Blake3 content hash of a file, hex-encoded.
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(hash_bytes(&bytes))
}

/// Blake3 hash of a byte slice, hex-encoded.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_stable() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
    }

    #[test]
    fn test_unknown_path_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::load(&dir.path().join("cache.json"));
        assert!(cache.should_rebuild(Path::new("/src/a.md"), "h1", false));
    }

    #[test]
    fn test_matching_hash_skips_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cache.json");

        let mut cache = BuildCache::load(&file);
        cache.record(Path::new("/src/a.md"), "h1".into());
        cache.persist().unwrap();

        let cache = BuildCache::load(&file);
        assert!(!cache.should_rebuild(Path::new("/src/a.md"), "h1", false));
        assert!(cache.should_rebuild(Path::new("/src/a.md"), "h2", false));
    }

    #[test]
    fn test_full_pass_rebuilds_everything() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cache.json");

        let mut cache = BuildCache::load(&file);
        cache.record(Path::new("/src/a.md"), "h1".into());
        cache.persist().unwrap();

        let cache = BuildCache::load(&file);
        assert!(cache.should_rebuild(Path::new("/src/a.md"), "h1", true));
    }

    #[test]
    fn test_persist_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cache.json");

        let mut cache = BuildCache::load(&file);
        cache.record(Path::new("/src/a.md"), "h1".into());
        cache.record(Path::new("/src/b.md"), "h2".into());
        cache.persist().unwrap();

        // Next pass records only one path; the other must vanish from disk.
        let mut cache = BuildCache::load(&file);
        cache.record(Path::new("/src/a.md"), "h1".into());
        cache.persist().unwrap();

        let cache = BuildCache::load(&file);
        assert_eq!(cache.previous_len(), 1);
        assert!(cache.should_rebuild(Path::new("/src/b.md"), "h2", false));
    }

    #[test]
    fn test_unpersisted_pass_does_not_advance() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cache.json");

        let mut cache = BuildCache::load(&file);
        cache.record(Path::new("/src/a.md"), "h1".into());
        // no persist: simulated failed pass

        let cache = BuildCache::load(&file);
        assert!(cache.should_rebuild(Path::new("/src/a.md"), "h1", false));
    }

    #[test]
    fn test_malformed_snapshot_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("cache.json");
        fs::write(&file, "not json at all").unwrap();

        let cache = BuildCache::load(&file);
        assert_eq!(cache.previous_len(), 0);
    }

    #[test]
    fn test_hash_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.md");
        fs::write(&file, "content").unwrap();
        assert_eq!(hash_file(&file).unwrap(), hash_bytes(b"content"));
    }
}
