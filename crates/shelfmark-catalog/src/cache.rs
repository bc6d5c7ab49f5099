//! Local caches: identified records (write-if-absent) and cover URLs.

use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use shelfmark_core::CanonicalRecord;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{CatalogError, Result};

/// Canonical records keyed by vendor id or normalized ISBN.
pub trait RecordStore: Send + Sync {
    fn get(&self, key: &str) -> Option<CanonicalRecord>;

    /// Store `record` unless `key` already has an entry. Returns whether it
    /// was written.
    fn put_if_absent(&self, key: &str, record: &CanonicalRecord) -> Result<bool>;
}

/// Identifier → cover image URL.
pub trait CoverUrlStore: Send + Sync {
    fn get(&self, identifier: &str) -> Option<String>;

    fn set(&self, identifier: &str, url: &str) -> Result<()>;
}

/// File-name-safe form of a cache key; `None` for blank keys.
fn file_stem(key: &str) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some(
        key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
    )
}

fn cache_err(path: &Path, e: impl std::fmt::Display) -> CatalogError {
    CatalogError::Cache(format!("{}: {e}", path.display()))
}

fn temp_in(dir: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    std::fs::create_dir_all(dir).map_err(|e| cache_err(dir, e))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| cache_err(dir, e))?;
    tmp.write_all(contents).map_err(|e| cache_err(dir, e))?;
    tmp.flush().map_err(|e| cache_err(dir, e))?;
    Ok(tmp)
}

// ─── DiskRecordCache ─────────────────────────────────────────────────────────

/// One JSON file per key under `dir`. Entries are created atomically and
/// never overwritten.
#[derive(Debug, Clone)]
pub struct DiskRecordCache {
    dir: PathBuf,
}

impl DiskRecordCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        file_stem(key).map(|stem| self.dir.join(format!("{stem}.json")))
    }
}

impl RecordStore for DiskRecordCache {
    fn get(&self, key: &str) -> Option<CanonicalRecord> {
        let path = self.entry_path(key)?;
        let data = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %path.display(), "unreadable cache entry: {e}");
                None
            }
        }
    }

    fn put_if_absent(&self, key: &str, record: &CanonicalRecord) -> Result<bool> {
        let path = self
            .entry_path(key)
            .ok_or_else(|| CatalogError::Cache("empty cache key".to_string()))?;
        if path.exists() {
            return Ok(false);
        }

        let json = serde_json::to_vec_pretty(record).map_err(|e| cache_err(&path, e))?;
        let tmp = temp_in(&self.dir, &json)?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!(path = %path.display(), "cached record");
                Ok(true)
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(cache_err(&path, e.error)),
        }
    }
}

// ─── DiskCoverUrlCache ───────────────────────────────────────────────────────

/// One `.url` text file per identifier; later writes replace earlier ones.
#[derive(Debug, Clone)]
pub struct DiskCoverUrlCache {
    dir: PathBuf,
}

impl DiskCoverUrlCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, identifier: &str) -> Option<PathBuf> {
        file_stem(identifier).map(|stem| self.dir.join(format!("{stem}.url")))
    }
}

impl CoverUrlStore for DiskCoverUrlCache {
    fn get(&self, identifier: &str) -> Option<String> {
        let path = self.entry_path(identifier)?;
        let url = std::fs::read_to_string(path).ok()?;
        let url = url.trim();
        (!url.is_empty()).then(|| url.to_string())
    }

    fn set(&self, identifier: &str, url: &str) -> Result<()> {
        let path = self
            .entry_path(identifier)
            .ok_or_else(|| CatalogError::Cache("empty cover key".to_string()))?;
        let tmp = temp_in(&self.dir, url.trim().as_bytes())?;
        tmp.persist(&path).map_err(|e| cache_err(&path, e.error))?;
        Ok(())
    }
}

// ─── MemoryCoverUrlCache ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryCoverUrlCache {
    urls: RwLock<HashMap<String, String>>,
}

impl MemoryCoverUrlCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoverUrlStore for MemoryCoverUrlCache {
    fn get(&self, identifier: &str) -> Option<String> {
        let urls = self.urls.read().unwrap_or_else(|e| e.into_inner());
        urls.get(identifier).cloned()
    }

    fn set(&self, identifier: &str, url: &str) -> Result<()> {
        let mut urls = self.urls.write().unwrap_or_else(|e| e.into_inner());
        urls.insert(identifier.to_string(), url.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_if_absent_keeps_first_payload() {
        let dir = TempDir::new().unwrap();
        let cache = DiskRecordCache::new(dir.path().join("records"));

        let first = CanonicalRecord::new("First", vec!["A".into()]);
        let second = CanonicalRecord::new("Second", vec!["B".into()]);

        assert!(cache.put_if_absent("B0085UEQDO", &first).unwrap());
        let path = dir.path().join("records").join("B0085UEQDO.json");
        let before = std::fs::read(&path).unwrap();

        assert!(!cache.put_if_absent("B0085UEQDO", &second).unwrap());
        let after = std::fs::read(&path).unwrap();
        assert_eq!(before, after);
        assert_eq!(cache.get("B0085UEQDO").unwrap().title, "First");
    }

    #[test]
    fn missing_and_corrupt_entries_read_as_absent() {
        let dir = TempDir::new().unwrap();
        let cache = DiskRecordCache::new(dir.path());
        assert!(cache.get("nothing").is_none());
        assert!(cache.get("  ").is_none());

        std::fs::write(dir.path().join("broken.json"), b"{not json").unwrap();
        assert!(cache.get("broken").is_none());
    }

    #[test]
    fn keys_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let cache = DiskRecordCache::new(dir.path());
        let record = CanonicalRecord::new("T", vec![]);
        assert!(cache.put_if_absent("../escape/key", &record).unwrap());
        assert!(dir.path().join("___escape_key.json").exists());
        assert!(cache.get("../escape/key").is_some());
        assert!(cache.put_if_absent("", &record).is_err());
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let cache = DiskRecordCache::new(dir.path());
        let record = CanonicalRecord::new("T", vec![]);
        cache.put_if_absent("k1", &record).unwrap();
        cache.put_if_absent("k1", &record).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["k1.json".to_string()]);
    }

    #[test]
    fn disk_cover_urls_overwrite() {
        let dir = TempDir::new().unwrap();
        let covers = DiskCoverUrlCache::new(dir.path());
        assert!(covers.get("B1").is_none());
        covers.set("B1", "https://img/1.jpg").unwrap();
        covers.set("B1", "https://img/2.jpg").unwrap();
        assert_eq!(covers.get("B1").as_deref(), Some("https://img/2.jpg"));
    }

    #[test]
    fn memory_cover_urls() {
        let covers = MemoryCoverUrlCache::new();
        covers.set("9780982514504", "https://img/x.jpg").unwrap();
        assert_eq!(
            covers.get("9780982514504").as_deref(),
            Some("https://img/x.jpg")
        );
        assert!(covers.get("other").is_none());
    }
}
