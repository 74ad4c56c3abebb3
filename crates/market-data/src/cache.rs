use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use scoring_core::ScoringError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// File-based cache of API responses.
///
/// One JSON file per key. Entry age is taken from the file's mtime;
/// expired or unreadable entries are evicted on read.
pub struct FileCache {
    dir: PathBuf,
    default_ttl: Duration,
}

impl FileCache {
    pub fn new(dir: impl Into<PathBuf>, default_ttl_hours: u64) -> Result<Self, ScoringError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| ScoringError::Cache(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self {
            dir,
            default_ttl: Duration::from_secs(default_ttl_hours * 3600),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys may contain index symbols like ^GSPC; keep filenames safe
        let safe: String = key
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }

    /// Fetch a cached value if present and younger than `ttl` (or the
    /// default TTL when `ttl` is None).
    pub fn get<T: DeserializeOwned>(&self, key: &str, ttl: Option<Duration>) -> Option<T> {
        let path = self.path_for(key);
        let metadata = std::fs::metadata(&path).ok()?;
        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())?;

        if age > ttl.unwrap_or(self.default_ttl) {
            evict(&path);
            return None;
        }

        let raw = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("evicting corrupt cache entry {}: {e}", path.display());
                evict(&path);
                None
            }
        }
    }

    /// Store a value. Cache write failures are logged, never fatal.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let path = self.path_for(key);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("cannot serialize cache entry {key}: {e}");
                return;
            }
        };
        if let Err(e) = std::fs::write(&path, raw) {
            tracing::warn!("cannot write cache entry {}: {e}", path.display());
        }
    }

    pub fn invalidate(&self, key: &str) {
        evict(&self.path_for(key));
    }

    pub fn clear_all(&self) -> Result<(), ScoringError> {
        let entries = std::fs::read_dir(&self.dir)
            .map_err(|e| ScoringError::Cache(format!("cannot read {}: {e}", self.dir.display())))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                evict(&path);
            }
        }
        Ok(())
    }
}

fn evict(path: &Path) {
    let _ = std::fs::remove_file(path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path(), 24).unwrap();
        cache.set("AAPL_price", &vec![1.0, 2.0, 3.0]);
        let cached: Option<Vec<f64>> = cache.get("AAPL_price", None);
        assert_eq!(cached, Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path(), 24).unwrap();
        cache.set("stale", &42u32);
        let cached: Option<u32> = cache.get("stale", Some(Duration::ZERO));
        assert_eq!(cached, None);
        // A second read misses as well: the entry was removed
        let cached: Option<u32> = cache.get("stale", None);
        assert_eq!(cached, None);
    }

    #[test]
    fn test_corrupt_entry_is_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path(), 24).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let cached: Option<Vec<f64>> = cache.get("bad", None);
        assert_eq!(cached, None);
    }

    #[test]
    fn test_unsafe_key_characters_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path(), 24).unwrap();
        cache.set("^GSPC_price/10y", &1u8);
        let cached: Option<u8> = cache.get("^GSPC_price/10y", None);
        assert_eq!(cached, Some(1));
    }
}
