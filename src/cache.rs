//! Content-hash keyed cache for analyzer results.
//!
//! Caches the output of prior analyzer runs so unchanged projects are not
//! re-analyzed. An entry is only served while every file hash it recorded
//! still matches the tree and its TTL has not elapsed. Eviction is lazy, on
//! the next `get`. Any hashing or I/O trouble degrades to a miss; a cache
//! problem must never abort analysis.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use xxhash_rust::xxh3::xxh3_64;

use crate::analyzer::ComponentResult;
use crate::error::DiscoveryError;

/// In-memory cache of analyzer results, shared across concurrent
/// invocations and across `discover()` calls on the same engine.
pub struct AnalysisCache {
    entries: RwLock<HashMap<u64, CacheEntry>>,
    ttl_secs: u64,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ComponentResult,
    file_hashes: BTreeMap<PathBuf, u64>,
    stored_at: u64,
}

impl AnalysisCache {
    /// Create a cache with the given entry time-to-live.
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_secs,
        }
    }

    /// Cache key for one analyzer against one project. The dependent
    /// analyzer folds a hash of its upstream payloads into
    /// `upstream_hash` so upstream changes invalidate it.
    fn cache_key(project_path: &Path, analyzer: &str, upstream_hash: u64) -> u64 {
        let mut buf = Vec::new();
        buf.extend_from_slice(project_path.to_string_lossy().as_bytes());
        buf.push(0);
        buf.extend_from_slice(analyzer.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&upstream_hash.to_le_bytes());
        xxh3_64(&buf)
    }

    /// Look up a prior result. Misses on TTL expiry or any recorded file
    /// whose content hash has drifted; expired entries are evicted here.
    pub fn get(
        &self,
        project_path: &Path,
        analyzer: &str,
        upstream_hash: u64,
    ) -> Option<ComponentResult> {
        let key = Self::cache_key(project_path, analyzer, upstream_hash);

        let entry = {
            let entries = self.entries.read().ok()?;
            entries.get(&key).cloned()?
        };

        let now = current_timestamp();
        let expired = now.saturating_sub(entry.stored_at) > self.ttl_secs;
        let stale = expired || !Self::hashes_match(&entry.file_hashes);

        if stale {
            if let Ok(mut entries) = self.entries.write() {
                entries.remove(&key);
            }
            return None;
        }

        Some(entry.result)
    }

    /// Store a result, recording the current content hash of every file the
    /// analyzer observed. Results that report no observed files are not
    /// cached: without a file set there is nothing to invalidate on, so we
    /// fail safe toward re-analysis. Errors here mean the result was not
    /// stored; analysis itself is unaffected.
    pub fn put(
        &self,
        project_path: &Path,
        analyzer: &str,
        upstream_hash: u64,
        result: &ComponentResult,
    ) -> Result<(), DiscoveryError> {
        if result.files_observed.is_empty() {
            return Ok(());
        }

        let mut file_hashes = BTreeMap::new();
        for path in &result.files_observed {
            match hash_file(path) {
                Some(h) => {
                    file_hashes.insert(path.clone(), h);
                }
                // Unhashable file: caching this result could serve stale
                // data, so skip the put entirely.
                None => {
                    return Err(DiscoveryError::Cache(format!(
                        "cannot hash observed file {:?}",
                        path
                    )))
                }
            }
        }

        let key = Self::cache_key(project_path, analyzer, upstream_hash);
        let entry = CacheEntry {
            result: result.clone(),
            file_hashes,
            stored_at: current_timestamp(),
        };

        self.entries
            .write()
            .map_err(|_| DiscoveryError::Cache("entry lock poisoned".to_string()))?
            .insert(key, entry);
        Ok(())
    }

    /// Number of live entries, for diagnostics.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all entries.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    fn hashes_match(recorded: &BTreeMap<PathBuf, u64>) -> bool {
        recorded
            .iter()
            .all(|(path, expected)| hash_file(path) == Some(*expected))
    }

    /// Backdate an entry so TTL expiry can be tested without sleeping.
    #[cfg(test)]
    fn backdate(&self, project_path: &Path, analyzer: &str, upstream_hash: u64, secs: u64) {
        let key = Self::cache_key(project_path, analyzer, upstream_hash);
        let mut entries = self.entries.write().unwrap();
        if let Some(entry) = entries.get_mut(&key) {
            entry.stored_at = entry.stored_at.saturating_sub(secs);
        }
    }
}

/// Hash the payloads of upstream results a dependent analyzer consumes.
pub fn upstream_results_hash(results: &BTreeMap<String, ComponentResult>) -> u64 {
    let mut buf = Vec::new();
    for (name, result) in results {
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
        // BTreeMap payloads serialize with stable key ordering.
        if let Ok(json) = serde_json::to_vec(&result.payload) {
            buf.extend_from_slice(&json);
        }
        buf.push(result.status as u8);
        buf.push(0);
    }
    xxh3_64(&buf)
}

/// Content hash of one file, or None on any I/O error.
fn hash_file(path: &Path) -> Option<u64> {
    fs::read(path).ok().map(|bytes| xxh3_64(&bytes))
}

/// Current Unix timestamp in seconds.
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
