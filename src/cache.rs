//! Content-addressed on-disk cache with TTL and size-bound eviction.
//!
//! Used as the write-through layer under [`ConfigStore`](crate::config::ConfigStore)
//! and for memoizing expensive computations ([`CacheManager::memoize`]).
//!
//! ## Keys
//!
//! A lookup key is hashed with SHA-256:
//!
//! - if the key string names an existing file, the file's **bytes** are hashed,
//!   so an edited file never hits a stale entry;
//! - otherwise the string itself is hashed. Structured keys are hashed from
//!   their JSON form ([`structural_key`]).
//!
//! With a category the stored key becomes `"{category}_{hash}"`, which keeps
//! `clear_cache(Some(category))` a metadata-only scan.
//!
//! ## Storage
//!
//! ```text
//! cache/
//! ├── metadata.json          # index: last_cleanup + one record per entry
//! ├── 3f2a…e1                # entry file, JSON value, named by key
//! └── config_9b1c…04
//! ```
//!
//! The index is rewritten whole after every mutation, under the same lock that
//! guards the in-memory copy. A record whose entry file has disappeared is
//! purged the first time it is looked up.
//!
//! ## Cleanup
//!
//! At most once a day (measured from `last_cleanup`) a background thread
//! removes entries older than `max_age`, then evicts least-recently-accessed
//! entries until the directory is below 80% of `max_size_bytes`.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use thiserror::Error;
use walkdir::WalkDir;

/// Name of the index file inside the cache directory.
const INDEX_FILENAME: &str = "metadata.json";

pub const DEFAULT_MAX_SIZE_MB: u64 = 500;
pub const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// Fraction of the size cap that eviction shrinks the cache to.
const EVICTION_TARGET: f64 = 0.8;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Index record for one cached value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub category: String,
}

/// On-disk mirror of the cache index (`metadata.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheIndex {
    last_cleanup: DateTime<Utc>,
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheIndex {
    fn empty() -> Self {
        Self {
            last_cleanup: Utc::now(),
            entries: BTreeMap::new(),
        }
    }

    /// Missing or unreadable index files start a fresh index.
    fn load(dir: &Path) -> Self {
        let path = dir.join(INDEX_FILENAME);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        match serde_json::from_str(&content) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("discarding unreadable cache index {}: {e}", path.display());
                Self::empty()
            }
        }
    }

    fn save(&self, dir: &Path) -> Result<(), CacheError> {
        let path = dir.join(INDEX_FILENAME);
        let tmp = dir.join(format!("{INDEX_FILENAME}.tmp"));
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Where the cache lives and how large/old it may grow.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub cache_dir: PathBuf,
    pub max_size_bytes: u64,
    pub max_age: Duration,
}

impl CacheSettings {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_size_bytes: DEFAULT_MAX_SIZE_MB * 1024 * 1024,
            max_age: Duration::days(DEFAULT_MAX_AGE_DAYS),
        }
    }

    pub fn with_max_size_mb(mut self, mb: u64) -> Self {
        self.max_size_bytes = mb * 1024 * 1024;
        self
    }

    pub fn with_max_age_days(mut self, days: i64) -> Self {
        self.max_age = Duration::days(days);
        self
    }

    /// `<platform config dir>/TifTiff/cache`, or `./TifTiff/cache` when the
    /// platform has none.
    pub fn default_location() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("TifTiff")
            .join("cache")
    }
}

/// Summary returned by [`CacheManager::get_cache_info`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheInfo {
    pub total_entries: usize,
    pub total_size: u64,
    pub total_size_human: String,
    pub categories: BTreeMap<String, usize>,
    pub last_cleanup: DateTime<Utc>,
}

impl fmt::Display for CacheInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries, {} on disk",
            self.total_entries, self.total_size_human
        )?;
        if !self.categories.is_empty() {
            let parts: Vec<String> = self
                .categories
                .iter()
                .map(|(name, count)| format!("{name}: {count}"))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        Ok(())
    }
}

struct Inner {
    dir: PathBuf,
    max_size_bytes: u64,
    max_age: Duration,
    index: Mutex<CacheIndex>,
    cleanup_worker: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheIndex> {
        // A panic while holding the lock leaves a usable index; keep going.
        self.index.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, index: &CacheIndex) {
        if let Err(e) = index.save(&self.dir) {
            tracing::warn!("failed to save cache index: {e}");
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn remove_entry(&self, index: &mut CacheIndex, key: &str) -> u64 {
        let path = self.entry_path(key);
        let freed = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if path.exists()
            && let Err(e) = std::fs::remove_file(&path)
        {
            tracing::warn!("failed to remove cache entry {key}: {e}");
        }
        index.entries.remove(key);
        freed
    }

    fn directory_size(&self) -> u64 {
        WalkDir::new(&self.dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum()
    }

    /// Expire old entries, then shrink to the eviction target if over the cap.
    fn cleanup(&self) {
        let mut index = self.lock();
        let now = Utc::now();
        index.last_cleanup = now;

        let expired: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, entry)| now - entry.created_at > self.max_age)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove_entry(&mut index, key);
        }

        let mut size = self.directory_size();
        if size > self.max_size_bytes {
            let target = (self.max_size_bytes as f64 * EVICTION_TARGET) as u64;
            let mut by_access: Vec<(String, DateTime<Utc>, DateTime<Utc>)> = index
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.last_accessed, e.created_at))
                .collect();
            by_access.sort_by(|a, b| (a.1, a.2, &a.0).cmp(&(b.1, b.2, &b.0)));

            for (key, _, _) in by_access {
                let freed = self.remove_entry(&mut index, &key);
                size = size.saturating_sub(freed);
                if size < target {
                    break;
                }
            }
            tracing::debug!("cache eviction finished at {size} bytes");
        }

        self.persist(&index);
    }

    /// Shared by `has_cache` and `get_cache`: true when the record and its file
    /// both exist. Refreshes `last_accessed` on a hit, purges the record when
    /// the file is gone.
    fn touch(&self, index: &mut CacheIndex, key: &str) -> bool {
        if !index.entries.contains_key(key) {
            return false;
        }
        if self.entry_path(key).is_file() {
            if let Some(entry) = index.entries.get_mut(key) {
                entry.last_accessed = Utc::now();
            }
            self.persist(index);
            true
        } else {
            index.entries.remove(key);
            self.persist(index);
            false
        }
    }
}

/// Handle to a cache directory. Cloning is cheap; clones share one index.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl CacheManager {
    /// Open (or create) a cache directory and schedule cleanup if it is due.
    pub fn open(settings: CacheSettings) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&settings.cache_dir)?;
        let index = CacheIndex::load(&settings.cache_dir);
        let due = Utc::now() - index.last_cleanup > Duration::days(1);

        let manager = Self {
            inner: Arc::new(Inner {
                dir: settings.cache_dir,
                max_size_bytes: settings.max_size_bytes,
                max_age: settings.max_age,
                index: Mutex::new(index),
                cleanup_worker: Mutex::new(None),
            }),
        };
        if due {
            manager.spawn_cleanup();
        }
        Ok(manager)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.inner.dir
    }

    fn spawn_cleanup(&self) {
        let inner = Arc::clone(&self.inner);
        let handle = std::thread::spawn(move || inner.cleanup());
        if let Ok(mut worker) = self.inner.cleanup_worker.lock() {
            *worker = Some(handle);
        }
    }

    /// Run cleanup on the calling thread, regardless of when it last ran.
    pub fn cleanup_now(&self) {
        self.inner.cleanup();
    }

    /// Join a background cleanup started by [`open`](Self::open), if any.
    pub fn wait_for_cleanup(&self) {
        let handle = match self.inner.cleanup_worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// Stored key for `data`, namespaced by `category` when given.
    pub fn key_for(&self, data: &str, category: Option<&str>) -> String {
        let hash = content_key(data);
        match category {
            Some(cat) => format!("{cat}_{hash}"),
            None => hash,
        }
    }

    pub fn has_cache(&self, data: &str, category: Option<&str>) -> bool {
        let key = self.key_for(data, category);
        let mut index = self.inner.lock();
        self.inner.touch(&mut index, &key)
    }

    pub fn get_cache(&self, data: &str, category: Option<&str>) -> Option<serde_json::Value> {
        let key = self.key_for(data, category);
        let mut index = self.inner.lock();
        if !self.inner.touch(&mut index, &key) {
            return None;
        }
        let read = std::fs::read_to_string(self.inner.entry_path(&key))
            .map_err(CacheError::from)
            .and_then(|s| serde_json::from_str(&s).map_err(CacheError::from));
        match read {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("failed to read cache entry {key}: {e}");
                None
            }
        }
    }

    /// Typed variant of [`get_cache`](Self::get_cache); a value that does not
    /// deserialize as `T` counts as a miss.
    pub fn get_cache_as<T: DeserializeOwned>(&self, data: &str, category: Option<&str>) -> Option<T> {
        self.get_cache(data, category)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Store a value, logging and returning `false` on failure.
    pub fn set_cache<V: Serialize + ?Sized>(&self, data: &str, value: &V, category: Option<&str>) -> bool {
        match self.try_set_cache(data, value, category) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("failed to write cache entry: {e}");
                false
            }
        }
    }

    pub fn try_set_cache<V: Serialize + ?Sized>(
        &self,
        data: &str,
        value: &V,
        category: Option<&str>,
    ) -> Result<(), CacheError> {
        let key = self.key_for(data, category);
        let json = serde_json::to_string(value)?;
        let mut index = self.inner.lock();
        std::fs::write(self.inner.entry_path(&key), json)?;
        let now = Utc::now();
        index.entries.insert(
            key,
            CacheEntry {
                created_at: now,
                last_accessed: now,
                category: category.unwrap_or("default").to_string(),
            },
        );
        index.save(&self.inner.dir)
    }

    /// Remove every entry, or only those of one category. Returns the count.
    pub fn clear_cache(&self, category: Option<&str>) -> usize {
        let mut index = self.inner.lock();
        let doomed: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, e)| category.is_none_or(|c| e.category == c))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.inner.remove_entry(&mut index, key);
        }
        self.inner.persist(&index);
        doomed.len()
    }

    pub fn get_cache_info(&self) -> CacheInfo {
        let index = self.inner.lock();
        let mut categories = BTreeMap::new();
        for entry in index.entries.values() {
            *categories.entry(entry.category.clone()).or_insert(0) += 1;
        }
        let total_size = self.inner.directory_size();
        CacheInfo {
            total_entries: index.entries.len(),
            total_size,
            total_size_human: crate::output::format_size(total_size),
            categories,
            last_cleanup: index.last_cleanup,
        }
    }

    /// Return the cached result for `key` (category `function`) or compute,
    /// store, and return it.
    pub fn memoize<K, T, F>(&self, key: &K, compute: F) -> T
    where
        K: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let data = serde_json::to_string(key).unwrap_or_default();
        if let Some(hit) = self.get_cache_as::<T>(&data, Some("function")) {
            return hit;
        }
        let value = compute();
        self.set_cache(&data, &value, Some("function"));
        value
    }
}

/// SHA-256 of a file's bytes when `data` names one, else of the string.
fn content_key(data: &str) -> String {
    let path = Path::new(data);
    if path.is_file()
        && let Ok(bytes) = std::fs::read(path)
    {
        return format!("{:x}", Sha256::digest(&bytes));
    }
    format!("{:x}", Sha256::digest(data.as_bytes()))
}

/// Key string for a structured value: its JSON serialization.
///
/// Use ordered containers (`BTreeMap`) so equal values serialize identically.
pub fn structural_key<K: Serialize + ?Sized>(data: &K) -> Result<String, CacheError> {
    Ok(serde_json::to_string(data)?)
}
