//! Content-fingerprint cache.
//!
//! Any configuration or build operation can be wrapped with [`Cache::call`].
//! The result is stored under a [`CacheKey`] built from the operation name
//! and a digest of all its resolved inputs (file contents, not mtimes). When
//! the same key is requested again, in this run or a later one, the stored
//! result is returned and the operation is not run.
//!
//! Rules:
//! - failures are never stored
//! - a record whose promised output files are missing is a miss
//! - each key is computed at most once per run, even under concurrency
//!
//! Records persist as JSON in `<output-root>/toolforge-db.json`.

mod key;

pub use key::{CacheKey, KeyBuilder};

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::util::fs::ensure_dir;

/// File name of the cache database inside the output root.
pub const DB_FILE: &str = "toolforge-db.json";

const DB_VERSION: u32 = 1;

/// A value that can be stored in the cache.
pub trait Cached: Serialize + DeserializeOwned {
    /// Files this value refers to. If any is missing on lookup, the record
    /// is stale.
    fn outputs(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

impl Cached for PathBuf {
    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.clone()]
    }
}

impl Cached for Vec<PathBuf> {
    fn outputs(&self) -> Vec<PathBuf> {
        self.clone()
    }
}

impl Cached for bool {}
impl Cached for String {}
impl Cached for () {}

/// One stored result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub value: serde_json::Value,
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Database {
    version: u32,
    records: BTreeMap<String, CacheRecord>,
}

/// Hit/miss counters for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

type Memo = Arc<dyn Any + Send + Sync>;

/// The persistent cache.
pub struct Cache {
    path: Option<PathBuf>,
    records: Mutex<BTreeMap<String, CacheRecord>>,
    key_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    memo: Mutex<HashMap<String, Memo>>,
    dirty: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("path", &self.path)
            .field("stats", &self.stats())
            .finish()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panic while holding a cache lock leaves the map itself intact.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Cache {
    /// Open (or create) the database at `path`.
    ///
    /// An unreadable or incompatible database is discarded with a warning.
    pub fn open(path: &Path) -> Result<Self> {
        let records = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read cache database: {}", path.display()))?;
            match serde_json::from_str::<Database>(&content) {
                Ok(db) if db.version == DB_VERSION => db.records,
                Ok(db) => {
                    tracing::warn!(
                        "discarding cache database with version {} (expected {})",
                        db.version,
                        DB_VERSION
                    );
                    BTreeMap::new()
                }
                Err(e) => {
                    tracing::warn!("discarding unreadable cache database {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!("opened cache {} ({} records)", path.display(), records.len());

        Ok(Cache {
            path: Some(path.to_path_buf()),
            records: Mutex::new(records),
            key_locks: Mutex::new(HashMap::new()),
            memo: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// A cache that is never written to disk.
    pub fn in_memory() -> Self {
        Cache {
            path: None,
            records: Mutex::new(BTreeMap::new()),
            key_locks: Mutex::new(HashMap::new()),
            memo: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        lock(&self.key_locks)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Return the stored result for `key`, or run `compute` and store it.
    ///
    /// `compute` must not call back into the scheduler: a worker blocked on
    /// this key's lock cannot steal the work it waits for.
    pub fn call<T, F>(&self, key: &CacheKey, compute: F) -> Result<T>
    where
        T: Cached,
        F: FnOnce() -> Result<T>,
    {
        let id = key.to_string();
        let key_lock = self.key_lock(&id);
        let _guard = lock(&key_lock);

        if let Some(value) = self.lookup::<T>(&id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("cache hit: {}", key.op());
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("cache miss: {}", key.op());

        let value = compute()?;
        self.store(&id, &value)?;
        Ok(value)
    }

    fn lookup<T: Cached>(&self, id: &str) -> Option<T> {
        let record = lock(&self.records).get(id).cloned()?;

        if let Some(missing) = record.outputs.iter().find(|p| !p.exists()) {
            tracing::debug!("stale cache record, missing {}", missing.display());
            return None;
        }

        match serde_json::from_value(record.value) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("cache record did not deserialize: {}", e);
                None
            }
        }
    }

    fn store<T: Cached>(&self, id: &str, value: &T) -> Result<()> {
        let record = CacheRecord {
            value: serde_json::to_value(value).context("failed to serialize cache record")?,
            outputs: value.outputs(),
        };
        lock(&self.records).insert(id.to_string(), record);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// In-run memoization for values that are not serializable, such as
    /// builder handles. Computed at most once per `key` per run.
    pub fn memo<T, F>(&self, key: &str, compute: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T>,
    {
        let id = format!("memo:{}", key);
        let key_lock = self.key_lock(&id);
        let _guard = lock(&key_lock);

        if let Some(existing) = lock(&self.memo).get(&id).cloned() {
            if let Ok(value) = existing.downcast::<T>() {
                return Ok(value);
            }
        }

        let value = Arc::new(compute()?);
        lock(&self.memo).insert(id, value.clone() as Memo);
        Ok(value)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the database if anything changed. The file is replaced
    /// atomically.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let db = Database {
            version: DB_VERSION,
            records: lock(&self.records).clone(),
        };
        let json = serde_json::to_vec_pretty(&db).context("failed to serialize cache database")?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&json)?;
        tmp.persist(path)
            .with_context(|| format!("failed to write cache database: {}", path.display()))?;

        tracing::debug!("wrote cache database {} ({} records)", path.display(), db.records.len());
        Ok(())
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!("failed to save cache: {:#}", e);
        }
    }
}
