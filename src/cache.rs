//! Content-addressed local disk cache for test artifacts.
//!
//! Artifacts live in the remote object store under their MD5 hash; the
//! cache materializes them as local files named `<bucket>_<hash>` inside
//! the cache directory. The in-memory map is the source of truth; keys
//! are never reconstructed from filenames, and files on disk without a
//! map entry are garbage for the next restart to overwrite.
//!
//! Bookkeeping invariants, enforced on every access path:
//! - a returned path's content hashes to the requested key, verified
//!   against the stored checksum before every hit;
//! - expired entries are evicted on access and by the background reaper;
//! - total on-disk footprint never exceeds `max_usage`; admission evicts
//!   least-recently-used entries first and fails with `DiskFull` when
//!   eviction cannot make room.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics::JudgeMetrics;
use crate::storage::{content_hash, ArtifactStore};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    bucket: String,
    hash: String,
}

#[derive(Debug)]
struct CachedFile {
    path: PathBuf,
    size: u64,
    expire_at: Instant,
    last_access: Instant,
    checksum: String,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CachedFile>,
    current_usage: u64,
}

/// Usage counters for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub current_usage: u64,
    pub max_usage: u64,
}

pub struct ArtifactCache {
    cache_dir: PathBuf,
    ttl: Duration,
    clean_frequency: Duration,
    max_usage: u64,
    store: Arc<dyn ArtifactStore>,
    metrics: Arc<JudgeMetrics>,
    inner: Mutex<CacheInner>,
}

impl ArtifactCache {
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        ttl: Duration,
        clean_frequency: Duration,
        max_usage: u64,
        store: Arc<dyn ArtifactStore>,
        metrics: Arc<JudgeMetrics>,
    ) -> Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            cache_dir,
            ttl,
            clean_frequency,
            max_usage,
            store,
            metrics,
            inner: Mutex::new(CacheInner::default()),
        })
    }

    /// Return a local path whose content hashes to `hash`, fetching from
    /// the remote store on a miss.
    pub async fn resolve_path(&self, bucket: &str, hash: &str) -> Result<PathBuf> {
        if let Some(path) = self.lookup(bucket, hash).await {
            self.metrics.record_cache_hit();
            debug!(bucket, hash, "cache hit");
            return Ok(path);
        }
        self.metrics.record_cache_miss();
        debug!(bucket, hash, "cache miss, fetching from store");

        // Concurrent misses for the same key may each fetch; the install
        // below is serialized and last-writer-wins on identical content.
        let data = self.store.fetch(bucket, hash).await?;
        let actual = content_hash(&data);
        if actual != hash {
            return Err(Error::CacheIntegrity {
                expected: hash.to_string(),
                actual,
            });
        }

        self.install(bucket, hash, &data).await
    }

    /// Resolve the artifact and read it as UTF-8 text.
    pub async fn load_text(&self, bucket: &str, hash: &str) -> Result<String> {
        let path = self.resolve_path(bucket, hash).await?;
        Ok(tokio::fs::read_to_string(&path).await?)
    }

    /// Look up a key, validating expiry, existence, and integrity. Invalid
    /// entries are evicted and reported as a miss.
    async fn lookup(&self, bucket: &str, hash: &str) -> Option<PathBuf> {
        let key = CacheKey {
            bucket: bucket.to_string(),
            hash: hash.to_string(),
        };
        let mut inner = self.inner.lock().await;
        let now = Instant::now();

        let (path, checksum, expired) = {
            let entry = inner.entries.get(&key)?;
            (
                entry.path.clone(),
                entry.checksum.clone(),
                now > entry.expire_at,
            )
        };

        if expired {
            debug!(bucket, hash, "cache entry expired");
            Self::evict(&mut inner, &key).await;
            return None;
        }

        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(_) => {
                warn!(bucket, hash, "cache file vanished, evicting entry");
                Self::evict(&mut inner, &key).await;
                return None;
            }
        };
        if content_hash(&content) != checksum {
            warn!(bucket, hash, "cache file failed integrity check, evicting");
            Self::evict(&mut inner, &key).await;
            return None;
        }

        let entry = inner.entries.get_mut(&key)?;
        entry.last_access = now;
        Some(path)
    }

    /// Install freshly fetched content. Serialized by the cache mutex;
    /// the file is written to a temp name and atomically renamed so a
    /// partially written artifact is never observable at the final path.
    async fn install(&self, bucket: &str, hash: &str, data: &[u8]) -> Result<PathBuf> {
        let key = CacheKey {
            bucket: bucket.to_string(),
            hash: hash.to_string(),
        };
        let size = data.len() as u64;
        let path = self.entry_path(bucket, hash);

        let mut inner = self.inner.lock().await;

        // A concurrent miss may have installed the same key already.
        Self::evict(&mut inner, &key).await;

        if inner.current_usage + size > self.max_usage {
            Self::evict_lru_until(&mut inner, self.max_usage.saturating_sub(size)).await;
        }
        if inner.current_usage + size > self.max_usage {
            return Err(Error::DiskFull {
                needed: size,
                quota: self.max_usage,
            });
        }

        let tmp = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        std::io::Write::write_all(&mut tmp.as_file(), data)?;
        tmp.persist(&path)
            .map_err(|e| Error::Io(e.error))?;

        let now = Instant::now();
        inner.entries.insert(
            key,
            CachedFile {
                path: path.clone(),
                size,
                expire_at: now + self.ttl,
                last_access: now,
                checksum: hash.to_string(),
            },
        );
        inner.current_usage += size;

        Ok(path)
    }

    /// Remove a single entry and its file.
    async fn evict(inner: &mut CacheInner, key: &CacheKey) {
        if let Some(entry) = inner.entries.remove(key) {
            inner.current_usage = inner.current_usage.saturating_sub(entry.size);
            let _ = tokio::fs::remove_file(&entry.path).await;
        }
    }

    /// Evict least-recently-used entries until usage is at most `target`.
    async fn evict_lru_until(inner: &mut CacheInner, target: u64) {
        let mut by_age: Vec<(CacheKey, Instant)> = inner
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.last_access))
            .collect();
        by_age.sort_by_key(|(_, last_access)| *last_access);

        for (key, _) in by_age {
            if inner.current_usage <= target {
                break;
            }
            debug!(bucket = %key.bucket, hash = %key.hash, "evicting LRU cache entry");
            Self::evict(inner, &key).await;
        }
    }

    /// Drop all entries whose TTL has passed.
    pub async fn sweep_expired(&self) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let expired: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| now > entry.expire_at)
            .map(|(key, _)| key.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            Self::evict(&mut inner, &key).await;
        }
        if count > 0 {
            info!(evicted = count, "cache reaper removed expired entries");
        }
    }

    /// Start the periodic reaper. The handle can be aborted at shutdown.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.clean_frequency);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // interval fires immediately; skip the initial tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.sweep_expired().await;
            }
        })
    }

    /// Remove every entry and its file.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        for (_, entry) in inner.entries.drain() {
            let _ = tokio::fs::remove_file(&entry.path).await;
        }
        inner.current_usage = 0;
    }

    pub async fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().await;
        CacheStats {
            entries: inner.entries.len(),
            current_usage: inner.current_usage,
            max_usage: self.max_usage,
        }
    }

    fn entry_path(&self, bucket: &str, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{}_{}", bucket, hash))
    }
}

/// Convenience used by tests and callers that already hold the directory.
pub fn cache_file_name(dir: &Path, bucket: &str, hash: &str) -> PathBuf {
    dir.join(format!("{}_{}", bucket, hash))
}
