//! Disk-based byte cache with a journaled LRU index.
//!
//! Files are named after a hash of their key, written to a temporary file
//! first and renamed into place, and only indexed once the rename succeeds.
//! The index is snapshotted to `journal.json` after every insert or removal.
//! Reads only bump the in-memory access order; that is written out with the
//! next mutation, on [`DiskImageCache::flush`], or when the cache is dropped.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::{CacheError, CacheResult};

use super::memory_cache::CacheStats;

/// Default disk cache size in bytes (10 MiB).
pub const DEFAULT_DISK_CAPACITY: u64 = 10 * 1024 * 1024;

const JOURNAL_FILE: &str = "journal.json";
const JOURNAL_VERSION: u32 = 1;
const DATA_EXTENSION: &str = "img";
const TEMP_EXTENSION: &str = "tmp";

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    key: String,
    size: u64,
    last_access: DateTime<Utc>,
    access_seq: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Journal {
    version: u32,
    sequence: u64,
    entries: Vec<JournalEntry>,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    size: u64,
    last_access: DateTime<Utc>,
    access_seq: u64,
}

#[derive(Debug, Default)]
struct DiskIndex {
    entries: HashMap<CacheKey, IndexEntry>,
    total_size: u64,
    sequence: u64,
    evictions: u64,
    /// Access order changed since the journal was last written.
    dirty: bool,
}

impl DiskIndex {
    fn next_seq(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn touch(&mut self, key: &CacheKey) {
        let seq = self.next_seq();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.access_seq = seq;
            entry.last_access = Utc::now();
            self.dirty = true;
        }
    }

    fn record(&mut self, key: CacheKey, size: u64) {
        let seq = self.next_seq();
        let entry = IndexEntry {
            size,
            last_access: Utc::now(),
            access_seq: seq,
        };
        if let Some(old) = self.entries.insert(key, entry) {
            self.total_size -= old.size;
        }
        self.total_size += size;
    }

    fn forget(&mut self, key: &CacheKey) -> Option<IndexEntry> {
        let entry = self.entries.remove(key)?;
        self.total_size -= entry.size;
        Some(entry)
    }

    fn to_journal(&self) -> Journal {
        let mut entries: Vec<JournalEntry> = self
            .entries
            .iter()
            .map(|(key, e)| JournalEntry {
                key: key.as_str().to_string(),
                size: e.size,
                last_access: e.last_access,
                access_seq: e.access_seq,
            })
            .collect();
        entries.sort_by_key(|e| e.access_seq);
        Journal {
            version: JOURNAL_VERSION,
            sequence: self.sequence,
            entries,
        }
    }
}

/// Persistent, size-bounded LRU cache of raw byte blobs.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    max_size: u64,
    index: Mutex<DiskIndex>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DiskImageCache {
    /// Opens (or creates) a cache in `cache_dir`, recovering its journal.
    ///
    /// Journal entries whose file is missing or has the wrong size are
    /// dropped; temporary and unindexed files are deleted.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created or read.
    pub async fn open(cache_dir: PathBuf, max_size: u64) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::io(format!("Failed to create cache dir: {e}")))?;

        let cache = Self {
            cache_dir,
            max_size,
            index: Mutex::new(DiskIndex::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        };

        {
            let mut index = cache.index.lock().await;
            *index = cache.recover_index().await?;
            cache.evict_if_needed(&mut index).await;
            cache.persist_journal(&mut index).await?;
            debug!(
                dir = %cache.cache_dir.display(),
                entries = index.entries.len(),
                size = index.total_size,
                "Opened disk cache"
            );
        }

        Ok(cache)
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Configured byte budget.
    #[must_use]
    pub const fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Returns the file path used for `key`, whether or not it is indexed.
    #[must_use]
    pub fn create_file_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{DATA_EXTENSION}", key.file_stem()))
    }

    /// Returns true if `key` is indexed.
    pub async fn contains_key(&self, key: &CacheKey) -> bool {
        self.index.lock().await.entries.contains_key(key)
    }

    /// Returns the path of the cached file for `key`, marking it used.
    ///
    /// An indexed entry whose file is gone or truncated is dropped and
    /// reported as absent.
    pub async fn get_path(&self, key: &CacheKey) -> Option<PathBuf> {
        let mut index = self.index.lock().await;
        let Some(expected) = index.entries.get(key).map(|e| e.size) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Disk cache miss");
            return None;
        };

        let path = self.create_file_path(key);
        match fs::metadata(&path).await {
            Ok(meta) if meta.len() == expected => {
                index.touch(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                Some(path)
            }
            Ok(meta) => {
                let err = CacheError::corruption(format!(
                    "expected {expected} bytes, found {}",
                    meta.len()
                ));
                self.drop_corrupt(&mut index, key, &path, &err).await;
                None
            }
            Err(e) => {
                let err = CacheError::corruption(format!("indexed file unreadable: {e}"));
                self.drop_corrupt(&mut index, key, &path, &err).await;
                None
            }
        }
    }

    /// Reads the cached bytes for `key`.
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let path = self.get_path(key).await?;
        match fs::read(&path).await {
            Ok(bytes) => Some(Bytes::from(bytes)),
            // Evicted or replaced between lookup and read; the next lookup
            // revalidates the entry.
            Err(e) => {
                debug!(key = %key, error = %e, "Cached file vanished before read");
                None
            }
        }
    }

    /// Returns the modification time of the cached file for `key`.
    pub async fn last_modified(&self, key: &CacheKey) -> Option<SystemTime> {
        if !self.contains_key(key).await {
            return None;
        }
        fs::metadata(self.create_file_path(key))
            .await
            .and_then(|m| m.modified())
            .ok()
    }

    /// Stores `bytes` under `key`, replacing any previous entry.
    ///
    /// The bytes are written to a temporary file and renamed into place;
    /// the index is updated only after the rename.
    ///
    /// # Errors
    /// Returns `CacheError::EntryTooLarge` if `bytes` exceeds the whole budget
    /// (any previous entry for `key` is dropped, since it is now stale), or
    /// an I/O error if the file cannot be written or published.
    pub async fn put(&self, key: &CacheKey, bytes: &[u8]) -> CacheResult<PathBuf> {
        if let Err(e) = self.check_fits(bytes) {
            self.remove(key).await;
            return Err(e);
        }
        self.write_entry(key, bytes, true)
            .await?
            .ok_or_else(|| CacheError::corruption(format!("entry for {key} vanished after write")))
    }

    /// Stores `bytes` under `key` unless the key is already indexed.
    ///
    /// The check and the insert happen under the index lock, so of several
    /// concurrent writers for one key exactly one wins. Returns the path if
    /// this call stored the bytes.
    ///
    /// # Errors
    /// Returns `CacheError::EntryTooLarge` if `bytes` exceeds the whole
    /// budget, or an I/O error if the file cannot be written or published.
    pub async fn put_if_absent(
        &self,
        key: &CacheKey,
        bytes: &[u8],
    ) -> CacheResult<Option<PathBuf>> {
        self.check_fits(bytes)?;
        if self.contains_key(key).await {
            return Ok(None);
        }
        self.write_entry(key, bytes, false).await
    }

    fn check_fits(&self, bytes: &[u8]) -> CacheResult<()> {
        let size = bytes.len() as u64;
        if size > self.max_size {
            return Err(CacheError::EntryTooLarge(format!(
                "{size} bytes exceeds disk cache budget of {}",
                self.max_size
            )));
        }
        Ok(())
    }

    async fn write_entry(
        &self,
        key: &CacheKey,
        bytes: &[u8],
        overwrite: bool,
    ) -> CacheResult<Option<PathBuf>> {
        let path = self.create_file_path(key);
        let temp_path = self.cache_dir.join(format!(
            "{}.{}.{TEMP_EXTENSION}",
            key.file_stem(),
            uuid::Uuid::new_v4().simple()
        ));

        if let Err(e) = write_file(&temp_path, bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CacheError::io(format!("Failed to write cache file: {e}")));
        }

        let mut index = self.index.lock().await;
        if !overwrite && index.entries.contains_key(key) {
            trace!(key = %key, "Disk cache already holds key");
            let _ = fs::remove_file(&temp_path).await;
            return Ok(None);
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(CacheError::io(format!("Failed to publish cache file: {e}")));
        }

        index.record(key.clone(), bytes.len() as u64);
        debug!(key = %key, path = %path.display(), size = bytes.len(), "Stored in disk cache");

        self.evict_if_needed(&mut index).await;
        self.persist_journal(&mut index).await?;

        Ok(index.entries.contains_key(key).then_some(path))
    }

    /// Writes pending access-order changes to the journal.
    ///
    /// # Errors
    /// Returns error if the journal cannot be written.
    pub async fn flush(&self) -> CacheResult<()> {
        let mut index = self.index.lock().await;
        if index.dirty {
            self.persist_journal(&mut index).await?;
        }
        Ok(())
    }

    /// Removes `key` and its file. Returns true if it was indexed.
    pub async fn remove(&self, key: &CacheKey) -> bool {
        let mut index = self.index.lock().await;
        if index.forget(key).is_none() {
            return false;
        }
        let path = self.create_file_path(key);
        if let Err(e) = fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(key = %key, error = %e, "Failed to remove disk cache file");
        }
        self.persist_or_warn(&mut index).await;
        debug!(key = %key, "Removed from disk cache");
        true
    }

    /// Deletes every cached file and resets the index.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn clear_cache(&self) -> CacheResult<()> {
        let mut index = self.index.lock().await;

        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::io(format!("Failed to read cache dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(format!("Failed to read entry: {e}")))?
        {
            let path = entry.path();
            if is_cache_file(&path) && fs::remove_file(&path).await.is_err() {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }

        index.entries.clear();
        index.total_size = 0;
        self.persist_journal(&mut index).await?;
        debug!(dir = %self.cache_dir.display(), "Cleared disk cache");
        Ok(())
    }

    /// Sum of indexed file sizes.
    pub async fn size_bytes(&self) -> u64 {
        self.index.lock().await.total_size
    }

    /// Number of indexed entries.
    pub async fn len(&self) -> usize {
        self.index.lock().await.entries.len()
    }

    /// Returns true if nothing is indexed.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns cache statistics.
    #[allow(clippy::cast_precision_loss)]
    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let index = self.index.lock().await;
        CacheStats {
            hits,
            misses,
            hit_rate,
            entries: index.entries.len(),
            size_bytes: index.total_size,
            evictions: index.evictions,
        }
    }

    async fn recover_index(&self) -> CacheResult<DiskIndex> {
        let journal_path = self.cache_dir.join(JOURNAL_FILE);
        let journal = match fs::read(&journal_path).await {
            Ok(raw) => match serde_json::from_slice::<Journal>(&raw) {
                Ok(journal) if journal.version == JOURNAL_VERSION => Some(journal),
                Ok(journal) => {
                    warn!(version = journal.version, "Unsupported disk cache journal, starting empty");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "Corrupt disk cache journal, starting empty");
                    None
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(CacheError::io(format!("Failed to read journal: {e}"))),
        };

        let mut index = DiskIndex::default();
        if let Some(journal) = journal {
            index.sequence = journal.sequence;
            for entry in journal.entries {
                let key = CacheKey::new(entry.key);
                let path = self.create_file_path(&key);
                match fs::metadata(&path).await {
                    Ok(meta) if meta.len() == entry.size => {
                        index.total_size += entry.size;
                        index.entries.insert(
                            key,
                            IndexEntry {
                                size: entry.size,
                                last_access: entry.last_access,
                                access_seq: entry.access_seq,
                            },
                        );
                    }
                    _ => {
                        warn!(key = %key, "Dropping journal entry without a matching file");
                        let _ = fs::remove_file(&path).await;
                    }
                }
            }
        }

        let indexed: HashSet<PathBuf> = index
            .entries
            .keys()
            .map(|key| self.create_file_path(key))
            .collect();

        let mut dir = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::io(format!("Failed to read cache dir: {e}")))?;
        while let Ok(Some(entry)) = dir.next_entry().await {
            let path = entry.path();
            if is_cache_file(&path) && !indexed.contains(&path) {
                debug!(path = %path.display(), "Removing unindexed cache file");
                if let Err(e) = fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %e, "Failed to remove stray cache file");
                }
            }
        }

        Ok(index)
    }

    async fn evict_if_needed(&self, index: &mut DiskIndex) {
        if index.total_size <= self.max_size {
            return;
        }

        debug!(
            current_size = index.total_size,
            max_size = self.max_size,
            "Disk cache over limit, evicting"
        );

        let mut candidates: Vec<(CacheKey, u64)> = index
            .entries
            .iter()
            .map(|(key, e)| (key.clone(), e.access_seq))
            .collect();
        candidates.sort_by_key(|(_, seq)| *seq);

        for (key, _) in candidates {
            if index.total_size <= self.max_size {
                break;
            }
            let path = self.create_file_path(&key);
            if let Err(e) = fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "Failed to remove evicted file");
                continue;
            }
            if let Some(entry) = index.forget(&key) {
                index.evictions += 1;
                debug!(key = %key, size = entry.size, "Evicted from disk cache");
            }
        }
    }

    async fn drop_corrupt(
        &self,
        index: &mut DiskIndex,
        key: &CacheKey,
        path: &Path,
        err: &CacheError,
    ) {
        warn!(key = %key, error = %err, "Dropping corrupt disk cache entry");
        index.forget(key);
        let _ = fs::remove_file(path).await;
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.persist_or_warn(index).await;
    }

    async fn persist_or_warn(&self, index: &mut DiskIndex) {
        if let Err(e) = self.persist_journal(index).await {
            warn!(error = %e, "Failed to persist disk cache journal");
        }
    }

    async fn persist_journal(&self, index: &mut DiskIndex) -> CacheResult<()> {
        let raw = serde_json::to_vec(&index.to_journal())
            .map_err(|e| CacheError::io(format!("Failed to serialize journal: {e}")))?;
        let journal_path = self.cache_dir.join(JOURNAL_FILE);
        let temp_path = self.cache_dir.join(format!("{JOURNAL_FILE}.{TEMP_EXTENSION}"));
        write_file(&temp_path, &raw)
            .await
            .map_err(|e| CacheError::io(format!("Failed to write journal: {e}")))?;
        fs::rename(&temp_path, &journal_path)
            .await
            .map_err(|e| CacheError::io(format!("Failed to publish journal: {e}")))?;
        index.dirty = false;
        Ok(())
    }
}

impl Drop for DiskImageCache {
    fn drop(&mut self) {
        let index = self.index.get_mut();
        if !index.dirty {
            return;
        }
        let result = serde_json::to_vec(&index.to_journal())
            .map_err(std::io::Error::other)
            .and_then(|raw| {
                let mut temp = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
                std::io::Write::write_all(&mut temp, &raw)?;
                temp.persist(self.cache_dir.join(JOURNAL_FILE))
                    .map_err(|e| e.error)?;
                Ok(())
            });
        if let Err(e) = result {
            warn!(error = %e, "Failed to write disk cache journal on close");
        }
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

fn is_cache_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == DATA_EXTENSION || ext == TEMP_EXTENSION)
}

/// Returns the application-private root for cache directories.
#[must_use]
pub fn default_storage_root() -> PathBuf {
    directories::ProjectDirs::from("com", "linuxmobile", "image-grabber").map_or_else(
        || std::env::temp_dir().join("image-grabber").join("cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_cache(max_size: u64) -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::open(temp_dir.path().to_path_buf(), max_size)
            .await
            .unwrap();
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (cache, _temp) = create_test_cache(1024).await;
        let key = CacheKey::new("https://example.com/a.png");

        let path = cache.put(&key, b"test image data").await.unwrap();

        assert_eq!(path, cache.create_file_path(&key));
        assert!(cache.contains_key(&key).await);
        assert_eq!(cache.get(&key).await.as_deref(), Some(&b"test image data"[..]));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache(1024).await;
        let key = CacheKey::new("nonexistent");

        assert!(cache.get(&key).await.is_none());
        assert!(!cache.contains_key(&key).await);
    }

    #[tokio::test]
    async fn test_create_file_path_is_deterministic() {
        let (cache, _temp) = create_test_cache(1024).await;
        let key = CacheKey::new("https://example.com/a b?c=d");

        let first = cache.create_file_path(&key);
        assert_eq!(first, cache.create_file_path(&key));
        assert!(first.starts_with(cache.cache_dir()));
        assert!(!first.exists());
    }

    #[tokio::test]
    async fn test_lru_eviction_scenario() {
        let (cache, _temp) = create_test_cache(20).await;

        cache.put(&CacheKey::new("a"), &[0; 10]).await.unwrap();
        cache.put(&CacheKey::new("b"), &[0; 10]).await.unwrap();
        cache.put(&CacheKey::new("c"), &[0; 5]).await.unwrap();

        assert!(!cache.contains_key(&CacheKey::new("a")).await);
        assert!(cache.contains_key(&CacheKey::new("b")).await);
        assert!(cache.contains_key(&CacheKey::new("c")).await);
        assert!(cache.size_bytes().await <= 20);
        assert!(!cache.create_file_path(&CacheKey::new("a")).exists());
    }

    #[tokio::test]
    async fn test_eviction_orders_by_last_read() {
        let (cache, _temp) = create_test_cache(20).await;

        cache.put(&CacheKey::new("a"), &[0; 10]).await.unwrap();
        cache.put(&CacheKey::new("b"), &[0; 10]).await.unwrap();
        assert!(cache.get(&CacheKey::new("a")).await.is_some());
        cache.put(&CacheKey::new("c"), &[0; 5]).await.unwrap();

        assert!(cache.contains_key(&CacheKey::new("a")).await);
        assert!(!cache.contains_key(&CacheKey::new("b")).await);
    }

    #[tokio::test]
    async fn test_overwrite_reaccounts_size() {
        let (cache, _temp) = create_test_cache(1024).await;
        let key = CacheKey::new("k");

        cache.put(&key, b"hello").await.unwrap();
        cache.put(&CacheKey::new("other"), b"world!").await.unwrap();
        assert_eq!(cache.size_bytes().await, 11);

        cache.put(&key, b"hey").await.unwrap();
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.size_bytes().await, 9);
        assert_eq!(cache.get(&key).await.as_deref(), Some(&b"hey"[..]));
    }

    #[tokio::test]
    async fn test_remove() {
        let (cache, _temp) = create_test_cache(1024).await;
        let key = CacheKey::new("k");

        cache.put(&key, b"test").await.unwrap();
        assert!(cache.remove(&key).await);
        assert!(!cache.remove(&key).await);

        assert!(!cache.contains_key(&key).await);
        assert_eq!(cache.size_bytes().await, 0);
        assert!(!cache.create_file_path(&key).exists());
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let (cache, _temp) = create_test_cache(1024).await;
        cache.put(&CacheKey::new("a"), b"data1").await.unwrap();
        cache.put(&CacheKey::new("b"), b"data2").await.unwrap();

        cache.clear_cache().await.unwrap();

        assert!(cache.is_empty().await);
        assert_eq!(cache.size_bytes().await, 0);
        assert!(!cache.create_file_path(&CacheKey::new("a")).exists());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        {
            let cache = DiskImageCache::open(dir.clone(), 1024).await.unwrap();
            cache.put(&CacheKey::new("a"), b"alpha").await.unwrap();
            cache.put(&CacheKey::new("b"), b"bravo!").await.unwrap();
        }

        let reopened = DiskImageCache::open(dir, 1024).await.unwrap();

        assert_eq!(reopened.len().await, 2);
        assert_eq!(reopened.size_bytes().await, 11);
        assert_eq!(
            reopened.get(&CacheKey::new("a")).await.as_deref(),
            Some(&b"alpha"[..])
        );
    }

    #[tokio::test]
    async fn test_reopen_preserves_access_order() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        {
            let cache = DiskImageCache::open(dir.clone(), 20).await.unwrap();
            cache.put(&CacheKey::new("a"), &[0; 10]).await.unwrap();
            cache.put(&CacheKey::new("b"), &[0; 10]).await.unwrap();
            assert!(cache.get(&CacheKey::new("a")).await.is_some());
        }

        let reopened = DiskImageCache::open(dir, 20).await.unwrap();
        reopened.put(&CacheKey::new("c"), &[0; 5]).await.unwrap();

        assert!(reopened.contains_key(&CacheKey::new("a")).await);
        assert!(!reopened.contains_key(&CacheKey::new("b")).await);
    }

    #[tokio::test]
    async fn test_reopen_drops_truncated_and_stray_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        let truncated = CacheKey::new("truncated");
        let stray_temp = dir.join("deadbeef.0123.tmp");
        {
            let cache = DiskImageCache::open(dir.clone(), 1024).await.unwrap();
            cache.put(&truncated, b"full contents").await.unwrap();
            cache.put(&CacheKey::new("ok"), b"fine").await.unwrap();
            std::fs::write(cache.create_file_path(&truncated), b"full").unwrap();
        }
        std::fs::write(&stray_temp, b"partial").unwrap();
        std::fs::write(dir.join("feedface.img"), b"unindexed").unwrap();

        let reopened = DiskImageCache::open(dir.clone(), 1024).await.unwrap();

        assert!(!reopened.contains_key(&truncated).await);
        assert!(reopened.contains_key(&CacheKey::new("ok")).await);
        assert_eq!(reopened.size_bytes().await, 4);
        assert!(!stray_temp.exists());
        assert!(!dir.join("feedface.img").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_treated_as_absent() {
        let (cache, _temp) = create_test_cache(1024).await;
        let key = CacheKey::new("k");
        let path = cache.put(&key, b"bytes").await.unwrap();
        std::fs::remove_file(path).unwrap();

        assert!(cache.get(&key).await.is_none());
        assert!(!cache.contains_key(&key).await);
        assert_eq!(cache.size_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_journal_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        {
            let cache = DiskImageCache::open(dir.clone(), 1024).await.unwrap();
            cache.put(&CacheKey::new("a"), b"alpha").await.unwrap();
        }
        std::fs::write(dir.join(JOURNAL_FILE), b"{not json").unwrap();

        let reopened = DiskImageCache::open(dir, 1024).await.unwrap();

        assert!(reopened.is_empty().await);
        assert!(!reopened.create_file_path(&CacheKey::new("a")).exists());
    }

    #[tokio::test]
    async fn test_concurrent_puts_keep_accounting_exact() {
        let (cache, _temp) = create_test_cache(1024 * 1024).await;
        let cache = std::sync::Arc::new(cache);

        let tasks: Vec<_> = (0..16usize)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let key = CacheKey::new(format!("k{}", i % 8));
                    cache.put(&key, &vec![0u8; i + 1]).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let mut on_disk = 0u64;
        for i in 0..8 {
            let path = cache.create_file_path(&CacheKey::new(format!("k{i}")));
            on_disk += std::fs::metadata(path).unwrap().len();
        }
        assert_eq!(cache.len().await, 8);
        assert_eq!(cache.size_bytes().await, on_disk);
    }

    #[tokio::test]
    async fn test_oversized_put_is_rejected() {
        let (cache, _temp) = create_test_cache(32).await;
        let key = CacheKey::new("big");

        let err = cache.put(&key, &[7u8; 64]).await.unwrap_err();

        assert!(err.is_too_large());
        assert!(!cache.contains_key(&key).await);
        assert!(!cache.create_file_path(&key).exists());
        assert_eq!(cache.size_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_oversized_put_drops_stale_entry() {
        let (cache, _temp) = create_test_cache(32).await;
        let key = CacheKey::new("k");
        cache.put(&key, b"small").await.unwrap();

        assert!(cache.put(&key, &[0u8; 33]).await.is_err());

        assert!(cache.get(&key).await.is_none());
        assert!(!cache.create_file_path(&key).exists());
    }

    #[tokio::test]
    async fn test_put_at_exact_budget_is_kept() {
        let (cache, _temp) = create_test_cache(32).await;
        let key = CacheKey::new("k");

        let path = cache.put(&key, &[1u8; 32]).await.unwrap();

        assert!(path.exists());
        assert_eq!(cache.size_bytes().await, 32);
    }

    #[tokio::test]
    async fn test_put_if_absent_keeps_first_writer() {
        let (cache, _temp) = create_test_cache(1024).await;
        let key = CacheKey::new("k");

        let first = cache.put_if_absent(&key, b"first").await.unwrap();
        let second = cache.put_if_absent(&key, b"second").await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(cache.get(&key).await.as_deref(), Some(&b"first"[..]));
        assert_eq!(cache.size_bytes().await, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_put_if_absent_has_one_winner() {
        let (cache, _temp) = create_test_cache(1024 * 1024).await;
        let cache = std::sync::Arc::new(cache);
        let key = CacheKey::new("shared");

        let tasks: Vec<_> = (0..8u8)
            .map(|i| {
                let cache = cache.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    let stored = cache.put_if_absent(&key, &[i; 16]).await.unwrap();
                    stored.map(|_| i)
                })
            })
            .collect();
        let mut winners = Vec::new();
        for task in tasks {
            if let Some(i) = task.await.unwrap() {
                winners.push(i);
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(cache.get(&key).await.as_deref(), Some(&[winners[0]; 16][..]));
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.size_bytes().await, 16);
    }

    #[tokio::test]
    async fn test_hits_defer_journal_write_until_flush() {
        let (cache, _temp) = create_test_cache(1024).await;
        cache.put(&CacheKey::new("a"), b"alpha").await.unwrap();
        let journal = cache.cache_dir().join(JOURNAL_FILE);
        let before = std::fs::read(&journal).unwrap();

        assert!(cache.get(&CacheKey::new("a")).await.is_some());
        assert_eq!(std::fs::read(&journal).unwrap(), before);

        cache.flush().await.unwrap();
        assert_ne!(std::fs::read(&journal).unwrap(), before);
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let (cache, _temp) = create_test_cache(1024).await;
        cache.put(&CacheKey::new("a"), b"x").await.unwrap();

        let _ = cache.get(&CacheKey::new("a")).await;
        let _ = cache.get(&CacheKey::new("b")).await;

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }
}
