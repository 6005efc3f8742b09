//! In-memory LRU image cache bounded by total byte size.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, SharedImage};

/// Default memory budget (5 MiB).
pub const DEFAULT_MEMORY_CAPACITY: usize = 5 * 1024 * 1024;

/// Computes the memory cost of a cached value.
pub type Sizer<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

/// Memory tier holding decoded images.
pub type MemoryImageCache = MemoryCache<SharedImage>;

/// Memory cost of a decoded image: its pixel buffer length.
#[must_use]
pub fn image_byte_size(image: &SharedImage) -> usize {
    image.as_bytes().len()
}

struct Entry<V> {
    value: V,
    size: usize,
}

struct MemoryState<V> {
    entries: LruCache<CacheKey, Entry<V>>,
    size: usize,
    evictions: u64,
}

/// Byte-bounded LRU map safe to share between the UI thread and workers.
///
/// `put` never overwrites: the first writer for a key wins.
pub struct MemoryCache<V> {
    state: Mutex<MemoryState<V>>,
    capacity: usize,
    sizer: Sizer<V>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache<SharedImage> {
    /// Creates an image cache with the given byte budget.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_sizer(capacity, image_byte_size)
    }

    /// Creates an image cache with the default budget.
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

impl<V: Clone> MemoryCache<V> {
    /// Creates a cache that measures entries with `sizer`.
    pub fn with_sizer(capacity: usize, sizer: impl Fn(&V) -> usize + Send + Sync + 'static) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: LruCache::unbounded(),
                size: 0,
                evictions: 0,
            }),
            capacity,
            sizer: Arc::new(sizer),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached value and marks it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(entry.value.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    /// Returns the cached value without promoting it.
    pub fn peek(&self, key: &CacheKey) -> Option<V> {
        self.state.lock().entries.peek(key).map(|e| e.value.clone())
    }

    /// Returns true if `key` is resident.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains(key)
    }

    /// Inserts `value` unless `key` is already resident.
    ///
    /// Returns true if the value is resident after the call's eviction pass.
    pub fn put(&self, key: CacheKey, value: V) -> bool {
        let mut state = self.state.lock();
        if state.entries.contains(&key) {
            trace!(key = %key, "Memory cache already holds key");
            return false;
        }
        self.insert_locked(&mut state, key, value)
    }

    /// Inserts `value`, dropping any resident entry for `key` first.
    pub fn replace(&self, key: CacheKey, value: V) -> bool {
        let mut state = self.state.lock();
        if let Some(old) = state.entries.pop(&key) {
            state.size -= old.size;
        }
        self.insert_locked(&mut state, key, value)
    }

    /// Removes `key` if resident.
    pub fn remove(&self, key: &CacheKey) -> Option<V> {
        let mut state = self.state.lock();
        let entry = state.entries.pop(key)?;
        state.size -= entry.size;
        debug!(key = %key, "Removed from memory cache");
        Some(entry.value)
    }

    /// Clears everything.
    pub fn evict_all(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.size = 0;
        debug!("Cleared memory cache");
    }

    /// Sum of entry sizes currently resident.
    pub fn size_bytes(&self) -> usize {
        self.state.lock().size
    }

    /// Configured byte budget.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident keys, least recently used first.
    pub fn keys_lru_first(&self) -> Vec<CacheKey> {
        self.state
            .lock()
            .entries
            .iter()
            .rev()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let state = self.state.lock();
        CacheStats {
            hits,
            misses,
            hit_rate,
            entries: state.entries.len(),
            size_bytes: state.size as u64,
            evictions: state.evictions,
        }
    }

    fn insert_locked(&self, state: &mut MemoryState<V>, key: CacheKey, value: V) -> bool {
        let size = (self.sizer)(&value);
        debug!(key = %key, size = size, "Storing in memory cache");
        state.entries.put(key.clone(), Entry { value, size });
        state.size += size;

        while state.size > self.capacity {
            let Some((evicted, entry)) = state.entries.pop_lru() else {
                break;
            };
            state.size -= entry.size;
            state.evictions += 1;
            debug!(key = %evicted, size = entry.size, "Evicted from memory cache");
        }

        state.entries.contains(&key)
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of entries.
    pub entries: usize,
    /// Current accounted size in bytes.
    pub size_bytes: u64,
    /// Entries evicted to stay within budget.
    pub evictions: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} entries, {} bytes, {:.1}% hit rate ({} hits, {} misses, {} evictions)",
            self.entries, self.size_bytes, self.hit_rate, self.hits, self.misses, self.evictions
        )
    }
}
