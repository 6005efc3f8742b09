//! Memory + disk cache facade for decoded images.

use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::domain::entities::{CacheKey, SharedImage};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::ImageCodec;
use crate::infrastructure::config::ImageCacheConfig;

use super::disk_cache::{DiskImageCache, default_storage_root};
use super::memory_cache::{CacheStats, MemoryImageCache};

/// Holds the memory tier (decoded images) and disk tier (re-encoded bytes).
///
/// The tiers are independent: a key may live in either, both or neither.
/// Nothing here touches the network.
pub struct ImageCache {
    config: ImageCacheConfig,
    memory: Option<MemoryImageCache>,
    disk: Option<DiskImageCache>,
    codec: Arc<dyn ImageCodec>,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Builds the enabled tiers described by `config`.
    ///
    /// # Errors
    /// Returns error if the disk tier directory cannot be opened.
    pub async fn open(config: ImageCacheConfig, codec: Arc<dyn ImageCodec>) -> CacheResult<Self> {
        let memory = config
            .memory_cache_enabled
            .then(|| MemoryImageCache::new(config.memory_capacity_bytes));

        let disk = if config.disk_cache_enabled {
            let root = config
                .storage_root
                .clone()
                .unwrap_or_else(default_storage_root);
            let disk = DiskImageCache::open(root.join(&config.unique_name), config.disk_capacity_bytes)
                .await?;
            if config.clear_disk_cache_on_start {
                disk.clear_cache().await?;
            }
            Some(disk)
        } else {
            None
        };

        info!(
            name = %config.unique_name,
            memory = memory.is_some(),
            disk = disk.is_some(),
            "Image cache ready"
        );

        Ok(Self {
            config,
            memory,
            disk,
            codec,
        })
    }

    /// Configuration the cache was built from.
    #[must_use]
    pub const fn config(&self) -> &ImageCacheConfig {
        &self.config
    }

    /// Memory tier, if enabled.
    #[must_use]
    pub const fn memory(&self) -> Option<&MemoryImageCache> {
        self.memory.as_ref()
    }

    /// Disk tier, if enabled.
    #[must_use]
    pub const fn disk(&self) -> Option<&DiskImageCache> {
        self.disk.as_ref()
    }

    /// Looks up the memory tier. Never blocks on I/O.
    #[must_use]
    pub fn get_from_memory(&self, key: &CacheKey) -> Option<SharedImage> {
        self.memory.as_ref()?.get(key)
    }

    /// Looks up and decodes the disk tier.
    ///
    /// Bytes that fail to decode are evicted so they are not retried.
    ///
    /// # Errors
    /// Returns `CacheError::DecodeError` if the cached bytes are malformed.
    pub async fn get_from_disk(&self, key: &CacheKey) -> CacheResult<Option<SharedImage>> {
        let Some(disk) = &self.disk else {
            return Ok(None);
        };
        let Some(bytes) = disk.get(key).await else {
            return Ok(None);
        };

        let codec = self.codec.clone();
        let decoded = tokio::task::spawn_blocking(move || codec.decode(&bytes, None))
            .await
            .map_err(|e| CacheError::decode(format!("Decode task panicked: {e}")))?;

        match decoded {
            Ok(img) => {
                debug!(key = %key, "Decoded image from disk cache");
                Ok(Some(Arc::new(img)))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Evicting undecodable disk cache entry");
                disk.remove(key).await;
                Err(e)
            }
        }
    }

    /// Writes `image` to every enabled tier that does not already hold `key`.
    pub async fn add_to_cache(&self, key: &CacheKey, image: &SharedImage) {
        if let Some(memory) = &self.memory {
            memory.put(key.clone(), image.clone());
        }

        if let Some(disk) = &self.disk
            && !disk.contains_key(key).await
        {
            self.write_disk(disk, key, image, false).await;
        }
    }

    /// Writes `image` to every enabled tier, replacing existing entries.
    pub async fn replace_in_cache(&self, key: &CacheKey, image: &SharedImage) {
        if let Some(memory) = &self.memory {
            memory.replace(key.clone(), image.clone());
        }
        if let Some(disk) = &self.disk {
            self.write_disk(disk, key, image, true).await;
        }
        debug!(key = %key, "Replaced cached image");
    }

    /// Clears both tiers.
    pub async fn clear_caches(&self) {
        if let Some(memory) = &self.memory {
            memory.evict_all();
        }
        if let Some(disk) = &self.disk
            && let Err(e) = disk.clear_cache().await
        {
            warn!(error = %e, "Failed to clear disk cache");
        }
        info!("Cleared image caches");
    }

    /// Memory tier statistics.
    #[must_use]
    pub fn memory_stats(&self) -> Option<CacheStats> {
        self.memory.as_ref().map(MemoryImageCache::stats)
    }

    /// Disk tier statistics.
    pub async fn disk_stats(&self) -> Option<CacheStats> {
        match &self.disk {
            Some(disk) => Some(disk.stats().await),
            None => None,
        }
    }

    /// Encodes and stores `image`. Without `overwrite` an entry that appeared
    /// while encoding is kept.
    async fn write_disk(
        &self,
        disk: &DiskImageCache,
        key: &CacheKey,
        image: &SharedImage,
        overwrite: bool,
    ) {
        let codec = self.codec.clone();
        let img = image.clone();
        let format = self.config.compression_format;
        let quality = self.config.compression_quality;

        let encoded = match tokio::task::spawn_blocking(move || codec.encode(&img, format, quality)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Failed to encode image for disk cache");
                return;
            }
            Err(e) => {
                error!(key = %key, error = %e, "Encode task panicked");
                return;
            }
        };

        let stored = if overwrite {
            disk.put(key, &encoded).await.map(Some)
        } else {
            disk.put_if_absent(key, &encoded).await
        };
        match stored {
            Ok(Some(_)) => {}
            Ok(None) => trace!(key = %key, "Disk tier already filled by another writer"),
            Err(e) => warn!(key = %key, error = %e, "Failed to cache to disk"),
        }
    }
}
