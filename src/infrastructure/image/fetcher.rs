//! Resolves URL keys to up-to-date local files.
//!
//! The fetcher owns a persistent byte cache of raw downloads. A cached file
//! is returned without touching the network unless a fetch is forced, in
//! which case the origin is asked with `If-Modified-Since` and the file is
//! only rewritten when the origin sends new content. A download larger
//! than the whole cache budget is handed back in memory instead of stored.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{ConditionalRequest, HttpTransport};
use crate::infrastructure::config::FetcherConfig;

use super::disk_cache::DiskImageCache;

/// How a fetched file was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrigin {
    /// Served from the cache without a request.
    Cached,
    /// The origin answered `304 Not Modified`.
    NotModified,
    /// New bytes were downloaded and stored.
    Downloaded,
}

/// Where the fetched bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedData {
    /// A file in the download cache.
    File(PathBuf),
    /// A download too large to cache.
    Memory(Bytes),
}

/// The bytes for a key and how they were obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Location of the bytes.
    pub data: FetchedData,
    /// How the bytes were obtained.
    pub origin: FetchOrigin,
}

impl FetchedFile {
    const fn cached(path: PathBuf, origin: FetchOrigin) -> Self {
        Self {
            data: FetchedData::File(path),
            origin,
        }
    }

    /// Path of the cached file, if the bytes were stored.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            FetchedData::File(path) => Some(path),
            FetchedData::Memory(_) => None,
        }
    }

    /// Reads the fetched bytes.
    ///
    /// # Errors
    /// Returns `CacheError::IoError` if the cached file cannot be read.
    pub async fn read(&self) -> CacheResult<Bytes> {
        match &self.data {
            FetchedData::File(path) => fs::read(path).await.map(Bytes::from).map_err(|e| {
                CacheError::io(format!("Failed to read {}: {e}", path.display()))
            }),
            FetchedData::Memory(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Network fetcher backed by a persistent download cache.
pub struct Fetcher {
    cache: Arc<DiskImageCache>,
    transport: Arc<dyn HttpTransport>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("cache_dir", &self.cache.cache_dir())
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher over an existing download cache.
    #[must_use]
    pub fn new(cache: Arc<DiskImageCache>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { cache, transport }
    }

    /// Opens the download cache described by `config` under `storage_root`.
    ///
    /// Invalid settings fall back to their defaults.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be opened.
    pub async fn open(
        config: &FetcherConfig,
        storage_root: PathBuf,
        transport: Arc<dyn HttpTransport>,
    ) -> CacheResult<Self> {
        let mut config = config.clone();
        config.validate();
        let cache = DiskImageCache::open(
            storage_root.join(&config.cache_dir_name),
            config.cache_capacity_bytes,
        )
        .await?;
        Ok(Self::new(Arc::new(cache), transport))
    }

    /// The download cache.
    #[must_use]
    pub fn cache(&self) -> &DiskImageCache {
        &self.cache
    }

    /// Returns current bytes for the URL `key`, normally as a cached file.
    ///
    /// # Errors
    /// Returns `CacheError::NetworkError` on transport failure or an
    /// unexpected status, `CacheError::NotFound` for a `304` with nothing
    /// cached, and `CacheError::IoError` if the download cannot be stored.
    /// The cached file is never left truncated.
    pub async fn resolve(&self, key: &CacheKey, force_fetch: bool) -> CacheResult<FetchedFile> {
        if !force_fetch && let Some(path) = self.cache.get_path(key).await {
            trace!(key = %key, "Found in download cache");
            return Ok(FetchedFile::cached(path, FetchOrigin::Cached));
        }

        let conditional = match self.cache.last_modified(key).await {
            Some(modified) => ConditionalRequest::modified_since(modified),
            None => ConditionalRequest::unconditional(),
        };

        debug!(key = %key, force = force_fetch, conditional = conditional.if_modified_since.is_some(), "Downloading");

        let response = self.transport.fetch(key.as_str(), &conditional).await?;

        if response.is_not_modified() {
            return match self.cache.get_path(key).await {
                Some(path) => {
                    debug!(key = %key, "Not modified, keeping cached file");
                    Ok(FetchedFile::cached(path, FetchOrigin::NotModified))
                }
                None => {
                    warn!(key = %key, "Not modified response without a cached copy");
                    Err(CacheError::not_found(format!(
                        "HTTP 304 for {key} but no cached copy"
                    )))
                }
            };
        }

        if !response.is_success() {
            return Err(CacheError::network(format!("HTTP {} for {key}", response.status)));
        }

        match self.cache.put(key, &response.body).await {
            Ok(path) => {
                debug!(key = %key, size = response.body.len(), "Stored download");
                Ok(FetchedFile::cached(path, FetchOrigin::Downloaded))
            }
            Err(e) if e.is_too_large() => {
                warn!(key = %key, error = %e, "Download too large to cache, keeping in memory");
                Ok(FetchedFile {
                    data: FetchedData::Memory(response.body),
                    origin: FetchOrigin::Downloaded,
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::TransportResponse;
    use crate::domain::ports::mocks::MockHttpTransport;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    const URL: &str = "https://example.com/img.png";

    async fn fetcher_with(transport: MockHttpTransport) -> (Fetcher, TempDir) {
        let temp = TempDir::new().unwrap();
        let cache = DiskImageCache::open(temp.path().join("http"), 1024 * 1024)
            .await
            .unwrap();
        (Fetcher::new(Arc::new(cache), Arc::new(transport)), temp)
    }

    #[tokio::test]
    async fn test_miss_downloads_unconditionally() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_fetch()
            .withf(|url, cond| url == URL && cond.if_modified_since.is_none())
            .times(1)
            .returning(|_, _| Ok(TransportResponse::new(200, &b"fresh"[..])));
        let (fetcher, _temp) = fetcher_with(transport).await;
        let key = CacheKey::new(URL);

        let fetched = fetcher.resolve(&key, false).await.unwrap();

        assert_eq!(fetched.origin, FetchOrigin::Downloaded);
        assert_eq!(fetched.path(), Some(fetcher.cache().create_file_path(&key).as_path()));
        assert_eq!(std::fs::read(fetched.path().unwrap()).unwrap(), b"fresh");
    }

    #[tokio::test]
    async fn test_cached_file_skips_network() {
        let mut transport = MockHttpTransport::new();
        transport.expect_fetch().never();
        let (fetcher, _temp) = fetcher_with(transport).await;
        let key = CacheKey::new(URL);
        fetcher.cache().put(&key, b"cached").await.unwrap();

        let fetched = assert_ok!(fetcher.resolve(&key, false).await);

        assert_eq!(fetched.origin, FetchOrigin::Cached);
        assert_eq!(&fetched.read().await.unwrap()[..], b"cached");
    }

    #[tokio::test]
    async fn test_force_fetch_always_contacts_network() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_fetch()
            .withf(|_, cond| cond.if_modified_since.is_some())
            .times(1)
            .returning(|_, _| Ok(TransportResponse::new(200, &b"newer"[..])));
        let (fetcher, _temp) = fetcher_with(transport).await;
        let key = CacheKey::new(URL);
        fetcher.cache().put(&key, b"older").await.unwrap();

        let fetched = fetcher.resolve(&key, true).await.unwrap();

        assert_eq!(fetched.origin, FetchOrigin::Downloaded);
        assert_eq!(std::fs::read(fetched.path().unwrap()).unwrap(), b"newer");
    }

    #[tokio::test]
    async fn test_not_modified_keeps_bytes_and_mtime() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_fetch()
            .times(1)
            .returning(|_, _| Ok(TransportResponse::not_modified()));
        let (fetcher, _temp) = fetcher_with(transport).await;
        let key = CacheKey::new(URL);
        let path = fetcher.cache().put(&key, b"original").await.unwrap();
        let before = std::fs::metadata(&path).unwrap().modified().unwrap();

        let fetched = fetcher.resolve(&key, true).await.unwrap();

        assert_eq!(fetched.origin, FetchOrigin::NotModified);
        assert_eq!(std::fs::read(&path).unwrap(), b"original");
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[tokio::test]
    async fn test_success_overwrites_bytes_and_mtime() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_fetch()
            .returning(|_, _| Ok(TransportResponse::new(200, &b"replacement"[..])));
        let (fetcher, _temp) = fetcher_with(transport).await;
        let key = CacheKey::new(URL);
        let path = fetcher.cache().put(&key, b"original").await.unwrap();
        let old_mtime = std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old_mtime)
            .unwrap();

        fetcher.resolve(&key, true).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"replacement");
        assert_ne!(std::fs::metadata(&path).unwrap().modified().unwrap(), old_mtime);
    }

    #[tokio::test]
    async fn test_transport_error_is_recoverable_and_keeps_cache() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_fetch()
            .returning(|_, _| Err(CacheError::network("connection reset")));
        let (fetcher, _temp) = fetcher_with(transport).await;
        let key = CacheKey::new(URL);
        let path = fetcher.cache().put(&key, b"original").await.unwrap();

        let err = fetcher.resolve(&key, true).await.unwrap_err();

        assert!(err.is_recoverable());
        assert_eq!(std::fs::read(&path).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_error_status_is_network_error() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_fetch()
            .returning(|_, _| Ok(TransportResponse::new(404, &b"nope"[..])));
        let (fetcher, _temp) = fetcher_with(transport).await;
        let key = CacheKey::new(URL);

        let err = fetcher.resolve(&key, false).await.unwrap_err();

        assert!(matches!(err, CacheError::NetworkError(msg) if msg.contains("404")));
        assert!(!fetcher.cache().contains_key(&key).await);
    }

    #[tokio::test]
    async fn test_not_modified_without_copy_fails() {
        let mut transport = MockHttpTransport::new();
        transport
            .expect_fetch()
            .returning(|_, _| Ok(TransportResponse::not_modified()));
        let (fetcher, _temp) = fetcher_with(transport).await;

        let err = fetcher.resolve(&CacheKey::new(URL), true).await.unwrap_err();

        assert!(matches!(err, CacheError::NotFound(_)));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_oversized_download_is_served_from_memory() {
        let body = vec![9u8; 64];
        let served = body.clone();
        let mut transport = MockHttpTransport::new();
        transport
            .expect_fetch()
            .times(1)
            .returning(move |_, _| Ok(TransportResponse::new(200, served.clone())));
        let temp = TempDir::new().unwrap();
        let cache = DiskImageCache::open(temp.path().join("http"), 32).await.unwrap();
        let fetcher = Fetcher::new(Arc::new(cache), Arc::new(transport));
        let key = CacheKey::new(URL);

        let fetched = fetcher.resolve(&key, false).await.unwrap();

        assert_eq!(fetched.origin, FetchOrigin::Downloaded);
        assert!(fetched.path().is_none());
        assert_eq!(fetched.read().await.unwrap(), Bytes::from(body));
        assert!(!fetcher.cache().contains_key(&key).await);
        assert_eq!(fetcher.cache().size_bytes().await, 0);
    }

    #[tokio::test]
    async fn test_open_replaces_zero_capacity_with_default() {
        let temp = TempDir::new().unwrap();
        let config = FetcherConfig {
            cache_capacity_bytes: 0,
            cache_dir_name: "  ".to_string(),
            ..FetcherConfig::default()
        };

        let fetcher = Fetcher::open(
            &config,
            temp.path().to_path_buf(),
            Arc::new(MockHttpTransport::new()),
        )
        .await
        .unwrap();

        let defaults = FetcherConfig::default();
        assert_eq!(fetcher.cache().max_size(), defaults.cache_capacity_bytes);
        assert_eq!(
            fetcher.cache().cache_dir(),
            temp.path().join(&defaults.cache_dir_name)
        );
    }
}
