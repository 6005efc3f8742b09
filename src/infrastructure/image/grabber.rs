//! Network image source: fetch a URL, then decode it to fit target bounds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::entities::{CacheKey, ImageSource, LoadedImage, TargetSize};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{ImageCodec, ImageSourcePort};

use super::fetcher::{FetchOrigin, Fetcher};

/// Downloads and resizes images addressed by URL keys.
pub struct ImageGrabber {
    fetcher: Arc<Fetcher>,
    codec: Arc<dyn ImageCodec>,
    target: Option<TargetSize>,
}

impl std::fmt::Debug for ImageGrabber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageGrabber")
            .field("fetcher", &self.fetcher)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl ImageGrabber {
    /// Creates a grabber decoding to fit `width` x `height`.
    #[must_use]
    pub fn new(fetcher: Arc<Fetcher>, codec: Arc<dyn ImageCodec>, width: u32, height: u32) -> Self {
        Self {
            fetcher,
            codec,
            target: Some(TargetSize::new(width, height)),
        }
    }

    /// Creates a grabber using `size` for both width and height.
    #[must_use]
    pub fn with_size(fetcher: Arc<Fetcher>, codec: Arc<dyn ImageCodec>, size: u32) -> Self {
        Self {
            fetcher,
            codec,
            target: Some(TargetSize::square(size)),
        }
    }

    /// Creates a grabber that keeps images at their original size.
    #[must_use]
    pub fn unbounded(fetcher: Arc<Fetcher>, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            fetcher,
            codec,
            target: None,
        }
    }

    /// Bounds decoded images are scaled down to.
    #[must_use]
    pub const fn target(&self) -> Option<TargetSize> {
        self.target
    }
}

#[async_trait]
impl ImageSourcePort for ImageGrabber {
    async fn process(&self, key: &CacheKey, force_fetch: bool) -> CacheResult<LoadedImage> {
        let fetched = self.fetcher.resolve(key, force_fetch).await?;

        let bytes = fetched.read().await?;

        let codec = self.codec.clone();
        let target = self.target;
        let decoded = tokio::task::spawn_blocking(move || codec.decode(&bytes, target))
            .await
            .map_err(|e| CacheError::decode(format!("Decode task panicked: {e}")))?;

        let image = match decoded {
            Ok(image) => image,
            Err(e) => {
                warn!(key = %key, error = %e, "Evicting undecodable download");
                self.fetcher.cache().remove(key).await;
                return Err(e);
            }
        };

        let source = match fetched.origin {
            FetchOrigin::Cached => ImageSource::DiskCache,
            FetchOrigin::NotModified | FetchOrigin::Downloaded => ImageSource::Network,
        };
        debug!(key = %key, source = %source, width = image.width(), height = image.height(), "Image processed");

        Ok(LoadedImage {
            key: key.clone(),
            image: Arc::new(image),
            source,
            unchanged: fetched.origin == FetchOrigin::NotModified,
        })
    }
}
