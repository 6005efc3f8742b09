//! Port definition for producing images from keys.

use async_trait::async_trait;

use crate::domain::entities::{CacheKey, LoadedImage};
use crate::domain::errors::CacheResult;

/// Strategy that turns a key into a decoded image.
///
/// The network implementation treats the key as a URL; other sources can
/// be plugged into the loader without touching it.
#[async_trait]
pub trait ImageSourcePort: Send + Sync {
    /// Produces the image for `key`.
    ///
    /// When `force_fetch` is set, any local copy must be revalidated against
    /// the origin instead of being returned as-is.
    async fn process(&self, key: &CacheKey, force_fetch: bool) -> CacheResult<LoadedImage>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use tokio::sync::{Notify, Semaphore};

    use crate::domain::entities::{ImageSource, SharedImage};
    use crate::domain::errors::CacheError;

    /// Builds the 1x1 image the mock produces for `key` at `revision`.
    pub fn image_for(key: &str, revision: u8) -> SharedImage {
        let red = key.as_bytes().first().copied().unwrap_or(0);
        Arc::new(image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            1,
            1,
            image::Rgb([red, revision, 0]),
        )))
    }

    /// Mock image source with per-key gates for ordering tests.
    #[derive(Default)]
    pub struct MockImageSource {
        calls: AtomicUsize,
        forced_calls: AtomicUsize,
        revision: AtomicU8,
        unchanged_on_force: AtomicBool,
        gates: Mutex<HashMap<CacheKey, Arc<Semaphore>>>,
        failing: Mutex<HashSet<CacheKey>>,
        /// Signalled each time `process` starts.
        pub started: Notify,
    }

    impl MockImageSource {
        /// Creates new mock.
        pub fn new() -> Self {
            Self::default()
        }

        /// Blocks `process` for `key` until `release` is called.
        pub fn gate(&self, key: &str) {
            self.gates
                .lock()
                .insert(CacheKey::new(key), Arc::new(Semaphore::new(0)));
        }

        /// Lets one blocked `process` call for `key` continue.
        pub fn release(&self, key: &str) {
            if let Some(gate) = self.gates.lock().get(&CacheKey::new(key)) {
                gate.add_permits(1);
            }
        }

        /// Makes `process` fail for `key`.
        pub fn fail(&self, key: &str) {
            self.failing.lock().insert(CacheKey::new(key));
        }

        /// Changes the content served from now on.
        pub fn set_revision(&self, revision: u8) {
            self.revision.store(revision, Ordering::SeqCst);
        }

        /// Makes forced fetches report the content as unchanged.
        pub fn set_unchanged_on_force(&self, value: bool) {
            self.unchanged_on_force.store(value, Ordering::SeqCst);
        }

        /// Number of `process` calls.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        /// Number of `process` calls with `force_fetch` set.
        pub fn forced_calls(&self) -> usize {
            self.forced_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageSourcePort for MockImageSource {
        async fn process(&self, key: &CacheKey, force_fetch: bool) -> CacheResult<LoadedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if force_fetch {
                self.forced_calls.fetch_add(1, Ordering::SeqCst);
            }
            self.started.notify_one();

            let gate = self.gates.lock().get(key).cloned();
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            if self.failing.lock().contains(key) {
                return Err(CacheError::network(format!("mock failure for {key}")));
            }

            Ok(LoadedImage {
                key: key.clone(),
                image: image_for(key.as_str(), self.revision.load(Ordering::SeqCst)),
                source: ImageSource::Network,
                unchanged: force_fetch && self.unchanged_on_force.load(Ordering::SeqCst),
            })
        }
    }
}
