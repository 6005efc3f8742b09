//! Port definition for decoding, resizing and re-encoding images.

use serde::{Deserialize, Serialize};

use crate::domain::entities::TargetSize;
use crate::domain::errors::CacheResult;

/// Format used when a decoded image is written to a persistent tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    /// Lossy JPEG honouring the configured quality.
    #[default]
    Jpeg,
    /// Lossless PNG.
    Png,
    /// Lossless WebP.
    Webp,
}

impl std::fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jpeg => write!(f, "jpeg"),
            Self::Png => write!(f, "png"),
            Self::Webp => write!(f, "webp"),
        }
    }
}

/// Port for turning bytes into images and back.
/// Implementations are CPU bound and must be thread-safe.
pub trait ImageCodec: Send + Sync {
    /// Decodes `bytes`, scaling the result down to fit `target` when given.
    ///
    /// # Errors
    /// Returns `CacheError::DecodeError` for malformed input.
    fn decode(&self, bytes: &[u8], target: Option<TargetSize>) -> CacheResult<image::DynamicImage>;

    /// Encodes `image` for storage.
    ///
    /// # Errors
    /// Returns `CacheError::DecodeError` if the encoder rejects the image.
    fn encode(
        &self,
        image: &image::DynamicImage,
        format: CompressionFormat,
        quality: u8,
    ) -> CacheResult<Vec<u8>>;
}
