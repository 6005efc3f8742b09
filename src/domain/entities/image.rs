//! Domain types for image loading and caching.

use std::sync::Arc;

/// A decoded image shared between the cache tiers and display slots.
pub type SharedImage = Arc<image::DynamicImage>;

/// Opaque identifier of requested content, usually the source URL.
///
/// Equality is exact string equality; no normalization is performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a new `CacheKey` from any string-like input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a stable, filesystem-safe name derived from the key.
    ///
    /// Truncated SHA-256, hex encoded (32 characters).
    #[must_use]
    pub fn file_stem(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&String> for CacheKey {
    fn from(s: &String) -> Self {
        Self::new(s.as_str())
    }
}

/// Identity of a display slot, used to look up its current binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(uuid::Uuid);

impl SlotId {
    /// Allocates a fresh, unique slot identity.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SlotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bounds a decoded image is scaled down to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    /// Maximum width in pixels.
    pub width: u32,
    /// Maximum height in pixels.
    pub height: u32,
}

impl TargetSize {
    /// Creates bounds from a width and height.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Creates square bounds.
    #[must_use]
    pub const fn square(size: u32) -> Self {
        Self::new(size, size)
    }
}

/// Display state of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotStatus {
    /// Nothing has been requested for the slot.
    #[default]
    Empty,
    /// A load is in flight and the placeholder is shown.
    Loading,
    /// A decoded image is shown.
    Ready,
}

impl SlotStatus {
    /// Returns true if the slot shows a decoded image.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Returns true if the slot is showing its placeholder.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from the in-memory tier.
    MemoryCache,
    /// Loaded from a persistent tier without contacting the network.
    DiskCache,
    /// Downloaded (or confirmed unchanged) over the network.
    Network,
}

impl ImageSource {
    /// Returns true if the image was served without a network round trip.
    #[must_use]
    pub const fn is_cache_hit(self) -> bool {
        matches!(self, Self::MemoryCache | Self::DiskCache)
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// An image produced by an image source, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The requested key.
    pub key: CacheKey,
    /// The decoded image.
    pub image: SharedImage,
    /// Where the image came from.
    pub source: ImageSource,
    /// True when a forced fetch confirmed the cached bytes are current.
    pub unchanged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_is_stable_and_safe() {
        let key = CacheKey::new("https://example.com/a b/c?d=e");
        let stem = key.file_stem();
        assert_eq!(stem.len(), 32);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(stem, CacheKey::new("https://example.com/a b/c?d=e").file_stem());
    }

    #[test]
    fn test_keys_are_not_normalized() {
        let a = CacheKey::new("https://example.com/img.png");
        let b = CacheKey::new("https://example.com/img.png/");
        assert_ne!(a, b);
        assert_ne!(a.file_stem(), b.file_stem());
    }

    #[test]
    fn test_slot_ids_are_unique() {
        assert_ne!(SlotId::new(), SlotId::new());
    }

    #[test]
    fn test_cache_hit_sources() {
        assert!(ImageSource::MemoryCache.is_cache_hit());
        assert!(ImageSource::DiskCache.is_cache_hit());
        assert!(!ImageSource::Network.is_cache_hit());
    }
}
