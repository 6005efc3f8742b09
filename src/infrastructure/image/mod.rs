//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction
//! - Disk caching with a persisted journal
//! - A conditional-GET fetcher with its own download cache
//! - Async image loading pipeline

pub mod codec;
pub mod disk_cache;
pub mod fetcher;
pub mod grabber;
pub mod http;
pub mod image_cache;
pub mod loader;
pub mod memory_cache;

pub use codec::ImageCrateCodec;
pub use disk_cache::{DEFAULT_DISK_CAPACITY, DiskImageCache, default_storage_root};
pub use fetcher::{FetchOrigin, FetchedData, FetchedFile, Fetcher};
pub use grabber::ImageGrabber;
pub use http::ReqwestTransport;
pub use image_cache::ImageCache;
pub use loader::{LoadDispatch, LoadOutcome, LoadPipeline, LoadStatus, LoadTask, PipelineSettings};
pub use memory_cache::{CacheStats, DEFAULT_MEMORY_CAPACITY, MemoryCache, MemoryImageCache};
