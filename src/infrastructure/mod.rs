//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image handling (caching, fetching, loading).
pub mod image;

pub use config::{
    AppConfig, CliArgs, ConfigError, FetcherConfig, ImageCacheConfig, LogLevel, PipelineConfig,
    StorageManager,
};
pub use image::{
    CacheStats, DiskImageCache, Fetcher, ImageCache, ImageCrateCodec, ImageGrabber, LoadDispatch,
    LoadOutcome, LoadPipeline, LoadStatus, MemoryImageCache, ReqwestTransport,
};
