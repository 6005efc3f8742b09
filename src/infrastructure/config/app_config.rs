//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::error;

use crate::domain::ports::CompressionFormat;

const APP_NAME: &str = "image-grabber";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Decoded image cache.
    #[serde(default)]
    pub cache: ImageCacheConfig,

    /// Download cache and HTTP client.
    #[serde(default)]
    pub http: FetcherConfig,

    /// Load pipeline behaviour.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Decoded image cache configuration.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCacheConfig {
    /// Name of the disk tier directory under the storage root.
    #[serde(default = "default_unique_name")]
    pub unique_name: String,

    /// Memory tier budget in bytes of decoded pixels.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity_bytes: usize,

    /// Disk tier budget in bytes.
    #[serde(default = "default_disk_capacity")]
    pub disk_capacity_bytes: u64,

    /// Format images are re-encoded to on disk.
    #[serde(default)]
    pub compression_format: CompressionFormat,

    /// Encoder quality, 0-100. Ignored by lossless formats.
    #[serde(default = "default_compression_quality")]
    pub compression_quality: u8,

    /// Enable the memory tier.
    #[serde(default = "default_true")]
    pub memory_cache_enabled: bool,

    /// Enable the disk tier.
    #[serde(default = "default_true")]
    pub disk_cache_enabled: bool,

    /// Wipe the disk tier when the cache opens.
    #[serde(default)]
    pub clear_disk_cache_on_start: bool,

    /// Parent directory for cache directories. Defaults to the platform cache dir.
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
}

impl ImageCacheConfig {
    /// Default configuration stored under `unique_name`.
    #[must_use]
    pub fn new(unique_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            memory_capacity_bytes: default_memory_capacity(),
            disk_capacity_bytes: default_disk_capacity(),
            compression_format: CompressionFormat::default(),
            compression_quality: default_compression_quality(),
            memory_cache_enabled: true,
            disk_cache_enabled: true,
            clear_disk_cache_on_start: false,
            storage_root: None,
        }
    }
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self::new(default_unique_name())
    }
}

/// Download cache and HTTP client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Name of the download cache directory under the storage root.
    #[serde(default = "default_http_dir")]
    pub cache_dir_name: String,

    /// Download cache budget in bytes.
    #[serde(default = "default_disk_capacity")]
    pub cache_capacity_bytes: u64,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl FetcherConfig {
    /// Sets the download cache budget. Zero is rejected.
    ///
    /// Returns true if the value was applied.
    pub fn set_cache_capacity_bytes(&mut self, bytes: u64) -> bool {
        if bytes == 0 {
            error!("HTTP cache size must be positive, keeping {}", self.cache_capacity_bytes);
            return false;
        }
        self.cache_capacity_bytes = bytes;
        true
    }

    /// Sets the download cache directory name. Blank names are rejected.
    ///
    /// Returns true if the value was applied.
    pub fn set_cache_dir_name(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            error!("HTTP cache directory name must not be empty, keeping {:?}", self.cache_dir_name);
            return false;
        }
        self.cache_dir_name = name.to_string();
        true
    }

    /// Replaces a zero budget or blank directory name with its default.
    pub fn validate(&mut self) {
        if self.cache_capacity_bytes == 0 {
            error!("HTTP cache size must be positive, using default");
            self.cache_capacity_bytes = default_disk_capacity();
        }
        let name = self.cache_dir_name.trim();
        if name.is_empty() {
            error!("HTTP cache directory name must not be empty, using default");
            self.cache_dir_name = default_http_dir();
        } else if name.len() != self.cache_dir_name.len() {
            self.cache_dir_name = name.to_string();
        }
    }

    /// Request timeout.
    #[must_use]
    pub const fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_dir_name: default_http_dir(),
            cache_capacity_bytes: default_disk_capacity(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Load pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Decode width bound in pixels.
    #[serde(default = "default_target_dimension")]
    pub target_width: u32,

    /// Decode height bound in pixels.
    #[serde(default = "default_target_dimension")]
    pub target_height: u32,

    /// Maximum number of background loads running at once.
    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,

    /// Cross-fade background results in.
    #[serde(default = "default_true")]
    pub fade_in: bool,

    /// Cross-fade duration in milliseconds.
    #[serde(default = "default_fade_in_ms")]
    pub fade_in_ms: u64,

    /// Refetch after every cache hit.
    #[serde(default)]
    pub always_revalidate: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_width: default_target_dimension(),
            target_height: default_target_dimension(),
            max_concurrent_loads: default_max_concurrent_loads(),
            fade_in: true,
            fade_in_ms: default_fade_in_ms(),
            always_revalidate: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_unique_name() -> String {
    "images".to_string()
}

fn default_http_dir() -> String {
    "http".to_string()
}

fn default_memory_capacity() -> usize {
    5 * 1024 * 1024
}

fn default_disk_capacity() -> u64 {
    10 * 1024 * 1024
}

fn default_compression_quality() -> u8 {
    70
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

fn default_target_dimension() -> u32 {
    256
}

fn default_max_concurrent_loads() -> usize {
    4
}

fn default_fade_in_ms() -> u64 {
    200
}

use super::args::CliArgs;

impl AppConfig {
    /// Repairs values a config file may set but the caches cannot use.
    pub fn validate(&mut self) {
        self.http.validate();
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(storage_root) = &args.storage_root {
            self.cache.storage_root = Some(storage_root.clone());
        }
        if let Some(size) = args.size {
            self.pipeline.target_width = size;
            self.pipeline.target_height = size;
        }
        if let Some(max) = args.max_concurrent_loads {
            self.pipeline.max_concurrent_loads = max;
        }
        if let Some(revalidate) = args.always_revalidate {
            self.pipeline.always_revalidate = revalidate;
        }
        if let Some(fade_in) = args.fade_in {
            self.pipeline.fade_in = fade_in;
        }
        if let Some(bytes) = args.http_cache_size {
            self.http.set_cache_capacity_bytes(bytes);
        }
        if let Some(name) = &args.http_cache_dir {
            self.http.set_cache_dir_name(name);
        }
        if args.clear_disk_cache {
            self.cache.clear_disk_cache_on_start = true;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("image-grabber.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}
