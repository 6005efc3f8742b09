use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "image-grabber",
    version,
    about = "Fetch, cache and display remote images",
    long_about = None
)]
pub struct CliArgs {
    /// Image URLs to load.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Parent directory for cache directories.
    #[arg(long, value_name = "PATH")]
    pub storage_root: Option<PathBuf>,

    /// Decode bound for both width and height, in pixels.
    #[arg(short, long)]
    pub size: Option<u32>,

    /// Maximum number of background loads.
    #[arg(long)]
    pub max_concurrent_loads: Option<usize>,

    /// Refetch after every cache hit.
    #[arg(long)]
    pub always_revalidate: Option<bool>,

    /// Cross-fade loaded images in.
    #[arg(long)]
    pub fade_in: Option<bool>,

    /// Download cache budget in bytes.
    #[arg(long, value_name = "BYTES")]
    pub http_cache_size: Option<u64>,

    /// Download cache directory name.
    #[arg(long, value_name = "NAME")]
    pub http_cache_dir: Option<String>,

    /// Wipe the decoded image disk cache before loading.
    #[arg(long)]
    pub clear_disk_cache: bool,

    /// Load every URL twice to show cache hits.
    #[arg(long)]
    pub repeat: bool,
}
