use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use image_grabber::domain::ports::{DisplaySlot, ImageCodec};
use image_grabber::infrastructure::image::default_storage_root;
use image_grabber::infrastructure::{
    AppConfig, CliArgs, Fetcher, ImageCache, ImageCrateCodec, ImageGrabber, LoadDispatch,
    LoadOutcome, LoadPipeline, LoadStatus, ReqwestTransport, StorageManager,
};
use image_grabber::presentation::widgets::ImageSlot;

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

async fn create_pipeline(config: &AppConfig) -> Result<(LoadPipeline, Arc<Fetcher>)> {
    let codec: Arc<dyn ImageCodec> = Arc::new(ImageCrateCodec::new());
    let cache = Arc::new(ImageCache::open(config.cache.clone(), codec.clone()).await?);

    let transport = Arc::new(ReqwestTransport::new(
        config.http.timeout(),
        &config.http.user_agent,
    )?);
    let storage_root = config
        .cache
        .storage_root
        .clone()
        .unwrap_or_else(default_storage_root);
    let fetcher = Arc::new(Fetcher::open(&config.http, storage_root, transport).await?);

    let grabber = ImageGrabber::new(
        fetcher.clone(),
        codec,
        config.pipeline.target_width,
        config.pipeline.target_height,
    );
    let pipeline = LoadPipeline::new(cache, Arc::new(grabber), &config.pipeline)?;
    Ok((pipeline, fetcher))
}

fn report(outcome: &LoadOutcome, slots: &[(String, Arc<ImageSlot>)]) {
    let Some((url, slot)) = slots.iter().find(|(_, slot)| slot.slot_id() == outcome.slot) else {
        return;
    };
    let pass = if outcome.revalidation { " (revalidated)" } else { "" };

    match &outcome.status {
        LoadStatus::Applied(source) => {
            let (width, height) = slot.dimensions().unwrap_or_default();
            println!("{url}: {width}x{height} from {source}{pass}");
        }
        LoadStatus::Unchanged => println!("{url}: unchanged{pass}"),
        LoadStatus::Abandoned => println!("{url}: abandoned{pass}"),
        LoadStatus::Failed(e) => println!("{url}: failed: {e}"),
    }
}

async fn run(pipeline: &LoadPipeline, slots: &[(String, Arc<ImageSlot>)]) {
    for (url, slot) in slots {
        if pipeline.load_into(slot, url.as_str()) == LoadDispatch::Applied {
            let (width, height) = slot.dimensions().unwrap_or_default();
            println!("{url}: {width}x{height} from memory");
        }
    }

    while pipeline.pending_count() > 0 {
        match pipeline.next_outcome().await {
            Some(outcome) => report(&outcome, slots),
            None => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config)?;

    info!(version = image_grabber::VERSION, "Starting {}", image_grabber::NAME);

    let (pipeline, fetcher) = create_pipeline(&config).await?;
    pipeline.set_placeholder(Some(Arc::new(image::DynamicImage::new_rgb8(1, 1))));

    let slots: Vec<(String, Arc<ImageSlot>)> = args
        .urls
        .iter()
        .map(|url| (url.clone(), Arc::new(ImageSlot::new())))
        .collect();

    run(&pipeline, &slots).await;
    if args.repeat {
        run(&pipeline, &slots).await;
    }

    if let Some(stats) = pipeline.cache().memory_stats() {
        println!("memory: {stats}");
    }
    if let Some(stats) = pipeline.cache().disk_stats().await {
        println!("disk:   {stats}");
    }
    println!("http:   {}", fetcher.cache().stats().await);

    pipeline.shutdown();
    Ok(())
}
