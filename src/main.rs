//! # Satire Wire
//!
//! A news bot that picks trending Korean headlines, rewrites them in a
//! sarcastic reporter persona through a generative text API, attaches a
//! stock photo, and stores the result for the site to serve.
//!
//! ## Usage
//!
//! ```sh
//! DATABASE_URL=postgres://... GEMINI_API_KEY=... satire_wire -c pipeline.yaml
//! ```
//!
//! ## Architecture
//!
//! The bot runs two periodic loops:
//! 1. **Topic refresh**: list candidates, drop recent repeats, let the model
//!    rank what is left, queue the winners
//! 2. **Article drain**: pop one queued topic, fetch the article, rewrite it,
//!    find an image, store it and schedule a few synthetic comments
//!
//! Nothing after start-up is fatal. Every failed stage is logged and the next
//! tick starts fresh.

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod api;
mod cli;
mod comments;
mod config;
mod error;
mod generator;
mod images;
mod models;
mod prompts;
mod scheduler;
mod scrapers;
mod storage;
mod topics;
mod utils;

#[cfg(test)]
mod testing;

use api::{GeminiBackend, GenerationParams, RetryingGenerator, TextGenerator};
use cli::Cli;
use comments::DelayedCommentScheduler;
use config::PipelineConfig;
use generator::ArticleGenerator;
use images::flickr::FlickrProvider;
use images::unsplash::UnsplashProvider;
use images::{ImageProvider, ImageResolver};
use scheduler::{ArticleDrainJob, ScheduleTiming, Scheduler};
use scrapers::daum::DaumFetcher;
use scrapers::kakao::KakaoSource;
use storage::PersistenceGateway;
use storage::memory::MemoryGateway;
use storage::postgres::PgGateway;
use topics::TopicSelector;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!("satire_wire starting up");

    let args = Cli::parse();
    debug!(?args.config, dry_run = args.dry_run, once = args.once, "Parsed CLI arguments");

    let config = PipelineConfig::load(args.config.as_deref())?;
    info!(config_path = ?args.config, "Loaded configuration");

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(60))
        .build()?;

    // ---- Persistence ----
    let store: Arc<dyn PersistenceGateway> = if args.dry_run {
        warn!("Dry run: articles and comments are kept in memory only");
        Arc::new(MemoryGateway::new())
    } else {
        let url = args
            .database_url
            .as_deref()
            .ok_or("DATABASE_URL is required unless --dry-run is set")?;
        Arc::new(PgGateway::connect(url, config.database.max_connections).await?)
    };

    // ---- Text generation ----
    let backend = GeminiBackend::new(client.clone(), args.gemini_api_key.clone(), &config.generation);
    let text: Arc<dyn TextGenerator> =
        Arc::new(RetryingGenerator::from_config(backend, &config.generation));
    let params = GenerationParams::from_config(&config.generation);

    // ---- Topic selection ----
    let source = Arc::new(KakaoSource::new(client.clone(), config.source.clone()));
    let selector = Arc::new(TopicSelector::new(
        source,
        Arc::clone(&text),
        params.clone(),
        config.topics.clone(),
    ));

    // ---- Images ----
    let primary: Arc<dyn ImageProvider> =
        Arc::new(UnsplashProvider::new(client.clone(), args.unsplash_access_key.clone()));
    let secondary: Option<Arc<dyn ImageProvider>> = match args.flickr_api_key.clone() {
        Some(key) => Some(Arc::new(FlickrProvider::new(
            client.clone(),
            key,
            config.images.allowed_licenses.clone(),
        ))),
        None => {
            info!("No Flickr key; secondary image provider disabled");
            None
        }
    };
    let images = Arc::new(ImageResolver::new(primary, secondary, config.images.clone()));

    // ---- Article generation ----
    let comments = Arc::new(DelayedCommentScheduler::new(
        Arc::clone(&store),
        config.comments.clone(),
    ));
    let generator = Arc::new(ArticleGenerator::new(
        Arc::new(DaumFetcher::new(client, config.fetcher.content_selector.clone())),
        text,
        images,
        store,
        comments,
        params,
    ));

    if args.once {
        let outcome = selector.refresh().await;
        info!(?outcome, queued = selector.queue_len().await, "Topic refresh finished");
        match generator.run_next(&selector).await {
            Some(article) => info!(id = %article.id, title = %article.title, "Generated one article"),
            None => warn!("No article generated"),
        }
        return Ok(());
    }

    let mut scheduler = Scheduler::new(
        selector.clone(),
        Arc::new(ArticleDrainJob::new(selector, generator)),
        ScheduleTiming::from(&config.schedule),
    );
    scheduler.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    scheduler.stop().await;

    Ok(())
}
