//! Session orchestration: catch up every configured source, then optionally
//! review.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use catchup_core::{
    CatchUpEngine, Config, DownloadQueue, FeedSource, HttpClient, JsonStore, MetadataBackend,
    MetadataStore, RateLimiter, RetryPolicy, ReviewServer, RssFeedSource, SqliteStore,
};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cli::Args;

/// Runs one full session: catch-up walk (unless `--bypass`), queue drain,
/// and the review server when requested.
pub async fn run(args: &Args) -> Result<()> {
    let mut config = Config::load(&args.config)
        .with_context(|| format!("loading config '{}'", args.config.display()))?;
    if let Some(port) = args.port {
        config.port = port;
    }

    tokio::fs::create_dir_all(&config.download_path)
        .await
        .with_context(|| {
            format!(
                "creating download directory '{}'",
                config.download_path.display()
            )
        })?;

    let store: Arc<dyn MetadataStore> = match config.metadata_backend {
        MetadataBackend::Json => Arc::new(JsonStore::new(config.store_path())),
        MetadataBackend::Sqlite => Arc::new(SqliteStore::open(config.store_path()).await?),
    };
    store.ready().await.context("preparing metadata store")?;

    if args.bypass {
        info!("bypassing catch-up; reviewing the existing session");
    } else {
        catch_up(args, &mut config, &store).await?;
    }

    if args.serve || args.bypass {
        let mut dirs: Vec<_> = config.sources().into_iter().map(|s| s.dir).collect();
        dirs.sort();
        dirs.dedup();
        let server = ReviewServer::bind(store.clone(), ".", dirs, config.port).await?;
        info!(addr = %server.addr(), "session ready for review");
        server.serve().await?;
        // The review emptied the store; remove its backing file so the next
        // session starts clean.
        store.delete().await?;
    } else {
        store.flush().await.context("flushing metadata store")?;
    }

    Ok(())
}

/// Walks every configured source concurrently, advancing watermarks as each
/// one finishes, then drains the shared download queue.
async fn catch_up(args: &Args, config: &mut Config, store: &Arc<dyn MetadataStore>) -> Result<()> {
    let sources = config.sources();
    if sources.is_empty() {
        info!("no feeds configured; nothing to catch up");
        return Ok(());
    }

    let exclude_title = config
        .exclude_title_regex()
        .context("compiling excludeTitle pattern")?;

    let limiter = if config.rate_limit_ms == 0 {
        Arc::new(RateLimiter::disabled())
    } else {
        Arc::new(RateLimiter::new(Duration::from_millis(config.rate_limit_ms)))
    };
    let policy = RetryPolicy::with_max_attempts(config.max_retries);
    let queue =
        DownloadQueue::new(HttpClient::new(), limiter, policy).with_store(store.clone());
    let feed: Arc<dyn FeedSource> = Arc::new(RssFeedSource::new(config.feed_base_url.clone()));

    let mut walks = JoinSet::new();
    for source in sources {
        ensure_dir(&source.dir).await?;
        let source_id = source.id.clone();
        let engine = CatchUpEngine::new(
            feed.clone(),
            queue.clone(),
            store.clone(),
            source,
            config.domains.clone(),
        )
        .with_exclude(config.exclude.clone())
        .with_exclude_title(exclude_title.clone())
        .with_page_delay(Duration::from_secs(config.page_delay_secs));
        walks.spawn(async move { (source_id, engine.run().await) });
    }

    while let Some(joined) = walks.join_next().await {
        match joined {
            Ok((source_id, report)) => {
                info!(
                    dispatched = report.dispatched,
                    "{}",
                    report.outcome.message(&source_id)
                );
                if report.outcome.advances_watermark() && !args.preserve {
                    config.set_since(&source_id, report.new_watermark);
                    config.save(&args.config).with_context(|| {
                        format!("rewriting config '{}'", args.config.display())
                    })?;
                }
            }
            Err(e) => warn!(error = %e, "catch-up task panicked"),
        }
    }

    queue.drain().await;
    for dead in queue.dead_letters() {
        warn!(
            url = %dead.job.url(),
            attempts = dead.attempts,
            error = %dead.error,
            "download abandoned"
        );
    }

    store.flush().await.context("flushing metadata store")?;
    Ok(())
}

async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("creating source directory '{}'", dir.display()))
}
