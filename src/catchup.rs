//! The catch-up engine: walks one source's feed from newest to oldest until
//! it reaches already-mirrored territory.
//!
//! Pages are fetched through the [`FeedSource`] seam; each page's items are
//! filtered (watermark, title pattern, host allow-list, extension deny-list,
//! already-on-disk) and the survivors are dispatched to the shared download
//! queue with a planned record saved first. The walk ends when the last item
//! of a page predates the watermark (caught up), the feed runs out of pages
//! (exhausted), access is denied, or the feed misbehaves.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::config::Source;
use crate::download::{extension_from_name, filename_from_url, is_excluded_extension};
use crate::extract::extract_media_links;
use crate::feed::{FeedError, FeedItem, FeedSource};
use crate::queue::{DownloadJob, DownloadQueue};
use crate::store::{MediaRecord, MetadataStore};

/// How one source's catch-up walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatchUpOutcome {
    /// Reached items older than the watermark; everything newer was seen.
    CaughtUp,
    /// The feed ran out of pages before reaching the watermark.
    Exhausted,
    /// The feed returned HTTP 403.
    Denied,
    /// The walk aborted on an error or a misbehaving feed.
    Failed(String),
}

impl CatchUpOutcome {
    /// Whether the source's watermark should advance after this outcome.
    ///
    /// Denied and failed walks keep the old watermark so the next run
    /// retries the same range.
    #[must_use]
    pub fn advances_watermark(&self) -> bool {
        matches!(self, Self::CaughtUp | Self::Exhausted)
    }

    /// Human-readable one-liner for the session summary.
    #[must_use]
    pub fn message(&self, source_id: &str) -> String {
        match self {
            Self::CaughtUp => format!("'{source_id}' is caught up"),
            Self::Exhausted => format!("'{source_id}' feed is exhausted"),
            Self::Denied => {
                format!("'{source_id}' denied access; the source may be private or removed")
            }
            Self::Failed(reason) => format!("'{source_id}' failed: {reason}"),
        }
    }
}

/// Result of one source's catch-up walk.
#[derive(Debug, Clone)]
pub struct CatchUpReport {
    /// How the walk ended.
    pub outcome: CatchUpOutcome,
    /// Watermark to adopt if [`CatchUpOutcome::advances_watermark`]: the
    /// newest item seen, or the session start for a feed that served none.
    pub new_watermark: DateTime<Utc>,
    /// How many download jobs this walk enqueued.
    pub dispatched: usize,
}

/// Per-source feed walker.
pub struct CatchUpEngine {
    feed: Arc<dyn FeedSource>,
    queue: DownloadQueue,
    store: Arc<dyn MetadataStore>,
    source: Source,
    domains: Vec<String>,
    exclude: Vec<String>,
    exclude_title: Option<Regex>,
    page_delay: Duration,
}

impl CatchUpEngine {
    /// Creates an engine for one source.
    #[must_use]
    pub fn new(
        feed: Arc<dyn FeedSource>,
        queue: DownloadQueue,
        store: Arc<dyn MetadataStore>,
        source: Source,
        domains: Vec<String>,
    ) -> Self {
        Self {
            feed,
            queue,
            store,
            source,
            domains,
            exclude: Vec::new(),
            exclude_title: None,
            page_delay: Duration::from_secs(3),
        }
    }

    /// Sets the extension deny-list.
    #[must_use]
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Sets the title skip pattern.
    #[must_use]
    pub fn with_exclude_title(mut self, pattern: Option<Regex>) -> Self {
        self.exclude_title = pattern;
        self
    }

    /// Sets the pause between feed pages.
    #[must_use]
    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    /// Walks the feed until caught up, exhausted, denied, or failed.
    #[instrument(skip(self), fields(source_id = %self.source.id))]
    pub async fn run(&self) -> CatchUpReport {
        let session_start = Utc::now();
        let mut cursor: Option<String> = None;
        let mut newest_seen: Option<DateTime<Utc>> = None;
        let mut dispatched = 0;

        let outcome = loop {
            let page = match self
                .feed
                .fetch_page(&self.source.id, cursor.as_deref())
                .await
            {
                Ok(page) => page,
                Err(FeedError::AccessDenied { .. }) => break CatchUpOutcome::Denied,
                Err(e) => break CatchUpOutcome::Failed(e.to_string()),
            };

            if page.is_empty() {
                break CatchUpOutcome::Exhausted;
            }
            // The watermark comparison on the page's last item only stops the
            // walk correctly when pages run newest to oldest.
            if !page.is_newest_first() {
                break CatchUpOutcome::Failed("feed page is not ordered newest-first".to_string());
            }

            if newest_seen.is_none() {
                newest_seen = Some(page.items[0].published_at);
            }

            for item in &page.items {
                if item.published_at < self.source.since {
                    continue;
                }
                if let Some(pattern) = &self.exclude_title {
                    if pattern.is_match(&item.title) {
                        debug!(item_id = %item.id, title = %item.title, "title excluded");
                        continue;
                    }
                }
                for link in extract_media_links(&item.html_body, &self.domains) {
                    dispatched += self.dispatch(item, &link).await;
                }
            }

            // Guaranteed non-empty by the check above.
            let Some(last) = page.items.last() else {
                break CatchUpOutcome::Exhausted;
            };
            if last.published_at < self.source.since {
                break CatchUpOutcome::CaughtUp;
            }

            cursor = Some(last.id.clone());
            tokio::time::sleep(self.page_delay).await;
        };

        info!(
            outcome = %outcome.message(&self.source.id),
            dispatched,
            "catch-up finished"
        );

        CatchUpReport {
            outcome,
            new_watermark: newest_seen.unwrap_or(session_start),
            dispatched,
        }
    }

    /// Dispatches one media link; returns 1 if a job was enqueued.
    async fn dispatch(&self, item: &FeedItem, url: &str) -> usize {
        let Some(name) = filename_from_url(url) else {
            debug!(%url, "no usable filename, skipping");
            return 0;
        };
        if extension_from_name(&name).is_none() {
            debug!(%url, "no extension, skipping");
            return 0;
        }
        if is_excluded_extension(&name, &self.exclude) {
            debug!(%url, "extension excluded, skipping");
            return 0;
        }

        // Build the job before the on-disk check so the gifv-normalized
        // destination is the one compared.
        let job = DownloadJob::new(url, self.source.dir.join(&name));
        if job.dest().exists() {
            debug!(dest = %job.dest().display(), "already on disk, skipping");
            return 0;
        }

        let filepath = job.dest().to_string_lossy().to_string();
        let record = MediaRecord::planned(&item.title, &filepath, job.url());
        if let Err(error) = self.store.save(record).await {
            warn!(%filepath, %error, "could not save planned record");
        }

        self.queue.enqueue(job);
        1
    }
}
