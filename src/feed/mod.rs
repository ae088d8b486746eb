//! Feed access: cursor-paginated fetching of per-source listing feeds.
//!
//! A source's history is exposed as an RSS/Atom feed ordered newest-first.
//! Each page is addressed by an opaque cursor (the identifier of the last
//! item on the previous page); `None` means the newest page. The
//! [`FeedSource`] trait is the seam the catch-up engine is tested through.

mod error;

pub use error::FeedError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// Items requested per feed page.
pub const PAGE_LIMIT: u32 = 50;

/// One entry from a listing feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Opaque, stable identifier; doubles as the pagination cursor.
    pub id: String,
    /// Publication timestamp, compared against the source watermark.
    pub published_at: DateTime<Utc>,
    /// Human-readable title.
    pub title: String,
    /// HTML fragment carrying the entry body, scanned for media links.
    pub html_body: String,
}

/// One page of feed items, newest first.
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    /// The items on this page, in feed order.
    pub items: Vec<FeedItem>,
}

impl FeedPage {
    /// True when the page carries no items, i.e. the feed is exhausted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Verifies the newest-first ordering the catch-up walk relies on.
    ///
    /// Equal timestamps are permitted; an out-of-order pair is not.
    #[must_use]
    pub fn is_newest_first(&self) -> bool {
        self.items
            .windows(2)
            .all(|pair| pair[0].published_at >= pair[1].published_at)
    }
}

/// A paginated feed of items for a source.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetches one page of `source_id`'s feed.
    ///
    /// `cursor` of `None` requests the newest page; otherwise it is the `id`
    /// of the last item of the previously fetched page.
    ///
    /// # Errors
    ///
    /// Returns `FeedError` if the page cannot be fetched or parsed.
    async fn fetch_page(
        &self,
        source_id: &str,
        cursor: Option<&str>,
    ) -> Result<FeedPage, FeedError>;
}

/// [`FeedSource`] backed by an RSS/Atom endpoint.
///
/// Page URLs follow the `{base}/{source_id}.rss?limit={n}&after={cursor}`
/// convention. The base URL is injectable so tests can point it at a local
/// mock server.
#[derive(Debug, Clone)]
pub struct RssFeedSource {
    client: reqwest::Client,
    base_url: String,
    page_limit: u32,
}

impl RssFeedSource {
    /// Creates a feed source rooted at `base_url` (no trailing slash needed).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            page_limit: PAGE_LIMIT,
        }
    }

    /// Overrides the per-page item limit.
    #[must_use]
    pub fn with_page_limit(mut self, page_limit: u32) -> Self {
        self.page_limit = page_limit;
        self
    }

    fn page_url(&self, source_id: &str, cursor: Option<&str>) -> String {
        let mut url = format!(
            "{}/{}.rss?limit={}",
            self.base_url, source_id, self.page_limit
        );
        if let Some(cursor) = cursor {
            url.push_str("&after=");
            url.push_str(cursor);
        }
        url
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    #[instrument(skip(self), fields(source_id = %source_id))]
    async fn fetch_page(
        &self,
        source_id: &str,
        cursor: Option<&str>,
    ) -> Result<FeedPage, FeedError> {
        let url = self.page_url(source_id, cursor);
        debug!(%url, "fetching feed page");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::network(&url, e))?;

        let status = response.status();
        if status.as_u16() == 403 {
            return Err(FeedError::access_denied(source_id));
        }
        if !status.is_success() {
            return Err(FeedError::http_status(&url, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FeedError::network(&url, e))?;

        let feed =
            feed_rs::parser::parse(body.as_ref()).map_err(|e| FeedError::parse(&url, e))?;

        let mut items = Vec::with_capacity(feed.entries.len());
        for entry in feed.entries {
            let published_at = entry
                .published
                .or(entry.updated)
                .ok_or_else(|| FeedError::missing_date(&url, &entry.id))?;
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let html_body = entry
                .content
                .and_then(|c| c.body)
                .or_else(|| entry.summary.map(|s| s.content))
                .unwrap_or_default();
            items.push(FeedItem {
                id: entry.id,
                published_at,
                title,
                html_body,
            });
        }

        debug!(items = items.len(), "feed page parsed");
        Ok(FeedPage { items })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(id: &str, epoch_secs: i64) -> FeedItem {
        FeedItem {
            id: id.to_string(),
            published_at: Utc.timestamp_opt(epoch_secs, 0).unwrap(),
            title: String::new(),
            html_body: String::new(),
        }
    }

    #[test]
    fn test_page_is_newest_first() {
        let page = FeedPage {
            items: vec![item("a", 300), item("b", 200), item("c", 200)],
        };
        assert!(page.is_newest_first());
    }

    #[test]
    fn test_page_detects_out_of_order_items() {
        let page = FeedPage {
            items: vec![item("a", 100), item("b", 200)],
        };
        assert!(!page.is_newest_first());
    }

    #[test]
    fn test_empty_page_is_trivially_ordered() {
        assert!(FeedPage::default().is_newest_first());
        assert!(FeedPage::default().is_empty());
    }

    const RSS_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>pics</title>
    <link>https://example.com/pics</link>
    <description>pics feed</description>
    <item>
      <guid>t3_newest</guid>
      <title>A fresh picture</title>
      <pubDate>Wed, 20 Aug 2025 10:00:00 GMT</pubDate>
      <description>&lt;a href="https://i.example.com/new.jpg"&gt;link&lt;/a&gt;</description>
    </item>
    <item>
      <guid>t3_older</guid>
      <title>An older picture</title>
      <pubDate>Tue, 19 Aug 2025 10:00:00 GMT</pubDate>
      <description>&lt;a href="https://i.example.com/old.jpg"&gt;link&lt;/a&gt;</description>
    </item>
  </channel>
</rss>"#;

    #[tokio::test]
    async fn test_fetch_first_page_parses_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pics.rss"))
            .and(query_param("limit", "50"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(RSS_BODY, "application/rss+xml"),
            )
            .mount(&server)
            .await;

        let source = RssFeedSource::new(server.uri());
        let page = source.fetch_page("pics", None).await.unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id, "t3_newest");
        assert_eq!(page.items[0].title, "A fresh picture");
        assert!(page.items[0].html_body.contains("new.jpg"));
        assert!(page.is_newest_first());
    }

    #[tokio::test]
    async fn test_fetch_page_sends_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pics.rss"))
            .and(query_param("limit", "50"))
            .and(query_param("after", "t3_older"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(RSS_BODY, "application/rss+xml"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = RssFeedSource::new(server.uri());
        source.fetch_page("pics", Some("t3_older")).await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_page_403_is_access_denied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hidden.rss"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let source = RssFeedSource::new(server.uri());
        let err = source.fetch_page("hidden", None).await.unwrap_err();
        assert!(matches!(err, FeedError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn test_fetch_page_500_is_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky.rss"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = RssFeedSource::new(server.uri());
        let err = source.fetch_page("flaky", None).await.unwrap_err();
        assert!(matches!(err, FeedError::HttpStatus { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_page_garbage_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad.rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not xml at all"))
            .mount(&server)
            .await;

        let source = RssFeedSource::new(server.uri());
        let err = source.fetch_page("bad", None).await.unwrap_err();
        assert!(matches!(err, FeedError::Parse { .. }));
    }
}
