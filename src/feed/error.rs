//! Error types for feed fetching and parsing.

use thiserror::Error;

/// Errors that can occur fetching or parsing a feed page.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The server refused the feed with HTTP 403. For hosted feeds this
    /// usually means the source has gone private.
    #[error("access denied for source '{source_id}' (HTTP 403): the source may be private")]
    AccessDenied {
        /// Source identifier whose feed was refused.
        source_id: String,
    },

    /// The server answered with a non-success status other than 403.
    #[error("feed request '{url}' returned HTTP {status}")]
    HttpStatus {
        /// The feed URL that was requested.
        url: String,
        /// The HTTP status code returned.
        status: u16,
    },

    /// The request failed before a response arrived.
    #[error("network error fetching feed '{url}': {source}")]
    Network {
        /// The feed URL that was requested.
        url: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// The response body was not a parseable feed document.
    #[error("could not parse feed '{url}': {source}")]
    Parse {
        /// The feed URL that was requested.
        url: String,
        /// The underlying parser error.
        #[source]
        source: feed_rs::parser::ParseFeedError,
    },

    /// A feed entry carried no publication timestamp; without one the
    /// watermark comparison is undefined.
    #[error("feed entry '{entry_id}' in '{url}' is missing a publication date")]
    MissingDate {
        /// The feed URL that was requested.
        url: String,
        /// The offending entry's identifier.
        entry_id: String,
    },
}

impl FeedError {
    /// Creates an `AccessDenied` error.
    #[must_use]
    pub fn access_denied(source_id: impl Into<String>) -> Self {
        Self::AccessDenied {
            source_id: source_id.into(),
        }
    }

    /// Creates an `HttpStatus` error.
    #[must_use]
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a `Network` error.
    #[must_use]
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a `Parse` error.
    #[must_use]
    pub fn parse(url: impl Into<String>, source: feed_rs::parser::ParseFeedError) -> Self {
        Self::Parse {
            url: url.into(),
            source,
        }
    }

    /// Creates a `MissingDate` error.
    #[must_use]
    pub fn missing_date(url: impl Into<String>, entry_id: impl Into<String>) -> Self {
        Self::MissingDate {
            url: url.into(),
            entry_id: entry_id.into(),
        }
    }
}
