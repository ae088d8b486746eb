//! Catchup Core Library
//!
//! This library implements an incremental media mirror for feed sources:
//! it walks each configured source's listing feed from newest to oldest,
//! downloads the media posts published since the last run, records what it
//! fetched, and serves a local review page for pruning the haul.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Session configuration and watermark persistence
//! - [`feed`] - Cursor-paginated feed access
//! - [`extract`] - Media link extraction from entry HTML
//! - [`catchup`] - The per-source catch-up walk
//! - [`download`] - HTTP fetching, retry policy, global pacing
//! - [`queue`] - The shared single-worker download queue
//! - [`store`] - Media record persistence (JSON or sqlite)
//! - [`review`] - The one-shot review web server

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catchup;
pub mod config;
pub mod download;
pub mod extract;
pub mod feed;
pub mod queue;
pub mod review;
pub mod store;

// Re-export commonly used types
pub use catchup::{CatchUpEngine, CatchUpOutcome, CatchUpReport};
pub use config::{Config, ConfigError, MetadataBackend, Source};
pub use download::{
    classify_error, DownloadError, FailureType, HttpClient, RateLimiter, RetryDecision,
    RetryPolicy, DEFAULT_MAX_RETRIES,
};
pub use feed::{FeedError, FeedItem, FeedPage, FeedSource, RssFeedSource};
pub use queue::{DeadLetter, DownloadJob, DownloadQueue};
pub use review::{ReviewError, ReviewServer};
pub use store::{
    JsonStore, MediaRecord, MetadataStore, RecordFilter, RecordPhase, SqliteStore, StoreError,
};
