//! Configuration: the JSON file driving a mirroring session.
//!
//! The config is read once at startup and rewritten after each source
//! finishes, carrying the advanced watermarks forward to the next run. Keys
//! are camelCase for compatibility with hand-edited files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default directory media files land in.
const DEFAULT_DOWNLOAD_PATH: &str = "downloads";

/// Default root the per-source feed URLs hang off.
const DEFAULT_FEED_BASE_URL: &str = "https://www.reddit.com/r";

/// Default pause between feed pages, in seconds.
const DEFAULT_PAGE_DELAY_SECS: u64 = 3;

/// Default minimum spacing between downloads, in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 50;

/// Errors that can occur loading or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Filesystem error on the config file.
    #[error("config I/O error at '{path}': {source}")]
    Io {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON (or has the wrong shape).
    #[error("could not parse config '{path}': {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// `excludeTitle` is not a valid regular expression.
    #[error("invalid excludeTitle pattern '{pattern}': {source}")]
    InvalidTitlePattern {
        /// The offending pattern.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn parse(path: &Path, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Which backend persists media records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    /// Flat JSON file, the default.
    #[default]
    Json,
    /// Sqlite database.
    Sqlite,
}

/// One source to catch up, derived from the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Feed identifier, e.g. `"pics"`.
    pub id: String,
    /// Watermark: items at or after this instant are already mirrored.
    pub since: DateTime<Utc>,
    /// Directory this source's media lands in.
    pub dir: PathBuf,
}

/// The session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Root directory for downloaded media.
    pub download_path: PathBuf,
    /// Base URL the per-source feeds hang off; `{base}/{id}.rss` must serve
    /// the source's feed.
    pub feed_base_url: String,
    /// Extension deny-list, entries with leading dot (e.g. `".webm"`).
    pub exclude: Vec<String>,
    /// Allow-listed media hosts.
    pub domains: Vec<String>,
    /// When true, every source downloads into `download_path` directly
    /// instead of a per-source subdirectory.
    pub consolidate: bool,
    /// Optional regex; entries whose title matches are skipped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude_title: Option<String>,
    /// Source id to watermark, as milliseconds since the Unix epoch.
    pub feeds: BTreeMap<String, i64>,
    /// Pause between feed pages of one source, in seconds.
    pub page_delay_secs: u64,
    /// Minimum spacing between downloads, in milliseconds. Zero disables
    /// pacing.
    pub rate_limit_ms: u64,
    /// Retry ceiling per download job.
    pub max_retries: u32,
    /// Which metadata store backend to use.
    pub metadata_backend: MetadataBackend,
    /// Review server port; 0 asks the OS for an ephemeral port.
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_path: PathBuf::from(DEFAULT_DOWNLOAD_PATH),
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            exclude: Vec::new(),
            domains: vec!["imgur.com".to_string(), "i.redd.it".to_string()],
            consolidate: false,
            exclude_title: None,
            feeds: BTreeMap::new(),
            page_delay_secs: DEFAULT_PAGE_DELAY_SECS,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            max_retries: crate::download::DEFAULT_MAX_RETRIES,
            metadata_backend: MetadataBackend::default(),
            port: 0,
        }
    }
}

impl Config {
    /// Loads the configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|e| ConfigError::parse(path, e))?;
        debug!(path = %path.display(), sources = config.feeds.len(), "loaded config");
        Ok(config)
    }

    /// Writes the configuration to `path` atomically (temp file + rename).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::parse(path, e))?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, json).map_err(|e| ConfigError::io(&temp_path, e))?;
        std::fs::rename(&temp_path, path).map_err(|e| ConfigError::io(path, e))?;
        debug!(path = %path.display(), "saved config");
        Ok(())
    }

    /// The sources to catch up, one per `feeds` entry.
    ///
    /// Watermarks that don't fit a valid timestamp fall back to the epoch,
    /// which mirrors everything the feed still serves.
    #[must_use]
    pub fn sources(&self) -> Vec<Source> {
        self.feeds
            .iter()
            .map(|(id, &since_ms)| Source {
                id: id.clone(),
                since: DateTime::<Utc>::from_timestamp_millis(since_ms)
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                dir: self.source_dir(id),
            })
            .collect()
    }

    /// Directory a source's media lands in, honoring `consolidate`.
    #[must_use]
    pub fn source_dir(&self, source_id: &str) -> PathBuf {
        if self.consolidate {
            self.download_path.clone()
        } else {
            self.download_path.join(source_id)
        }
    }

    /// Advances a source's watermark.
    pub fn set_since(&mut self, source_id: &str, since: DateTime<Utc>) {
        self.feeds
            .insert(source_id.to_string(), since.timestamp_millis());
    }

    /// Compiles the `excludeTitle` pattern, if configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTitlePattern`] when the pattern does
    /// not compile.
    pub fn exclude_title_regex(&self) -> Result<Option<Regex>, ConfigError> {
        match &self.exclude_title {
            None => Ok(None),
            Some(pattern) => Regex::new(pattern).map(Some).map_err(|source| {
                ConfigError::InvalidTitlePattern {
                    pattern: pattern.clone(),
                    source,
                }
            }),
        }
    }

    /// Path of the metadata store's backing file.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        match self.metadata_backend {
            MetadataBackend::Json => self.download_path.join("imagedata.json"),
            MetadataBackend::Sqlite => self.download_path.join("imagedata.db"),
        }
    }
}
