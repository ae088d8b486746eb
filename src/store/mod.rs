//! Metadata store: the review-session record of what was mirrored.
//!
//! Every dispatched download gets a record in two phases: `Planned` when the
//! job is enqueued and `Confirmed` when the bytes land on disk. The review
//! server annotates listed files with record titles; a record that never
//! reached `Confirmed` marks a download that died in the queue. Two backends
//! exist behind the [`MetadataStore`] trait: a flat JSON file and a sqlite
//! database.

mod error;
mod json;
mod sqlite;

pub use error::StoreError;
pub use json::JsonStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a media record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordPhase {
    /// The download was enqueued; the file may not exist yet.
    Planned,
    /// The download completed and the file is on disk.
    Confirmed,
}

impl RecordPhase {
    /// Stable string form, used as the sqlite column value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Confirmed => "confirmed",
        }
    }

    /// Parses the stable string form; unknown values map to `Planned`.
    #[must_use]
    pub fn from_str_lossy(value: &str) -> Self {
        if value == "confirmed" {
            Self::Confirmed
        } else {
            Self::Planned
        }
    }
}

/// One mirrored media file's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    /// Title of the feed entry the media came from.
    pub title: String,
    /// Local path the media was (or will be) written to.
    pub filepath: String,
    /// Remote URL the media was fetched from.
    pub url: String,
    /// Whether the download has completed.
    pub phase: RecordPhase,
}

impl MediaRecord {
    /// Creates a record in the `Planned` phase.
    #[must_use]
    pub fn planned(
        title: impl Into<String>,
        filepath: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            filepath: filepath.into(),
            url: url.into(),
            phase: RecordPhase::Planned,
        }
    }
}

/// Criteria for [`MetadataStore::get`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Match only records in this phase.
    pub phase: Option<RecordPhase>,
    /// Match only the record at this filepath.
    pub filepath: Option<String>,
}

impl RecordFilter {
    /// Filter for confirmed records, the review server's view.
    #[must_use]
    pub fn confirmed() -> Self {
        Self {
            phase: Some(RecordPhase::Confirmed),
            filepath: None,
        }
    }

    /// Filter for records still in the planned phase.
    #[must_use]
    pub fn planned() -> Self {
        Self {
            phase: Some(RecordPhase::Planned),
            filepath: None,
        }
    }

    /// True when `record` satisfies every set criterion.
    #[must_use]
    pub fn matches(&self, record: &MediaRecord) -> bool {
        if let Some(phase) = self.phase {
            if record.phase != phase {
                return false;
            }
        }
        if let Some(filepath) = &self.filepath {
            if &record.filepath != filepath {
                return false;
            }
        }
        true
    }
}

/// Persistent store of media records for one mirroring session.
///
/// Implementations are shared across tasks (`Arc<dyn MetadataStore>`), so
/// all methods take `&self` and synchronize internally.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Prepares the backend: loads or creates the backing file, runs
    /// migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backing file exists but cannot be read.
    async fn ready(&self) -> Result<(), StoreError>;

    /// Inserts a record, replacing any existing record at the same filepath.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend rejects the write.
    async fn save(&self, record: MediaRecord) -> Result<(), StoreError>;

    /// Promotes the record at `filepath` to [`RecordPhase::Confirmed`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::RecordNotFound`] if no record exists at
    /// `filepath`.
    async fn confirm(&self, filepath: &str) -> Result<(), StoreError>;

    /// Returns the first record matching `filter`, in insertion order, or
    /// `None` when nothing matches.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be queried.
    async fn get(&self, filter: &RecordFilter) -> Result<Option<MediaRecord>, StoreError>;

    /// Returns every record.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be queried.
    async fn get_all(&self) -> Result<Vec<MediaRecord>, StoreError>;

    /// Removes every record, keeping the backing file.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend rejects the write.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Persists any buffered state to the backing file.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the write fails.
    async fn flush(&self) -> Result<(), StoreError>;

    /// Removes the backing file itself, retrying briefly if the filesystem
    /// refuses (the file may still be held open on some platforms).
    ///
    /// A missing backing file is a success.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DeleteExhausted`] when the retry budget runs
    /// out.
    async fn delete(&self) -> Result<(), StoreError>;
}

/// Shared `save` precondition for both backends.
pub(crate) fn validate_record(record: &MediaRecord) -> Result<(), StoreError> {
    if record.filepath.is_empty() {
        return Err(StoreError::EmptyField { field: "filepath" });
    }
    if record.url.is_empty() {
        return Err(StoreError::EmptyField { field: "url" });
    }
    Ok(())
}

/// Removal attempts before `delete` gives up.
pub(crate) const DELETE_MAX_ATTEMPTS: u32 = 10;

/// Pause between removal attempts.
pub(crate) const DELETE_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

/// Shared bounded-retry file removal for both backends.
pub(crate) async fn remove_file_with_retry(path: &std::path::Path) -> Result<(), StoreError> {
    for attempt in 1..=DELETE_MAX_ATTEMPTS {
        match tokio::fs::remove_file(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    attempt,
                    max_attempts = DELETE_MAX_ATTEMPTS,
                    error = %e,
                    "store file removal failed"
                );
            }
        }
        if attempt < DELETE_MAX_ATTEMPTS {
            tokio::time::sleep(DELETE_RETRY_DELAY).await;
        }
    }
    Err(StoreError::delete_exhausted(path, DELETE_MAX_ATTEMPTS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_round_trips_through_str() {
        assert_eq!(
            RecordPhase::from_str_lossy(RecordPhase::Planned.as_str()),
            RecordPhase::Planned
        );
        assert_eq!(
            RecordPhase::from_str_lossy(RecordPhase::Confirmed.as_str()),
            RecordPhase::Confirmed
        );
        assert_eq!(RecordPhase::from_str_lossy("garbage"), RecordPhase::Planned);
    }

    #[test]
    fn test_filter_matches_phase_and_filepath() {
        let record = MediaRecord {
            title: "t".to_string(),
            filepath: "downloads/a.jpg".to_string(),
            url: "https://i.example.com/a.jpg".to_string(),
            phase: RecordPhase::Confirmed,
        };

        assert!(RecordFilter::default().matches(&record));
        assert!(RecordFilter::confirmed().matches(&record));
        assert!(!RecordFilter::planned().matches(&record));

        let by_path = RecordFilter {
            phase: None,
            filepath: Some("downloads/a.jpg".to_string()),
        };
        assert!(by_path.matches(&record));

        let wrong_path = RecordFilter {
            phase: Some(RecordPhase::Confirmed),
            filepath: Some("downloads/b.jpg".to_string()),
        };
        assert!(!wrong_path.matches(&record));
    }
}
