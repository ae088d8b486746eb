//! Flat-file JSON metadata store.
//!
//! Records live in memory behind a mutex; `flush` serializes them to the
//! backing file via a temp-file-and-rename so a crash mid-write never leaves
//! a truncated store behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{
    remove_file_with_retry, validate_record, MediaRecord, MetadataStore, RecordFilter,
    RecordPhase, StoreError,
};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    records: Vec<MediaRecord>,
}

/// JSON-backed [`MetadataStore`].
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    records: Mutex<Vec<MediaRecord>>,
}

impl JsonStore {
    /// Creates a store backed by the file at `path`. Call
    /// [`MetadataStore::ready`] before use to load any existing records.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_records(&self, records: &[MediaRecord]) -> Result<(), StoreError> {
        let file = StoreFile {
            records: records.to_vec(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| StoreError::serialization(&self.path, e))?;

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| StoreError::io(&temp_path, e))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonStore {
    async fn ready(&self) -> Result<(), StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no existing store file, starting empty");
                return Ok(());
            }
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        let file: StoreFile = serde_json::from_str(&contents)
            .map_err(|e| StoreError::serialization(&self.path, e))?;
        let mut records = self.records.lock().await;
        *records = file.records;
        debug!(
            path = %self.path.display(),
            records = records.len(),
            "loaded store file"
        );
        Ok(())
    }

    async fn save(&self, record: MediaRecord) -> Result<(), StoreError> {
        validate_record(&record)?;
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| r.filepath == record.filepath) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn confirm(&self, filepath: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|r| r.filepath == filepath)
            .ok_or_else(|| StoreError::record_not_found(filepath))?;
        record.phase = RecordPhase::Confirmed;
        Ok(())
    }

    async fn get(&self, filter: &RecordFilter) -> Result<Option<MediaRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|r| filter.matches(r)).cloned())
    }

    async fn get_all(&self) -> Result<Vec<MediaRecord>, StoreError> {
        Ok(self.records.lock().await.clone())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.records.lock().await.clear();
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let records = self.records.lock().await;
        self.write_records(&records).await
    }

    async fn delete(&self) -> Result<(), StoreError> {
        self.records.lock().await.clear();
        remove_file_with_retry(&self.path).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(filepath: &str) -> MediaRecord {
        MediaRecord::planned("a title", filepath, "https://i.example.com/x.jpg")
    }

    #[tokio::test]
    async fn test_save_confirm_get() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path().join("imagedata.json"));
        store.ready().await.unwrap();

        store.save(record("downloads/a.jpg")).await.unwrap();
        store.save(record("downloads/b.jpg")).await.unwrap();
        store.confirm("downloads/a.jpg").await.unwrap();

        let confirmed = store.get(&RecordFilter::confirmed()).await.unwrap().unwrap();
        assert_eq!(confirmed.filepath, "downloads/a.jpg");

        let planned = store.get(&RecordFilter::planned()).await.unwrap().unwrap();
        assert_eq!(planned.filepath, "downloads/b.jpg");
    }

    #[tokio::test]
    async fn test_get_returns_first_match_in_insertion_order() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path().join("imagedata.json"));
        store.ready().await.unwrap();

        store.save(record("downloads/a.jpg")).await.unwrap();
        store.save(record("downloads/b.jpg")).await.unwrap();

        let first = store.get(&RecordFilter::planned()).await.unwrap().unwrap();
        assert_eq!(first.filepath, "downloads/a.jpg");
        assert!(store
            .get(&RecordFilter::confirmed())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_record_at_same_filepath() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path().join("imagedata.json"));
        store.ready().await.unwrap();

        store.save(record("downloads/a.jpg")).await.unwrap();
        let mut updated = record("downloads/a.jpg");
        updated.title = "new title".to_string();
        store.save(updated).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "new title");
    }

    #[tokio::test]
    async fn test_save_rejects_empty_fields() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path().join("imagedata.json"));
        store.ready().await.unwrap();

        let err = store
            .save(MediaRecord::planned("t", "", "https://i.example.com/x.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyField { field: "filepath" }));

        let err = store
            .save(MediaRecord::planned("t", "downloads/x.jpg", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyField { field: "url" }));
    }

    #[tokio::test]
    async fn test_confirm_missing_record_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = JsonStore::new(temp.path().join("imagedata.json"));
        store.ready().await.unwrap();

        let err = store.confirm("downloads/ghost.jpg").await.unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn test_flush_and_reload_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("imagedata.json");

        let store = JsonStore::new(&path);
        store.ready().await.unwrap();
        store.save(record("downloads/a.jpg")).await.unwrap();
        store.confirm("downloads/a.jpg").await.unwrap();
        store.flush().await.unwrap();

        let reloaded = JsonStore::new(&path);
        reloaded.ready().await.unwrap();
        let all = reloaded.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].phase, RecordPhase::Confirmed);
    }

    #[tokio::test]
    async fn test_delete_removes_backing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("imagedata.json");

        let store = JsonStore::new(&path);
        store.ready().await.unwrap();
        store.save(record("downloads/a.jpg")).await.unwrap();
        store.flush().await.unwrap();
        assert!(path.exists());

        store.delete().await.unwrap();
        assert!(!path.exists());
        assert!(store.get_all().await.unwrap().is_empty());

        // Deleting again is a no-op.
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_ready_rejects_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("imagedata.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonStore::new(&path);
        let err = store.ready().await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }
}
