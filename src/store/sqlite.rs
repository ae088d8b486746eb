//! Sqlite-backed metadata store.
//!
//! WAL journaling keeps writers from blocking the review server's reads.
//! Schema is managed by sqlx migrations embedded at compile time.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{QueryBuilder, SqlitePool};
use tracing::debug;

use super::{
    remove_file_with_retry, validate_record, MediaRecord, MetadataStore, RecordFilter,
    RecordPhase, StoreError,
};

/// Maximum connections in the pool. The workload is one writer plus the
/// review server's reads.
const MAX_CONNECTIONS: u32 = 5;

/// Sqlite-backed [`MetadataStore`].
#[derive(Debug)]
pub struct SqliteStore {
    path: PathBuf,
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `path`.
    ///
    /// Call [`MetadataStore::ready`] afterwards to apply migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the database cannot be opened.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(Self { path, pool })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn row_to_record(row: (String, String, String, String)) -> MediaRecord {
        let (title, filepath, url, phase) = row;
        MediaRecord {
            title,
            filepath,
            url,
            phase: RecordPhase::from_str_lossy(&phase),
        }
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn ready(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::from(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    async fn save(&self, record: MediaRecord) -> Result<(), StoreError> {
        validate_record(&record)?;
        sqlx::query(
            "INSERT INTO media (title, filepath, url, phase)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(filepath) DO UPDATE
             SET title = excluded.title, url = excluded.url, phase = excluded.phase",
        )
        .bind(&record.title)
        .bind(&record.filepath)
        .bind(&record.url)
        .bind(record.phase.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn confirm(&self, filepath: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE media SET phase = 'confirmed' WHERE filepath = ?")
            .bind(filepath)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::record_not_found(filepath));
        }
        Ok(())
    }

    async fn get(&self, filter: &RecordFilter) -> Result<Option<MediaRecord>, StoreError> {
        let mut builder =
            QueryBuilder::new("SELECT title, filepath, url, phase FROM media WHERE 1 = 1");
        if let Some(phase) = filter.phase {
            builder.push(" AND phase = ");
            builder.push_bind(phase.as_str());
        }
        if let Some(filepath) = &filter.filepath {
            builder.push(" AND filepath = ");
            builder.push_bind(filepath);
        }
        builder.push(" ORDER BY id LIMIT 1");

        let row: Option<(String, String, String, String)> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Self::row_to_record))
    }

    async fn get_all(&self) -> Result<Vec<MediaRecord>, StoreError> {
        let rows: Vec<(String, String, String, String)> =
            sqlx::query_as("SELECT title, filepath, url, phase FROM media ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Self::row_to_record).collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM media")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        // Writes go straight to the database; nothing is buffered here.
        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        // WAL sidecar files are best-effort; sqlite recreates them anyway.
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = self.path.clone().into_os_string();
            sidecar.push(suffix);
            let _ = tokio::fs::remove_file(PathBuf::from(sidecar)).await;
        }
        remove_file_with_retry(&self.path).await
    }
}
