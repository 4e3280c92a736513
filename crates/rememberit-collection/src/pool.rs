//! Scratch database management
//!
//! A downloaded collection is written into a private temporary directory and
//! opened there. The directory and everything in it is removed when the
//! [`ScratchDatabase`] is dropped, on success and failure alike.
//!
//! Connections use the rollback journal rather than WAL so the exported file
//! is self-contained once the pool is closed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tempfile::TempDir;

use crate::schema::UNICASE;
use crate::CollectionError;

const FILE_NAME: &str = "collection.anki2";

/// A collection file in a scratch directory plus its connection pool
///
/// The pool has a single connection: every statement sees the writes of the
/// previous one and nothing else touches the file.
pub struct ScratchDatabase {
    // Field order matters: the pool must close before the directory goes.
    pool: SqlitePool,
    path: PathBuf,
    _dir: TempDir,
}

impl ScratchDatabase {
    /// Materialise `bytes` as a database file and open it
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::OpenFailed` if the scratch directory cannot
    /// be created, the file cannot be written, or SQLite rejects it.
    pub async fn from_bytes(bytes: &[u8]) -> Result<Self, CollectionError> {
        let (dir, path) = Self::scratch_path()?;
        std::fs::write(&path, bytes).map_err(|e| open_failed(&path, e))?;
        Self::connect(dir, path, false).await
    }

    /// Create a new, empty database file
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::OpenFailed` if the file cannot be created.
    pub async fn create_empty() -> Result<Self, CollectionError> {
        let (dir, path) = Self::scratch_path()?;
        Self::connect(dir, path, true).await
    }

    fn scratch_path() -> Result<(TempDir, PathBuf), CollectionError> {
        let dir = tempfile::Builder::new()
            .prefix("rememberit-")
            .tempdir()
            .map_err(|e| open_failed(&std::env::temp_dir(), e))?;
        let path = dir.path().join(FILE_NAME);
        Ok((dir, path))
    }

    async fn connect(
        dir: TempDir,
        path: PathBuf,
        create: bool,
    ) -> Result<Self, CollectionError> {
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Delete)
            .busy_timeout(Duration::from_secs(5))
            .collation(UNICASE, |a: &str, b: &str| {
                a.to_lowercase().cmp(&b.to_lowercase())
            });

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| open_failed(&path, e))?;

        // Fail here rather than on the first real query if the bytes are not
        // a database.
        sqlx::query("SELECT count(*) FROM sqlite_master")
            .execute(&pool)
            .await
            .map_err(|e| open_failed(&path, e))?;

        tracing::debug!(path = %path.display(), "Scratch collection opened");

        Ok(Self {
            pool,
            path,
            _dir: dir,
        })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Path of the scratch file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the pool and return the file contents
    ///
    /// The scratch directory is removed afterwards.
    ///
    /// # Errors
    ///
    /// Returns `CollectionError::QueryFailed` if the file cannot be read back.
    pub async fn export(self) -> Result<Vec<u8>, CollectionError> {
        self.pool.close().await;
        let bytes = std::fs::read(&self.path).map_err(|e| CollectionError::QueryFailed {
            path: self.path.clone(),
            message: format!("failed to read back collection: {e}"),
        })?;
        tracing::debug!(
            path = %self.path.display(),
            size = bytes.len(),
            "Scratch collection exported"
        );
        Ok(bytes)
    }
}

fn open_failed(path: &Path, err: impl std::fmt::Display) -> CollectionError {
    CollectionError::OpenFailed {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
