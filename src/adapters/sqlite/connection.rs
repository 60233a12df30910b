//! SQLite pool setup.
//!
//! One database file holds all three collections, so the engine opens
//! a single pool at startup: parent directory prepared, WAL journal,
//! foreign keys on. The schema itself is applied separately by
//! [`super::migrations::run_migrations`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
    #[error("Could not create database directory: {0}")]
    Directory(#[source] std::io::Error),
    #[error("Could not open database: {0}")]
    Open(#[source] sqlx::Error),
    #[error("Schema setup failed: {0}")]
    Schema(String),
}

/// Open the database behind `database_url`, creating the file and its
/// parent directory when missing.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<SqlitePool, ConnectionError> {
    prepare_directory(database_url)?;

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|_| ConnectionError::InvalidUrl(database_url.to_string()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)
}

/// In-memory pool with the schema already applied. Capped at one
/// connection so every query in a test sees the same database.
pub async fn create_test_pool() -> Result<SqlitePool, ConnectionError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|_| ConnectionError::InvalidUrl("sqlite::memory:".to_string()))?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(ConnectionError::Open)?;

    super::migrations::run_migrations(&pool)
        .await
        .map_err(|e| ConnectionError::Schema(e.to_string()))?;
    Ok(pool)
}

/// SQLite URLs name a file; its directory must exist before
/// `create_if_missing` can create the file itself.
fn prepare_directory(database_url: &str) -> Result<(), ConnectionError> {
    let file = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    if file.is_empty() || file.starts_with(':') {
        return Ok(());
    }

    match Path::new(file).parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
            std::fs::create_dir_all(parent).map_err(ConnectionError::Directory)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_test_pool_carries_schema() {
        let pool = create_test_pool().await.unwrap();
        tokio_test::assert_ok!(sqlx::query("SELECT COUNT(*) FROM tasks").fetch_one(&pool).await);
    }

    #[tokio::test]
    async fn test_file_pool_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!(
            "sqlite:{}/nested/conveyor.db",
            dir.path().to_string_lossy()
        );
        let pool = create_pool(&url, 2).await.unwrap();
        tokio_test::assert_ok!(sqlx::query("SELECT 1").fetch_one(&pool).await);
    }

    #[test]
    fn test_memory_urls_need_no_directory() {
        assert!(prepare_directory("sqlite::memory:").is_ok());
        assert!(prepare_directory("sqlite:").is_ok());
    }
}
