use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError, TableCounts};
use crate::eventlog::LOGS_TABLE_DDL;

// ============================================================================
// Connection Options
// ============================================================================

/// Build connect options shared by the article store and the event log store.
///
/// File databases use WAL so the log writer and the article writer (two
/// separate pools on the same file) do not block each other's readers.
/// busy_timeout=5000: SQLite waits up to 5 seconds for the other writer
/// before returning SQLITE_BUSY.
pub(crate) fn connect_options(path: &str) -> Result<SqliteConnectOptions, DatabaseError> {
    let url = format!("sqlite:{}?mode=rwc", path);
    let mut options = SqliteConnectOptions::from_str(&url)
        .map_err(DatabaseError::from_sqlx)?
        .pragma("busy_timeout", "5000");

    if path != ":memory:" {
        options = options.journal_mode(SqliteJournalMode::Wal);

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
                }
            }
        }
    }

    Ok(options)
}

// ============================================================================
// Database
// ============================================================================

/// Handle to the article/feed store.
///
/// Cheap to clone (wraps a pool). Must not be shared with the event log
/// sink, which owns its own [`crate::eventlog::LogStore`].
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Locked` if another process keeps the database
    /// locked past the busy timeout.
    /// Returns `DatabaseError::Migration` / `DatabaseError::Other` otherwise.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let options = connect_options(path)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            if is_lock_message(&e.to_string()) {
                DatabaseError::Locked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        tracing::debug!(path = %path, "Opened article database");
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                url TEXT UNIQUE NOT NULL,
                added_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                link TEXT UNIQUE NOT NULL,
                published INTEGER,
                source TEXT NOT NULL,
                content TEXT,
                fetched_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published DESC)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source)")
            .execute(&mut *tx)
            .await?;

        // Same DDL the log sink runs, so status queries work before the sink starts
        sqlx::query(LOGS_TABLE_DDL).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Row counts for the feeds, articles and logs tables.
    pub async fn table_counts(&self) -> Result<TableCounts> {
        let (feeds,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM feeds")
            .fetch_one(&self.pool)
            .await?;
        let (articles,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        let (logs,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(TableCounts {
            feeds,
            articles,
            logs,
        })
    }
}
