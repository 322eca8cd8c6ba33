use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the write lock for longer than the busy timeout
    #[error("Database is locked by another process. Please close it and try again.")]
    Locked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::Locked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) surface only
/// through the message text on some sqlx paths.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Records
// ============================================================================

/// A normalized article as produced by the feed fetcher.
///
/// Every field is resolved at parse time; missing feed fields are replaced by
/// the fallback literals in [`crate::feed`]. `content` stays `None` until the
/// content extractor has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub title: String,
    /// Natural identity: at most one stored row per link.
    pub link: String,
    /// Unix seconds. Fetch time when the feed omitted a date.
    pub published: i64,
    /// Display name of the feed the article came from.
    pub source: String,
    pub content: Option<String>,
}

/// A registered feed.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FeedSource {
    pub id: i64,
    pub url: String,
    pub added_at: i64,
}

/// An article row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredArticle {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub published: Option<i64>,
    pub source: String,
    pub content: Option<String>,
    pub fetched_at: i64,
}

// ============================================================================
// Write Outcomes
// ============================================================================

/// Result of one insert-or-ignore against the articles table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The link was already stored. `backfilled` is true when the existing
    /// row had no content and this attempt supplied it.
    Duplicate { backfilled: bool },
}

/// Aggregate counts for one `save_articles` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub new_articles: usize,
    pub duplicates: usize,
    pub backfilled: usize,
    pub failed: usize,
    /// Articles stored (or skipped) without extracted content.
    pub without_content: usize,
}

/// Aggregate counts for one `upsert_feeds` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedUpsertSummary {
    pub added: usize,
    pub existing: usize,
    pub failed: usize,
}

/// Row counts of the three collector tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub feeds: i64,
    pub articles: i64,
    pub logs: i64,
}
