use anyhow::Result;
use futures::stream::{self, StreamExt};
use sqlx::{QueryBuilder, SqliteConnection};
use std::collections::{HashMap, HashSet};

use super::schema::Database;
use super::types::{ArticleRecord, InsertOutcome, SaveSummary, StoredArticle};
use crate::content::Extractor;
use crate::eventlog::EventLog;

/// Maximum number of articles to return from any single query (OOM protection)
const MAX_ARTICLES: i64 = 2000;

/// Bind parameters per `IN (...)` lookup, well under SQLite's 999 limit.
const LOOKUP_BATCH_SIZE: usize = 500;

impl Database {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Extract content for each record and insert-or-ignore it keyed on link.
    ///
    /// Per record: new row -> INFO "New article added", existing link ->
    /// INFO "Duplicate article skipped", storage failure -> ERROR, and the
    /// batch continues. All inserts share one transaction committed once.
    ///
    /// Extraction runs before the transaction opens, up to
    /// `extractor.concurrency()` requests at a time, so the SQLite write
    /// lock is never held across network calls. Links already stored with
    /// content are not re-extracted. Records that arrive with `content`
    /// already set are stored as-is.
    ///
    /// # Errors
    ///
    /// Only begin/commit failures (storage faults affecting the whole call).
    pub async fn save_articles(
        &self,
        records: &[ArticleRecord],
        extractor: &Extractor,
        events: &EventLog,
    ) -> Result<SaveSummary> {
        let mut summary = SaveSummary::default();
        if records.is_empty() {
            return Ok(summary);
        }

        let extracted = self.extract_missing_content(records, extractor).await;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let content = record.content.as_deref().or_else(|| {
                extracted
                    .get(record.link.as_str())
                    .and_then(|c| c.as_deref())
            });

            match insert_article(&mut tx, record, content, now).await {
                Ok(InsertOutcome::Inserted) => {
                    summary.new_articles += 1;
                    if content.is_none() {
                        summary.without_content += 1;
                    }
                    events.info(format!("New article added: {}", record.title));
                }
                Ok(InsertOutcome::Duplicate { backfilled }) => {
                    summary.duplicates += 1;
                    if backfilled {
                        summary.backfilled += 1;
                    }
                    events.info(format!("Duplicate article skipped: {}", record.link));
                }
                Err(e) => {
                    summary.failed += 1;
                    events.error(format!(
                        "Error saving article: {}, Error: {}",
                        record.title, e
                    ));
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(
            new = summary.new_articles,
            duplicates = summary.duplicates,
            backfilled = summary.backfilled,
            failed = summary.failed,
            "Article batch committed"
        );
        Ok(summary)
    }

    /// Run the extractor once per distinct link that still needs content.
    async fn extract_missing_content<'a>(
        &self,
        records: &'a [ArticleRecord],
        extractor: &Extractor,
    ) -> HashMap<&'a str, Option<String>> {
        let mut seen = HashSet::new();
        let links: Vec<&str> = records
            .iter()
            .filter(|r| r.content.is_none())
            .map(|r| r.link.as_str())
            .filter(|link| seen.insert(*link))
            .collect();

        let complete = match self.links_with_content(&links).await {
            Ok(found) => found,
            Err(e) => {
                // Fall back to extracting everything; inserts still dedup by link
                tracing::warn!(error = %e, "Failed to look up stored content, extracting all links");
                HashSet::new()
            }
        };

        let pending: Vec<&str> = links
            .into_iter()
            .filter(|link| !complete.contains(*link))
            .collect();
        if !complete.is_empty() {
            tracing::debug!(
                skipped = complete.len(),
                pending = pending.len(),
                "Skipping extraction for links already stored with content"
            );
        }

        stream::iter(pending)
            .map(|link| async move { (link, extractor.extract(link).await) })
            .buffer_unordered(extractor.concurrency())
            .collect()
            .await
    }

    /// Subset of `links` already stored with non-NULL content.
    pub async fn links_with_content(&self, links: &[&str]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();

        for chunk in links.chunks(LOOKUP_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "SELECT link FROM articles WHERE content IS NOT NULL AND link IN (",
            );
            let mut separated = builder.separated(", ");
            for link in chunk {
                separated.push_bind(*link);
            }
            separated.push_unseparated(")");

            let rows: Vec<(String,)> = builder.build_query_as().fetch_all(&self.pool).await?;
            found.extend(rows.into_iter().map(|(link,)| link));
        }

        Ok(found)
    }

    // ========================================================================
    // Article Queries
    // ========================================================================

    /// Get a single article by its link.
    pub async fn get_article_by_link(&self, link: &str) -> Result<Option<StoredArticle>> {
        let row = sqlx::query_as::<_, StoredArticle>(
            r#"
            SELECT id, title, link, published, source, content, fetched_at
            FROM articles
            WHERE link = ?
        "#,
        )
        .bind(link)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Most recent articles by publication time (capped at 2000).
    pub async fn get_articles(&self, limit: Option<i64>) -> Result<Vec<StoredArticle>> {
        let limit = limit.unwrap_or(500).min(MAX_ARTICLES);
        let rows = sqlx::query_as::<_, StoredArticle>(
            r#"
            SELECT id, title, link, published, source, content, fetched_at
            FROM articles
            ORDER BY published DESC, id DESC
            LIMIT ?
        "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

/// INSERT OR IGNORE one article; on conflict, backfill content if the
/// stored row has none. Never writes a second row for a link.
async fn insert_article(
    conn: &mut SqliteConnection,
    record: &ArticleRecord,
    content: Option<&str>,
    now: i64,
) -> Result<InsertOutcome, sqlx::Error> {
    let inserted = sqlx::query(
        r#"
        INSERT OR IGNORE INTO articles (title, link, published, source, content, fetched_at)
        VALUES (?, ?, ?, ?, ?, ?)
    "#,
    )
    .bind(&record.title)
    .bind(&record.link)
    .bind(record.published)
    .bind(&record.source)
    .bind(content)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    if inserted.rows_affected() > 0 {
        return Ok(InsertOutcome::Inserted);
    }

    let Some(content) = content else {
        return Ok(InsertOutcome::Duplicate { backfilled: false });
    };

    let updated = sqlx::query("UPDATE articles SET content = ? WHERE link = ? AND content IS NULL")
        .bind(content)
        .bind(&record.link)
        .execute(&mut *conn)
        .await?;

    Ok(InsertOutcome::Duplicate {
        backfilled: updated.rows_affected() > 0,
    })
}
