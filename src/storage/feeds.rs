use anyhow::Result;

use super::schema::Database;
use super::types::{FeedSource, FeedUpsertSummary};
use crate::eventlog::EventLog;

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register feed URLs (INSERT OR IGNORE keyed on url).
    ///
    /// All inserts share one transaction committed at the end of the call. A
    /// failing row is logged as ERROR and skipped; it never rolls back the
    /// others. Only begin/commit failures are returned as errors.
    pub async fn upsert_feeds(
        &self,
        urls: &[String],
        events: &EventLog,
    ) -> Result<FeedUpsertSummary> {
        let mut summary = FeedUpsertSummary::default();
        if urls.is_empty() {
            return Ok(summary);
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for url in urls {
            let result = sqlx::query("INSERT OR IGNORE INTO feeds (url, added_at) VALUES (?, ?)")
                .bind(url)
                .bind(now)
                .execute(&mut *tx)
                .await;

            match result {
                Ok(done) => {
                    if done.rows_affected() > 0 {
                        summary.added += 1;
                    } else {
                        summary.existing += 1;
                    }
                    events.info(format!("Feed URL added or already exists: {}", url));
                }
                Err(e) => {
                    summary.failed += 1;
                    events.error(format!("Error saving feed URL: {}, Error: {}", url, e));
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(
            added = summary.added,
            existing = summary.existing,
            failed = summary.failed,
            "Feed registration committed"
        );
        Ok(summary)
    }

    /// All registered feeds in registration order.
    pub async fn get_feeds(&self) -> Result<Vec<FeedSource>> {
        let feeds = sqlx::query_as::<_, FeedSource>(
            "SELECT id, url, added_at FROM feeds ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }
}
