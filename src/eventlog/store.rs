use anyhow::{anyhow, Result};
use sqlx::{sqlite::SqlitePoolOptions, QueryBuilder, SqlitePool};
use std::time::Duration;

use super::{LogEvent, LogLevel};
use crate::storage::{connect_options, DatabaseError};

/// DDL for the durable log table. Also run by the article database migration.
pub(crate) const LOGS_TABLE_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp INTEGER NOT NULL,
        level TEXT NOT NULL,
        message TEXT NOT NULL
    )
"#;

/// 3 columns * 300 rows stays under SQLite's 999 parameter limit.
const INSERT_BATCH_SIZE: usize = 300;

/// Durable store behind the event log sink.
///
/// Opens its own single-connection pool: the sink is the only writer of the
/// `logs` table and never shares a handle with the article database.
#[derive(Clone)]
pub struct LogStore {
    pool: SqlitePool,
}

impl LogStore {
    /// Open (or create) the log store and create the `logs` table if absent.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let options = connect_options(path)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        sqlx::query(LOGS_TABLE_DDL)
            .execute(&pool)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Append events in order, all in one transaction.
    pub(crate) async fn append(&self, events: &[LogEvent]) -> Result<(), sqlx::Error> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for chunk in events.chunks(INSERT_BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO logs (timestamp, level, message) ");
            builder.push_values(chunk, |mut b, event| {
                b.push_bind(event.timestamp)
                    .push_bind(event.level.as_str())
                    .push_bind(&event.message);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Every stored event in arrival order.
    pub async fn events(&self) -> Result<Vec<LogEvent>> {
        let rows: Vec<(i64, String, String)> =
            sqlx::query_as("SELECT timestamp, level, message FROM logs ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(timestamp, level, message)| {
                let level = level
                    .parse::<LogLevel>()
                    .map_err(|e| anyhow!("corrupt log row: {}", e))?;
                Ok(LogEvent {
                    timestamp,
                    level,
                    message,
                })
            })
            .collect()
    }

    /// Number of stored events.
    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
