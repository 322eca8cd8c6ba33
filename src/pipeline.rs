//! One fetch cycle: fetch every feed, persist new articles, register feeds.
//!
//! The collector holds no timer. The binary (or a test) decides when to call
//! [`Collector::run_cycle`] and with which feed list snapshot.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::content::{Extractor, ExtractorConfig};
use crate::eventlog::EventLog;
use crate::feed::{fetch_all_with_summary, FetchOptions};
use crate::storage::{Database, FeedUpsertSummary, SaveSummary};

/// Aggregate counts for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Feed URLs in the snapshot.
    pub feeds: usize,
    /// Feeds that failed to fetch or parse.
    pub failed_feeds: usize,
    /// Article records produced by the fan-out.
    pub fetched: usize,
    pub new_articles: usize,
    pub duplicates: usize,
    /// Articles that hit a storage fault.
    pub failed: usize,
    /// Feed URLs registered for the first time.
    pub feeds_registered: usize,
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cycle complete: {} feeds ({} failed), {} articles fetched, {} new, {} duplicates, {} failed to save, {} new feeds",
            self.feeds,
            self.failed_feeds,
            self.fetched,
            self.new_articles,
            self.duplicates,
            self.failed,
            self.feeds_registered
        )
    }
}

/// Drives fetch -> extract -> persist over a feed list.
#[derive(Clone)]
pub struct Collector {
    db: Database,
    events: EventLog,
    client: reqwest::Client,
    extractor: Extractor,
    fetch: FetchOptions,
}

impl Collector {
    /// Build a collector from configuration, with one shared HTTP client for
    /// feeds and article pages.
    pub fn new(db: Database, events: EventLog, config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(
            db,
            events,
            client,
            config.extractor_config(),
            config.fetch_options(),
        ))
    }

    pub fn with_client(
        db: Database,
        events: EventLog,
        client: reqwest::Client,
        extractor: ExtractorConfig,
        fetch: FetchOptions,
    ) -> Self {
        let extractor = Extractor::new(client.clone(), extractor, events.clone());
        Self {
            db,
            events,
            client,
            extractor,
            fetch,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run one cycle over `urls`.
    ///
    /// Never fails: feed, extraction and per-article storage faults are
    /// logged where they happen. A fault that aborts a whole storage call
    /// (begin/commit) is logged here and counted against every record of
    /// that call.
    pub async fn run_cycle(&self, urls: &[String]) -> CycleReport {
        self.events.info("Fetching RSS feeds...");

        let fan_out = fetch_all_with_summary(&self.client, urls, &self.events, &self.fetch).await;

        let mut report = CycleReport {
            feeds: urls.len(),
            failed_feeds: fan_out.failed.len(),
            fetched: fan_out.articles.len(),
            ..CycleReport::default()
        };

        let saved = match self
            .db
            .save_articles(&fan_out.articles, &self.extractor, &self.events)
            .await
        {
            Ok(saved) => saved,
            Err(e) => {
                self.events.error(format!("Error saving articles: {}", e));
                SaveSummary {
                    failed: fan_out.articles.len(),
                    ..SaveSummary::default()
                }
            }
        };
        report.new_articles = saved.new_articles;
        report.duplicates = saved.duplicates;
        report.failed = saved.failed;

        let registered = match self.db.upsert_feeds(urls, &self.events).await {
            Ok(registered) => registered,
            Err(e) => {
                self.events.error(format!("Error saving feed URLs: {}", e));
                FeedUpsertSummary {
                    failed: urls.len(),
                    ..FeedUpsertSummary::default()
                }
            }
        };
        report.feeds_registered = registered.added;

        tracing::debug!(
            backfilled = saved.backfilled,
            without_content = saved.without_content,
            feeds_existing = registered.existing,
            "Cycle storage details"
        );
        self.events.info(report.to_string());
        report
    }
}
