use futures::stream::{self, StreamExt};
use std::time::Duration;
use thiserror::Error;

use crate::eventlog::EventLog;
use crate::feed::parser::parse_feed;
use crate::storage::ArticleRecord;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default per-feed request timeout.
pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while fetching one feed.
///
/// None of these leave [`fetch_feed`]: they are converted into a single
/// ERROR event and an empty article list.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request plus body read exceeded the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Tuning for [`fetch_all`].
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// Applied to each feed request, including reading the body.
    pub timeout: Duration,
    /// Maximum feeds in flight. `None` runs every feed at once.
    pub max_concurrent: Option<usize>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FEED_TIMEOUT,
            max_concurrent: None,
        }
    }
}

/// Outcome of one fan-out over a feed list.
#[derive(Debug, Default)]
pub struct FanOutSummary {
    /// Articles from every feed, in feed completion order.
    pub articles: Vec<ArticleRecord>,
    /// Feeds that were fetched and parsed (possibly with zero entries).
    pub succeeded: usize,
    /// Feeds that failed, in completion order.
    pub failed: Vec<String>,
}

/// Fetches every feed concurrently and concatenates their articles.
///
/// Shorthand for [`fetch_all_with_summary`] when only the articles matter.
pub async fn fetch_all(
    client: &reqwest::Client,
    urls: &[String],
    events: &EventLog,
    options: &FetchOptions,
) -> Vec<ArticleRecord> {
    fetch_all_with_summary(client, urls, events, options)
        .await
        .articles
}

/// Fetches every feed concurrently, reporting per-feed success and failure.
///
/// # Behavior
///
/// - Each feed runs in its own spawned task; at most
///   `options.max_concurrent` are in flight (unbounded when `None`)
/// - Results are collected in completion order, not input order
/// - A feed that fails is logged by [`fetch_feed`]; a task that panics is
///   caught here and logged as ERROR with the feed URL
/// - Returns only once every task has finished. There is no batch timeout,
///   so the slowest feed (bounded by its own timeout) sets the latency
pub async fn fetch_all_with_summary(
    client: &reqwest::Client,
    urls: &[String],
    events: &EventLog,
    options: &FetchOptions,
) -> FanOutSummary {
    let mut summary = FanOutSummary::default();
    if urls.is_empty() {
        return summary;
    }

    let limit = options.max_concurrent.unwrap_or(urls.len()).max(1);
    let timeout = options.timeout;

    let mut outcomes = stream::iter(urls.iter().cloned())
        .map(|url| {
            let client = client.clone();
            let events = events.clone();
            let task_url = url.clone();

            async move {
                let handle = tokio::spawn(async move {
                    fetch_and_report(&client, &task_url, &events, timeout).await
                });
                (url, handle.await)
            }
        })
        .buffer_unordered(limit);

    // Report each feed as soon as its task finishes
    while let Some((url, outcome)) = outcomes.next().await {
        match outcome {
            Ok(Some(articles)) => {
                events.info(format!("Successfully fetched feed: {}", url));
                summary.succeeded += 1;
                summary.articles.extend(articles);
            }
            // Already logged by fetch_and_report
            Ok(None) => summary.failed.push(url),
            Err(e) => {
                events.error(format!("Error fetching feed {}: {}", url, e));
                summary.failed.push(url);
            }
        }
    }

    tracing::debug!(
        feeds = urls.len(),
        succeeded = summary.succeeded,
        failed = summary.failed.len(),
        articles = summary.articles.len(),
        "Fan-out complete"
    );
    summary
}

/// Fetches and parses one feed.
///
/// Never fails: a transport error, timeout, non-2xx status, oversized body
/// or unparseable document emits one ERROR event and yields an empty list.
/// Success emits one INFO event with the article count.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    events: &EventLog,
    timeout: Duration,
) -> Vec<ArticleRecord> {
    fetch_and_report(client, url, events, timeout)
        .await
        .unwrap_or_default()
}

/// `None` means the failure has already been logged.
async fn fetch_and_report(
    client: &reqwest::Client,
    url: &str,
    events: &EventLog,
    timeout: Duration,
) -> Option<Vec<ArticleRecord>> {
    match fetch_one(client, url, timeout).await {
        Ok(articles) => {
            events.info(format!("Fetched {} articles from {}.", articles.len(), url));
            Some(articles)
        }
        Err(e) => {
            events.error(format!("Error fetching feed {}: {}", url, e));
            None
        }
    }
}

async fn fetch_one(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<ArticleRecord>, FetchError> {
    let fetched_at = chrono::Utc::now();

    let bytes = tokio::time::timeout(timeout, async {
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }
        read_limited_bytes(response, MAX_FEED_SIZE).await
    })
    .await
    .map_err(|_| FetchError::Timeout(timeout))??;

    let parsed = parse_feed(&bytes, fetched_at).map_err(|e| FetchError::Parse(e.to_string()))?;

    tracing::debug!(
        feed = %url,
        source = %parsed.source,
        entries = parsed.articles.len(),
        "Parsed feed"
    );
    Ok(parsed.articles)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
