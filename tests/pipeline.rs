//! End-to-end tests for the fetch -> extract -> persist cycle.
//!
//! Feeds and article pages are served by a local wiremock server. Each test
//! gets its own in-memory article database and its own in-memory log store,
//! read back only after the event log has been shut down.

use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feed_collector::content::ExtractorConfig;
use feed_collector::eventlog::{EventLog, LogEvent, LogLevel, LogStore};
use feed_collector::feed::{fetch_all, FetchOptions};
use feed_collector::pipeline::{Collector, CycleReport};
use feed_collector::storage::Database;
use feed_collector::util::HostPolicy;

struct Harness {
    server: MockServer,
    db: Database,
    events: EventLog,
    store: LogStore,
    collector: Collector,
}

impl Harness {
    async fn new() -> Self {
        Self::with_fetch_timeout(Duration::from_secs(5)).await
    }

    async fn with_fetch_timeout(timeout: Duration) -> Self {
        let server = MockServer::start().await;
        let db = Database::open(":memory:").await.unwrap();
        let store = LogStore::open(":memory:").await.unwrap();
        let events = EventLog::spawn(store.clone());
        let collector = Collector::with_client(
            db.clone(),
            events.clone(),
            reqwest::Client::new(),
            ExtractorConfig {
                host_policy: HostPolicy::AllowPrivate,
                timeout: Duration::from_secs(2),
                ..ExtractorConfig::default()
            },
            FetchOptions {
                timeout,
                max_concurrent: None,
            },
        );
        Self {
            server,
            db,
            events,
            store,
            collector,
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.server.uri(), route)
    }

    /// Serve an RSS feed at `route` whose items link back to this server.
    async fn mount_feed(&self, route: &str, title: &str, items: &[(&str, &str)]) {
        let body = rss(title, &self.server.uri(), items);
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&self.server)
            .await;
    }

    async fn mount_page(&self, route: &str, text: &str, expected_hits: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "<html><body><nav>Menu</nav><article><p>{}</p></article></body></html>",
                text
            )))
            .expect(expected_hits)
            .mount(&self.server)
            .await;
    }

    /// Stop the sink and return everything it stored.
    async fn logged(&self) -> Vec<LogEvent> {
        self.events.shutdown().await;
        self.store.events().await.unwrap()
    }
}

fn rss(title: &str, base: &str, items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(item_title, route)| {
            format!(
                "<item><title>{}</title><link>{}{}</link><pubDate>Tue, 10 Jun 2025 04:00:00 GMT</pubDate></item>",
                item_title, base, route
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{}</title>{}</channel></rss>"#,
        title, items
    )
}

fn messages_with_prefix<'a>(events: &'a [LogEvent], prefix: &str) -> Vec<&'a str> {
    events
        .iter()
        .filter(|e| e.message.starts_with(prefix))
        .map(|e| e.message.as_str())
        .collect()
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_slow_feed_does_not_block_healthy_feed() {
    let h = Harness::with_fetch_timeout(Duration::from_millis(300)).await;
    h.mount_feed(
        "/a.xml",
        "Feed A",
        &[("One", "/a/1"), ("Two", "/a/2"), ("Three", "/a/3")],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/b.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(rss("Feed B", "https://b.example", &[("Late", "/late")]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&h.server)
        .await;

    let feed_a = h.url("/a.xml");
    let feed_b = h.url("/b.xml");
    let articles = fetch_all(
        &reqwest::Client::new(),
        &[feed_a.clone(), feed_b.clone()],
        &h.events,
        &FetchOptions {
            timeout: Duration::from_millis(300),
            max_concurrent: None,
        },
    )
    .await;
    let logged = h.logged().await;

    let titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
    assert_eq!(titles, vec!["One", "Two", "Three"]);
    assert!(articles.iter().all(|a| a.source == "Feed A"));

    let errors: Vec<&LogEvent> = logged
        .iter()
        .filter(|e| e.level == LogLevel::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0]
        .message
        .starts_with(&format!("Error fetching feed {}:", feed_b)));
    assert_eq!(
        messages_with_prefix(&logged, "Successfully fetched feed:"),
        vec![format!("Successfully fetched feed: {}", feed_a).as_str()]
    );
}

// ============================================================================
// Cycles
// ============================================================================

#[tokio::test]
async fn test_cycle_stores_articles_with_content() {
    let h = Harness::new().await;
    h.mount_feed("/feed.xml", "Local News", &[("Budget passes", "/news/budget")])
        .await;
    h.mount_page("/news/budget", "The council approved the budget.", 1)
        .await;
    let feeds = vec![h.url("/feed.xml")];

    let report = h.collector.run_cycle(&feeds).await;

    assert_eq!(
        report,
        CycleReport {
            feeds: 1,
            failed_feeds: 0,
            fetched: 1,
            new_articles: 1,
            duplicates: 0,
            failed: 0,
            feeds_registered: 1,
        }
    );

    let stored = h
        .db
        .get_article_by_link(&h.url("/news/budget"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.title, "Budget passes");
    assert_eq!(stored.source, "Local News");
    assert_eq!(
        stored.content.as_deref(),
        Some("The council approved the budget.")
    );
    assert_eq!(stored.published, Some(1_749_528_000));

    let registered: Vec<String> = h
        .db
        .get_feeds()
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.url)
        .collect();
    assert_eq!(registered, feeds);

    let logged = h.logged().await;
    assert_eq!(logged[0].message, "Fetching RSS feeds...");
    assert_eq!(
        messages_with_prefix(&logged, "New article added:"),
        vec!["New article added: Budget passes"]
    );
    assert!(logged
        .last()
        .unwrap()
        .message
        .starts_with("Cycle complete: 1 feeds (0 failed)"));
}

#[tokio::test]
async fn test_same_link_across_cycles_is_stored_once() {
    let h = Harness::new().await;
    h.mount_feed("/feed.xml", "Local News", &[("Budget passes", "/news/budget")])
        .await;
    // Second cycle must not re-extract a link already stored with content
    h.mount_page("/news/budget", "The council approved the budget.", 1)
        .await;
    let feeds = vec![h.url("/feed.xml")];

    let first = h.collector.run_cycle(&feeds).await;
    let second = h.collector.run_cycle(&feeds).await;

    assert_eq!((first.new_articles, first.duplicates), (1, 0));
    assert_eq!((second.new_articles, second.duplicates), (0, 1));
    assert_eq!(second.feeds_registered, 0);
    assert_eq!(h.db.get_articles(None).await.unwrap().len(), 1);

    let logged = h.logged().await;
    assert_eq!(
        messages_with_prefix(&logged, "Duplicate article skipped:"),
        vec![format!("Duplicate article skipped: {}", h.url("/news/budget")).as_str()]
    );
    assert_eq!(
        messages_with_prefix(&logged, "Feed URL added or already exists:").len(),
        2
    );
}

#[tokio::test]
async fn test_failed_extraction_stores_article_without_content() {
    let h = Harness::new().await;
    h.mount_feed("/feed.xml", "Local News", &[("Gone", "/news/gone")])
        .await;
    Mock::given(method("GET"))
        .and(path("/news/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;

    let report = h.collector.run_cycle(&[h.url("/feed.xml")]).await;

    assert_eq!(report.new_articles, 1);
    let stored = h
        .db
        .get_article_by_link(&h.url("/news/gone"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.content, None);

    let logged = h.logged().await;
    let errors: Vec<&str> = logged
        .iter()
        .filter(|e| e.level == LogLevel::Error)
        .map(|e| e.message.as_str())
        .collect();
    assert_eq!(
        errors,
        vec![format!(
            "Failed to fetch article content from {}: HTTP error: status 404",
            h.url("/news/gone")
        )
        .as_str()]
    );
}

#[tokio::test]
async fn test_missing_content_is_backfilled_next_cycle() {
    let h = Harness::new().await;
    h.mount_feed("/feed.xml", "Local News", &[("Flaky", "/news/flaky")])
        .await;
    Mock::given(method("GET"))
        .and(path("/news/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    h.mount_page("/news/flaky", "Back online.", 1).await;
    let feeds = vec![h.url("/feed.xml")];
    let link = h.url("/news/flaky");

    h.collector.run_cycle(&feeds).await;
    assert_eq!(
        h.db.get_article_by_link(&link).await.unwrap().unwrap().content,
        None
    );

    let second = h.collector.run_cycle(&feeds).await;

    assert_eq!(second.duplicates, 1);
    assert_eq!(
        h.db.get_article_by_link(&link)
            .await
            .unwrap()
            .unwrap()
            .content
            .as_deref(),
        Some("Back online.")
    );
    h.events.shutdown().await;
}

#[tokio::test]
async fn test_link_shared_by_two_feeds_is_stored_once() {
    let h = Harness::new().await;
    h.mount_feed("/one.xml", "Wire One", &[("Shared story", "/story")])
        .await;
    h.mount_feed("/two.xml", "Wire Two", &[("Shared story", "/story")])
        .await;
    h.mount_page("/story", "Same article syndicated twice.", 1)
        .await;

    let report = h
        .collector
        .run_cycle(&[h.url("/one.xml"), h.url("/two.xml")])
        .await;

    assert_eq!(report.fetched, 2);
    assert_eq!(report.new_articles, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(h.db.get_articles(None).await.unwrap().len(), 1);
    assert_eq!(h.db.table_counts().await.unwrap().feeds, 2);
    h.events.shutdown().await;
}

#[tokio::test]
async fn test_cycle_with_every_feed_failing_still_reports() {
    let h = Harness::new().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;
    let feeds = vec![h.url("/down.xml"), h.url("/also-down.xml")];

    let report = h.collector.run_cycle(&feeds).await;

    assert_eq!(report.failed_feeds, 2);
    assert_eq!(report.fetched, 0);
    // Feed registration is independent of fetch success
    assert_eq!(report.feeds_registered, 2);

    let logged = h.logged().await;
    assert_eq!(messages_with_prefix(&logged, "Error fetching feed").len(), 2);
    assert!(messages_with_prefix(&logged, "Successfully fetched feed:").is_empty());
}
