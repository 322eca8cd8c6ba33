use chrono::{DateTime, Utc};
use feed_rs::parser;

use crate::storage::ArticleRecord;

/// Title recorded for entries without one.
pub const NO_TITLE: &str = "No Title";
/// Link recorded for entries without one. All such entries collapse into a
/// single stored row because link is the article identity.
pub const NO_LINK: &str = "No Link";
/// Source recorded when the feed declares no title.
pub const UNKNOWN_SOURCE: &str = "Unknown Source";

/// A parsed feed with every entry resolved into an [`ArticleRecord`].
#[derive(Debug, Clone)]
pub struct ParsedFeed {
    /// The feed's declared title, or [`UNKNOWN_SOURCE`].
    pub source: String,
    pub articles: Vec<ArticleRecord>,
}

/// Parse RSS/Atom bytes into article records.
///
/// Field resolution per entry:
/// - title: entry title, else [`NO_TITLE`]
/// - link: first link href, else the entry id when it is an http(s) URL
///   (RSS `<guid>` permalinks), else [`NO_LINK`]
/// - published: entry published, else updated, else `fetched_at`
/// - source: the feed title, else [`UNKNOWN_SOURCE`]
pub fn parse_feed(
    bytes: &[u8],
    fetched_at: DateTime<Utc>,
) -> Result<ParsedFeed, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let source = non_empty(feed.title.map(|t| t.content))
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());

    let articles = feed
        .entries
        .into_iter()
        .map(|entry| {
            let title = non_empty(entry.title.map(|t| t.content))
                .unwrap_or_else(|| NO_TITLE.to_string());
            let link = non_empty(entry.links.into_iter().next().map(|l| l.href))
                .or_else(|| permalink_id(&entry.id))
                .unwrap_or_else(|| NO_LINK.to_string());
            let published = entry
                .published
                .or(entry.updated)
                .unwrap_or(fetched_at)
                .timestamp();

            ArticleRecord {
                title,
                link,
                published,
                source: source.clone(),
                content: None,
            }
        })
        .collect();

    Ok(ParsedFeed { source, articles })
}

/// RSS items may carry their URL only in `<guid>`.
fn permalink_id(id: &str) -> Option<String> {
    let url = url::Url::parse(id.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| id.trim().to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
