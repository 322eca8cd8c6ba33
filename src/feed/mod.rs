//! Feed retrieval: parsing, single-feed fetching and concurrent fan-out.
//!
//! - `parser`: RSS/Atom parsing via `feed-rs`, with fallback values for
//!   missing fields resolved at parse time
//! - `fetcher`: HTTP retrieval of one feed ([`fetch_feed`]) and of many
//!   feeds concurrently ([`fetch_all`])
//!
//! Both fetch entry points isolate failures: a feed that cannot be fetched
//! or parsed is logged as an ERROR event and contributes no articles.

mod fetcher;
mod parser;

pub use fetcher::{
    fetch_all, fetch_all_with_summary, fetch_feed, FanOutSummary, FetchError, FetchOptions,
    DEFAULT_FEED_TIMEOUT,
};
pub use parser::{parse_feed, ParsedFeed, NO_LINK, NO_TITLE, UNKNOWN_SOURCE};
