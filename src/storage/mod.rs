//! SQLite persistence for feeds and articles.
//!
//! Writes are insert-or-ignore keyed on natural identity (`feeds.url`,
//! `articles.link`), so a cycle can be re-run at any time without creating
//! duplicate rows.

mod articles;
mod feeds;
mod schema;
mod types;

pub(crate) use schema::connect_options;
pub use schema::Database;
pub use types::{
    ArticleRecord, DatabaseError, FeedSource, FeedUpsertSummary, InsertOutcome, SaveSummary,
    StoredArticle, TableCounts,
};
