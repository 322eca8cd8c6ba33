//! Periodic feed collector.
//!
//! Fetches syndicated feeds concurrently, extracts article text and stores
//! each article at most once (keyed on its link) in SQLite, while a
//! single-writer event log records what happened.

pub mod config;
pub mod content;
pub mod eventlog;
pub mod feed;
pub mod pipeline;
pub mod storage;
pub mod util;
