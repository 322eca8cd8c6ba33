//! Shared helpers.
//!
//! - **URL validation**: scheme and host checks applied before any article
//!   page is requested, so feed-supplied links cannot point the collector at
//!   internal services.

mod url_validator;

pub use url_validator::{validate_url, HostPolicy, UrlValidationError};
