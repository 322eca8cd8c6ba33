use futures::StreamExt;
use secrecy::SecretString;
use std::time::Duration;
use thiserror::Error;

use super::html::extract_main_text;
use super::reader::{self, DEFAULT_READER_BASE_URL};
use crate::eventlog::EventLog;
use crate::util::{validate_url, HostPolicy};

const MAX_CONTENT_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Default per-article request timeout.
pub const DEFAULT_CONTENT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("No readable text found")]
    Empty,
}

/// Where article text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractorBackend {
    /// Fetch the article page and extract its main text locally.
    #[default]
    Html,
    /// Ask a reader service (jina.ai compatible) for a cleaned rendition.
    Reader,
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub backend: ExtractorBackend,
    pub timeout: Duration,
    /// Articles extracted in parallel by `Database::save_articles`.
    pub concurrency: usize,
    pub host_policy: HostPolicy,
    pub reader_base_url: String,
    pub reader_api_key: Option<SecretString>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            backend: ExtractorBackend::Html,
            timeout: DEFAULT_CONTENT_TIMEOUT,
            concurrency: 4,
            host_policy: HostPolicy::PublicOnly,
            reader_base_url: DEFAULT_READER_BASE_URL.to_string(),
            reader_api_key: None,
        }
    }
}

/// Retrieves the main text of one article per call.
///
/// Failures never propagate: [`Extractor::extract`] logs one ERROR event and
/// returns `None`. There is no retry; a missed article is picked up again on
/// the next cycle if its content is still absent.
#[derive(Clone)]
pub struct Extractor {
    client: reqwest::Client,
    config: ExtractorConfig,
    events: EventLog,
}

impl Extractor {
    pub fn new(client: reqwest::Client, config: ExtractorConfig, events: EventLog) -> Self {
        Self {
            client,
            config,
            events,
        }
    }

    /// Number of articles that may be extracted at once (at least 1).
    pub fn concurrency(&self) -> usize {
        self.config.concurrency.max(1)
    }

    /// Extract the main text of the article at `url`.
    pub async fn extract(&self, url: &str) -> Option<String> {
        match self.try_extract(url).await {
            Ok(text) => {
                tracing::debug!(url = %url, chars = text.len(), "Extracted article content");
                Some(text)
            }
            Err(e) => {
                self.events.error(format!(
                    "Failed to fetch article content from {}: {}",
                    url, e
                ));
                None
            }
        }
    }

    /// Single attempt, no logging.
    pub async fn try_extract(&self, url: &str) -> Result<String, ContentError> {
        let article = validate_url(url, self.config.host_policy)
            .map_err(|e| ContentError::InvalidUrl(e.to_string()))?;

        let text = match self.config.backend {
            ExtractorBackend::Html => {
                // Pages in legacy encodings still yield their ASCII text
                let body = self.get_bytes(self.client.get(article)).await?;
                extract_main_text(&String::from_utf8_lossy(&body)).unwrap_or_default()
            }
            ExtractorBackend::Reader => {
                let request = reader::build_request(
                    &self.client,
                    &self.config.reader_base_url,
                    self.config.reader_api_key.as_ref(),
                    &article,
                )?;
                let body = String::from_utf8(self.get_bytes(request).await?)
                    .map_err(|_| ContentError::InvalidUtf8)?;
                reader::strip_boilerplate(&body)
            }
        };

        if text.trim().is_empty() {
            return Err(ContentError::Empty);
        }
        Ok(text)
    }

    async fn get_bytes(&self, request: reqwest::RequestBuilder) -> Result<Vec<u8>, ContentError> {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, async {
            let response = request.send().await?;
            if !response.status().is_success() {
                return Err(ContentError::HttpStatus(response.status().as_u16()));
            }
            read_limited_bytes(response, MAX_CONTENT_SIZE).await
        })
        .await
        .map_err(|_| ContentError::Timeout(timeout))?
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, ContentError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ContentError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ContentError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
