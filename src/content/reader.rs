use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::ContentError;

/// Default reader service (jina.ai reader API).
pub const DEFAULT_READER_BASE_URL: &str = "https://r.jina.ai";

/// CSS selectors targeting main article content across common blog platforms.
/// Order matters: more specific selectors first, generic fallbacks last.
const TARGET_SELECTORS: &str =
    "article, .entry-content, .post-content, .article-content, .post-body, main .content, main";

/// Build the reader request for `article`.
///
/// The base must be HTTPS, except for localhost/127.0.0.1 (test servers).
/// The API key is only sent to the official jina hosts.
pub(super) fn build_request(
    client: &reqwest::Client,
    base_url: &str,
    api_key: Option<&SecretString>,
    article: &Url,
) -> Result<reqwest::RequestBuilder, ContentError> {
    if !base_url.starts_with("https://") {
        let is_localhost =
            base_url.starts_with("http://127.0.0.1") || base_url.starts_with("http://localhost");
        if !is_localhost {
            tracing::error!(base_url = %base_url, "Rejecting non-HTTPS reader base URL");
            return Err(ContentError::InsecureBaseUrl);
        }
    }

    let reader_url = format!("{}/{}", base_url.trim_end_matches('/'), article.as_str());
    let mut request = client
        .get(&reader_url)
        .header("X-Target-Selector", TARGET_SELECTORS);

    let is_official = reader_url.starts_with("https://r.jina.ai/")
        || reader_url.starts_with("https://api.jina.ai/");
    if let Some(key) = api_key {
        if is_official {
            request = request.header("Authorization", format!("Bearer {}", key.expose_secret()));
        } else {
            tracing::debug!("Skipping reader API key for non-official base URL");
        }
    }

    Ok(request)
}

/// Strip common boilerplate patterns that the reader service doesn't filter.
///
/// Patterns targeted:
/// - "Skip to content" navigation links
/// - Comment section scaffolding (Loading Comments, form fields)
/// - WordPress "Powered by" footers
/// - Consecutive archive link lists (Month Year patterns)
pub(super) fn strip_boilerplate(content: &str) -> String {
    let mut lines: Vec<&str> = content.lines().collect();

    lines.retain(|line| {
        let trimmed = line.trim();
        !(trimmed.starts_with("[Skip to content]")
            || trimmed == "Loading Comments..."
            || trimmed == "Write a Comment..."
            || trimmed.starts_with("Email (Required)")
            || trimmed == "%d"
            || trimmed.contains("Proudly powered by WordPress")
            || trimmed == "Menu")
    });

    // Remove consecutive archive link runs (3+ in a row)
    let mut result = Vec::with_capacity(lines.len());
    let mut archive_run_start: Option<usize> = None;
    let mut archive_run_len = 0;

    for line in lines {
        if is_archive_link(line) {
            if archive_run_start.is_none() {
                archive_run_start = Some(result.len());
            }
            archive_run_len += 1;
        } else {
            if archive_run_len >= 3 {
                if let Some(start) = archive_run_start {
                    result.truncate(start);
                }
            }
            archive_run_start = None;
            archive_run_len = 0;
        }
        result.push(line);
    }

    if archive_run_len >= 3 {
        if let Some(start) = archive_run_start {
            result.truncate(start);
        }
    }

    result.join("\n").trim().to_string()
}

const MONTH_PATTERNS: &[&str] = &[
    "[January",
    "[February",
    "[March",
    "[April",
    "[May",
    "[June",
    "[July",
    "[August",
    "[September",
    "[October",
    "[November",
    "[December",
];

/// Check if a line matches the archive link pattern: "*   [Month Year](url)"
fn is_archive_link(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.starts_with('*') {
        return false;
    }

    MONTH_PATTERNS.iter().any(|pattern| {
        trimmed.find(pattern).is_some_and(|idx| {
            trimmed[idx + pattern.len()..]
                .get(1..5)
                .is_some_and(|year| year.chars().all(|c| c.is_ascii_digit()))
        })
    })
}
