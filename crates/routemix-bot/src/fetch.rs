//! Remote fetch collaborators.
//!
//! Subscription content lives behind a hosted snippet (gist) link; the
//! rule-set catalog is the contents listing of the hosted rule repository.
//! Both are single GETs with a fixed short timeout — no retries here, the
//! caller decides whether a failure is worth retrying.

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Timeout applied to each remote fetch.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Contents listing of the hosted rule repository.
const CATALOG_URL: &str =
    "https://api.github.com/repos/blackmatrix7/ios_rule_script/contents/rule/Clash?ref=master";

/// Errors from the remote fetch collaborators.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport-level failure, including timeouts.
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
}

/// Result type for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Remote fetch seam. The engine needs exactly these two calls.
pub trait Fetch: Send + Sync {
    /// Fetches the raw subscription text behind a snippet link.
    fn fetch_subscription(&self, url: &str) -> impl Future<Output = Result<String>> + Send;

    /// Fetches the rule-set catalog: directory names, sorted by name.
    fn fetch_catalog(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Returns whether free text looks like a subscription link.
pub fn looks_like_snippet_link(text: &str) -> bool {
    text.contains("gist.github") || text.contains("raw.githubusercontent")
}

/// Rewrites a snippet link to its raw-content counterpart.
///
/// Links already pointing at `/raw` pass through unchanged.
pub fn raw_snippet_url(url: &str) -> String {
    if url.contains("/raw") {
        url.to_string()
    } else {
        format!(
            "{}/raw",
            url.replace("gist.github.com", "gist.githubusercontent.com")
        )
    }
}

/// One entry of the repository contents listing.
#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// HTTP implementation of [`Fetch`] on a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpFetch {
    client: reqwest::Client,
    token: Option<String>,
}

impl HttpFetch {
    /// Builds the client with the fixed fetch timeout.
    ///
    /// `token` is sent as an `Authorization: token ...` header on every
    /// request; anonymous access works too, with tighter rate limits.
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            // The catalog host rejects anonymous clients without a UA.
            .user_agent(concat!("routemix/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, token })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.header(reqwest::header::AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }
}

impl Fetch for HttpFetch {
    async fn fetch_subscription(&self, url: &str) -> Result<String> {
        let raw = raw_snippet_url(url);
        debug!(url = %raw, "fetching subscription");
        let response = self.get(&raw).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        Ok(response.text().await?)
    }

    async fn fetch_catalog(&self) -> Result<Vec<String>> {
        debug!(url = CATALOG_URL, "fetching rule-set catalog");
        let response = self.get(CATALOG_URL).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }
        let entries: Vec<CatalogEntry> = response.json().await?;
        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|entry| entry.kind == "dir")
            .map(|entry| entry.name)
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_link_recognition() {
        assert!(looks_like_snippet_link("https://gist.github.com/u/abc"));
        assert!(looks_like_snippet_link(
            "https://gist.githubusercontent.com/u/abc/raw"
        ));
        assert!(looks_like_snippet_link(
            "https://raw.githubusercontent.com/u/repo/file"
        ));
        assert!(!looks_like_snippet_link("hello there"));
        assert!(!looks_like_snippet_link("https://example.com/feed"));
    }

    #[test]
    fn test_raw_url_rewrite() {
        assert_eq!(
            raw_snippet_url("https://gist.github.com/u/abc"),
            "https://gist.githubusercontent.com/u/abc/raw"
        );
    }

    #[test]
    fn test_raw_url_passthrough() {
        let already_raw = "https://gist.githubusercontent.com/u/abc/raw";
        assert_eq!(raw_snippet_url(already_raw), already_raw);
        let pinned = "https://gist.githubusercontent.com/u/abc/raw/deadbeef/nodes.txt";
        assert_eq!(raw_snippet_url(pinned), pinned);
    }
}
