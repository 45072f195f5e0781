pub mod pagination;
pub mod rate_limit;
pub mod types;

pub use rate_limit::RateLimitGovernor;
pub use types::{Comment, Commit, CommitDiff, PullRequest, Review, Reviews};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use pagination::{next_page, NextPage};
use rate_limit::RateLimit;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Page size requested from list endpoints that are read to the end.
pub const LIST_PAGE_SIZE: u32 = 100;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API error {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("Failed to decode GitHub response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid GitHub client setting: {0}")]
    InvalidHeader(String),
}

/// How a call reacts to a "403 + zero remaining quota" response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Pause once, retry once, and treat a second refusal as fatal.
    Once,
    /// Keep pausing and retrying until the quota allows the call.
    UntilAvailable,
}

/// Thin GitHub REST client: default headers, base URL and quota handling.
///
/// Every non-success status other than quota exhaustion becomes
/// [`GitHubError::Api`], which callers propagate to abort the run.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    governor: RateLimitGovernor,
}

impl GitHubClient {
    pub fn new(token: Option<&str>, api_url: Option<&str>) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("pr-etl/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| GitHubError::InvalidHeader("token contains invalid characters".to_string()))?;
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            api_url: api_url
                .unwrap_or(DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            governor: RateLimitGovernor::new(),
        })
    }

    #[cfg(test)]
    pub fn with_governor(mut self, governor: RateLimitGovernor) -> Self {
        self.governor = governor;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Issue a GET against `path` (relative to the API root) and return the
    /// successful response, applying the quota retry policy.
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        retry: Retry,
    ) -> Result<Response, GitHubError> {
        let url = format!("{}{}", self.api_url, path);
        let mut retried = false;
        loop {
            debug!(%url, ?query, "GET");
            let response = self.http.get(&url).query(query).send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let limit = RateLimit::from_headers(response.headers());
            let may_retry = match retry {
                Retry::Once => !retried,
                Retry::UntilAvailable => true,
            };
            if status == StatusCode::FORBIDDEN && limit.is_exhausted() && may_retry {
                warn!(%url, reset_at = limit.reset_at, "GitHub quota exhausted");
                self.governor.pause(&limit).await;
                retried = true;
                continue;
            }

            let body = response.text().await?;
            let body = if body.is_empty() {
                "No response text".to_string()
            } else {
                body
            };
            return Err(GitHubError::Api { status, body });
        }
    }

    /// [`get`](Self::get) followed by JSON decoding of the body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        retry: Retry,
    ) -> Result<T, GitHubError> {
        let response = self.get(path, &[], retry).await?;
        decode(response).await
    }

    /// Read every page of a list endpoint, following `rel="next"` links.
    ///
    /// `retry` applies to each page request on its own.
    pub async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        retry: Retry,
    ) -> Result<Vec<T>, GitHubError> {
        let mut items = Vec::new();
        let mut page: Option<u32> = None;
        loop {
            let mut query = vec![("per_page", LIST_PAGE_SIZE.to_string())];
            if let Some(page) = page {
                query.push(("page", page.to_string()));
            }
            let response = self.get(path, &query, retry).await?;
            let next = next_page(response.headers());
            let batch: Vec<T> = decode(response).await?;
            if batch.is_empty() {
                return Ok(items);
            }
            items.extend(batch);

            match next {
                NextPage::Page(n) if page != Some(n) => page = Some(n),
                NextPage::Malformed(reason) => {
                    warn!(path, %reason, "malformed next link, keeping pages read so far");
                    return Ok(items);
                }
                _ => return Ok(items),
            }
        }
    }
}

/// Decode a JSON body, keeping the URL for the error message.
pub async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GitHubError> {
    let url = response.url().to_string();
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|source| GitHubError::Decode { url, source })
}
