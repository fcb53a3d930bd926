use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use url::Url;

use super::types::{ApiError, ArticleDto, NewsResponse};
use crate::config::Config;

const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Default page size for the top-headlines request (the feed is not paginated)
pub const HEADLINES_PAGE_SIZE: u32 = 100;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Stateless client for a newsapi.org-shaped REST API.
pub struct NewsApi {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
    country: String,
    headlines_page_size: u32,
    timeout: Duration,
}

impl fmt::Debug for NewsApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsApi")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("country", &self.country)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl NewsApi {
    /// Create a client for `base_url` (e.g. `https://newsapi.org/v2`).
    ///
    /// # Errors
    ///
    /// - [`ApiError::InvalidUrl`] if `base_url` does not parse
    /// - [`ApiError::InsecureBaseUrl`] for plain HTTP to anything but localhost
    pub fn new(client: reqwest::Client, base_url: &str) -> Result<Self, ApiError> {
        let mut base_url = Url::parse(base_url)?;

        // Keep the API key off the wire unless the transport is encrypted.
        // Plain HTTP is allowed for localhost so tests can use a mock server.
        if base_url.scheme() != "https" {
            let is_localhost = matches!(base_url.host_str(), Some("localhost" | "127.0.0.1"));
            if !is_localhost {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS base URL");
                return Err(ApiError::InsecureBaseUrl);
            }
        }

        // Url::join replaces the last path segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            api_key: None,
            country: "in".to_string(),
            headlines_page_size: HEADLINES_PAGE_SIZE,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Build a client from configuration (base URL, key, country, timeout).
    pub fn from_config(client: reqwest::Client, config: &Config) -> Result<Self, ApiError> {
        let mut api = Self::new(client, &config.base_url)?
            .with_country(&config.country)
            .with_headlines_page_size(config.breaking_page_size)
            .with_timeout(Duration::from_secs(config.request_timeout_secs));
        if let Some(key) = config.api_key() {
            api = api.with_api_key(key);
        }
        Ok(api)
    }

    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn with_country(mut self, country: &str) -> Self {
        self.country = country.to_string();
        self
    }

    pub fn with_headlines_page_size(mut self, page_size: u32) -> Self {
        self.headlines_page_size = page_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetch the current top headlines for the configured country.
    pub async fn top_headlines(&self) -> Result<Vec<ArticleDto>, ApiError> {
        let params = [
            ("country", self.country.clone()),
            ("pageSize", self.headlines_page_size.to_string()),
        ];
        self.get_articles("top-headlines", &params).await
    }

    /// Fetch one page of full-text search results. Pages start at 1.
    pub async fn search(
        &self,
        query: &str,
        page: i64,
        page_size: u32,
    ) -> Result<Vec<ArticleDto>, ApiError> {
        let params = [
            ("q", query.to_string()),
            ("page", page.to_string()),
            ("pageSize", page_size.to_string()),
        ];
        self.get_articles("everything", &params).await
    }

    async fn get_articles(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<ArticleDto>, ApiError> {
        let mut url = self.base_url.join(endpoint)?;
        url.query_pairs_mut().extend_pairs(params);

        tracing::debug!(endpoint = %endpoint, "Requesting articles");

        let bytes = tokio::time::timeout(self.timeout, self.fetch_bytes(url))
            .await
            .map_err(|_| ApiError::Timeout)??;

        let response: NewsResponse = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            endpoint = %endpoint,
            count = response.articles.len(),
            "Received articles"
        );
        Ok(response.articles)
    }

    async fn fetch_bytes(&self, url: Url) -> Result<Vec<u8>, ApiError> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key.expose_secret());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "News API returned an error status");
            return Err(ApiError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, MAX_RESPONSE_SIZE).await
    }
}

async fn read_limited_bytes(response: reqwest::Response, limit: usize) -> Result<Vec<u8>, ApiError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
