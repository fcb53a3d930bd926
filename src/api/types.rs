use serde::Deserialize;
use thiserror::Error;

/// Errors from the remote news source.
///
/// Every variant is a transport failure: the sync engines catch these and
/// surface them as recoverable, never as fatal.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Body was not the expected JSON shape
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Refusing to send the API key over plain HTTP
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

/// Envelope of both the top-headlines and the everything endpoints.
///
/// Only `articles` is consumed; `status` and `totalResults` are ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct NewsResponse {
    #[serde(default)]
    pub articles: Vec<ArticleDto>,
}

/// One article as the remote source reports it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArticleDto {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(rename = "urlToImage", default)]
    pub url_to_image: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let body = r#"{
            "status": "ok",
            "totalResults": 1,
            "articles": [{
                "source": {"id": null, "name": "Example"},
                "title": "Hello",
                "url": "https://n.example/1",
                "urlToImage": "https://n.example/1.jpg",
                "publishedAt": "2024-01-01T00:00:00Z"
            }]
        }"#;
        let response: NewsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            response.articles,
            vec![ArticleDto {
                title: Some("Hello".into()),
                url: "https://n.example/1".into(),
                url_to_image: Some("https://n.example/1.jpg".into()),
            }]
        );
    }

    #[test]
    fn test_decode_nullable_fields() {
        let body = r#"{"articles": [{"title": null, "url": "https://n.example/2", "urlToImage": null}]}"#;
        let response: NewsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.articles[0].title, None);
        assert_eq!(response.articles[0].url_to_image, None);
    }

    #[test]
    fn test_decode_missing_articles_is_empty() {
        let response: NewsResponse = serde_json::from_str(r#"{"status": "ok"}"#).unwrap();
        assert!(response.articles.is_empty());
    }

    #[test]
    fn test_decode_requires_url() {
        let result = serde_json::from_str::<NewsResponse>(r#"{"articles": [{"title": "x"}]}"#);
        assert!(result.is_err());
    }
}
