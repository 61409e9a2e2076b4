//! HTTP client for scraping source sites
//!
//! Each source site gets its own [`SourceClient`] instance, explicitly
//! constructed and injected rather than shared as a process global.
//! Features:
//! - User-Agent rotation
//! - Rate limiting with governor
//! - Concurrency cap with a semaphore
//! - Automatic retry with exponential backoff
//! - GBK encoding detection and conversion (the scraped sites predate
//!   their own UTF-8 migrations)

use bytes::Bytes;
use encoding_rs::{GBK, UTF_8};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use rand::seq::SliceRandom;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT},
    Client, Response,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::error::FetchError;

/// Pool of realistic User-Agent strings for rotation
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

/// Rate-limited, retrying HTTP client bound to one site's base URL
pub struct SourceClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Base URL prepended to all request paths
    base_url: String,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Concurrency semaphore
    semaphore: Arc<Semaphore>,

    /// Maximum number of retry attempts for failed requests
    max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    base_delay_ms: u64,
}

impl SourceClient {
    /// Create a new client with default retry/timeout settings
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(base_url: &str, requests_per_second: u32) -> Result<Self, FetchError> {
        Self::with_config(base_url, requests_per_second, 3, 10, Duration::from_secs(30))
    }

    /// Create a new client with custom configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn with_config(
        base_url: &str,
        requests_per_second: u32,
        max_retries: u32,
        max_concurrent: usize,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::new(1).unwrap());
        let quota = Quota::per_second(rate);
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            max_retries,
            base_delay_ms: 1000,
        })
    }

    /// The base URL this client is bound to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a path and return the raw body bytes
    ///
    /// Handles rate limiting and retry with exponential backoff. `path` may
    /// be site-relative ("/book/42/") or absolute (chapter hrefs sometimes
    /// are).
    ///
    /// # Errors
    ///
    /// Returns `FetchError::MaxRetriesExceeded` if all retries fail
    pub async fn fetch_bytes(&self, path: &str) -> Result<Bytes, FetchError> {
        let response = self.fetch(path).await?;
        Ok(response.bytes().await?)
    }

    /// Fetch a path and decode the body as text (UTF-8 or GBK)
    pub async fn fetch_html(&self, path: &str) -> Result<String, FetchError> {
        let response = self.fetch(path).await?;
        self.decode_response(response).await
    }

    /// Rate-limited fetch with exponential-backoff retry
    async fn fetch(&self, path: &str) -> Result<Response, FetchError> {
        self.rate_limiter.until_ready().await;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| FetchError::InvalidUrl("client is shutting down".to_string()))?;

        let url = self.full_url(path);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            // Apply exponential backoff for retries
            if attempt > 0 {
                let delay = self.base_delay_ms * 2_u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let headers = self.build_headers();

            match self.client.get(&url).headers(headers).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    } else if Self::should_retry(status.as_u16()) {
                        last_error = Some(FetchError::ServerError(status.as_u16()));
                        continue;
                    } else {
                        return Err(FetchError::ServerError(status.as_u16()));
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(FetchError::Timeout);
                    } else {
                        last_error = Some(FetchError::Http(e));
                    }
                }
            }
        }

        tracing::warn!(url = %url, error = ?last_error, "fetch exhausted retries");
        Err(FetchError::MaxRetriesExceeded)
    }

    fn full_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Determine if a status code should trigger a retry
    ///
    /// Retry on 429 and transient 5xx; 4xx client errors are final.
    fn should_retry(status: u16) -> bool {
        matches!(status, 429 | 500 | 502 | 503 | 504)
    }

    /// Decode response body handling both UTF-8 and GBK encodings
    async fn decode_response(&self, response: Response) -> Result<String, FetchError> {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_default();

        let bytes = response.bytes().await?;

        Self::decode_bytes(&bytes, &content_type)
    }

    /// Decode bytes to a UTF-8 string with encoding detection
    ///
    /// Strategy:
    /// 1. Charset from the Content-Type header
    /// 2. UTF-8
    /// 3. GBK fallback
    /// 4. HTML meta charset sniff as last resort
    pub fn decode_bytes(bytes: &[u8], content_type: &str) -> Result<String, FetchError> {
        let content_type = content_type.to_lowercase();

        if content_type.contains("charset=gbk") || content_type.contains("charset=gb2312") {
            return decode_gbk(bytes);
        }

        if content_type.contains("charset=utf-8") {
            return decode_utf8(bytes);
        }

        if let Ok(text) = decode_utf8(bytes) {
            if !text.starts_with('\u{FFFD}') {
                return Ok(text);
            }
        }

        if let Ok(text) = decode_gbk(bytes) {
            return Ok(text);
        }

        if let Ok(partial) = std::str::from_utf8(&bytes[..bytes.len().min(1024)]) {
            let partial = partial.to_lowercase();
            if partial.contains("charset=gbk") || partial.contains("charset=gb2312") {
                return decode_gbk(bytes);
            }
        }

        Err(FetchError::Decode(
            "Failed to decode content with UTF-8 or GBK".to_string(),
        ))
    }

    /// Build HTTP headers for scraping requests
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        let user_agent = self.random_user_agent();
        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));

        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        headers
    }

    /// Get a random user agent from the pool
    fn random_user_agent(&self) -> &'static str {
        let mut rng = rand::thread_rng();
        USER_AGENTS.choose(&mut rng).unwrap_or(&USER_AGENTS[0])
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String, FetchError> {
    let (cow, _encoding, had_errors) = UTF_8.decode(bytes);

    if had_errors {
        return Err(FetchError::Decode("UTF-8 decoding errors".to_string()));
    }

    Ok(cow.into_owned())
}

fn decode_gbk(bytes: &[u8]) -> Result<String, FetchError> {
    let (cow, _encoding, had_errors) = GBK.decode(bytes);

    if had_errors {
        return Err(FetchError::Decode("GBK decoding errors".to_string()));
    }

    Ok(cow.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_rotation() {
        let client = SourceClient::new("http://example.com", 10).unwrap();

        let mut agents = std::collections::HashSet::new();
        for _ in 0..100 {
            let agent = client.random_user_agent();
            assert!(USER_AGENTS.contains(&agent));
            agents.insert(agent);
        }

        assert!(agents.len() > 1, "User agents should rotate");
    }

    #[test]
    fn test_decode_utf8() {
        let text = "Hello, 你好";
        let decoded = SourceClient::decode_bytes(text.as_bytes(), "text/html; charset=utf-8");

        assert_eq!(decoded.unwrap(), text);
    }

    #[test]
    fn test_decode_gbk() {
        // "你好" in GBK encoding
        let gbk_bytes: &[u8] = &[0xc4, 0xe3, 0xba, 0xc3];

        let decoded = SourceClient::decode_bytes(gbk_bytes, "text/html; charset=gbk");
        assert_eq!(decoded.unwrap(), "你好");
    }

    #[test]
    fn test_decode_gbk_fallback() {
        // GBK bytes without an explicit charset should fall back to GBK
        let gbk_bytes: &[u8] = &[0xc4, 0xe3, 0xba, 0xc3];

        let decoded = SourceClient::decode_bytes(gbk_bytes, "text/html");
        assert_eq!(decoded.unwrap(), "你好");
    }

    #[test]
    fn test_should_retry() {
        assert!(SourceClient::should_retry(429));
        assert!(SourceClient::should_retry(500));
        assert!(SourceClient::should_retry(503));

        assert!(!SourceClient::should_retry(400));
        assert!(!SourceClient::should_retry(404));
        assert!(!SourceClient::should_retry(200));
    }

    #[test]
    fn test_full_url() {
        let client = SourceClient::new("http://example.com/", 10).unwrap();
        assert_eq!(client.full_url("/book/1/"), "http://example.com/book/1/");
        assert_eq!(
            client.full_url("https://other.com/ch/2.html"),
            "https://other.com/ch/2.html"
        );
    }
}
