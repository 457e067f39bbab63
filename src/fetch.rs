use crate::config::ScrapeConfig;
use crate::error::{Result, ScrapeError};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const RENDER_API_URL: &str = "https://api.scrapingdog.com/scrape";

/// Status codes treated as transient; everything else fails the fetch.
const RETRYABLE_STATUS: [u16; 7] = [408, 410, 429, 500, 502, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS.contains(&status)
}

/// Rendered page markup for one URL.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub html: String,
    pub status_code: u16,
    pub credits_used: u32,
}

/// Seam for page fetching so pipeline code can be driven by a stub in tests.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str, dynamic: bool) -> Result<PageResponse>;
}

/// Client for the rendering proxy API. Rate limiting state is owned by the
/// instance, not the process.
pub struct RenderClient {
    client: reqwest::Client,
    api_key: String,
    request_delay: Duration,
    js_wait_ms: u64,
    max_retries: u32,
    last_request: Mutex<Option<Instant>>,
}

impl RenderClient {
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        let api_key = config
            .render_api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ScrapeError::Config("FRINGE_RENDER_API_KEY not configured".into()))?;

        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
            api_key,
            request_delay: Duration::from_millis(config.request_delay_ms),
            js_wait_ms: config.js_wait_ms,
            max_retries: config.max_retries.max(1),
            last_request: Mutex::new(None),
        })
    }

    /// Enforce the minimum delay between requests.
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.request_delay {
                let pause = self.request_delay - elapsed;
                debug!("Rate limiting: sleeping {:?}", pause);
                tokio::time::sleep(pause).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn fetch_once(&self, url: &str, dynamic: bool) -> Result<PageResponse> {
        self.rate_limit().await;

        let mut params = vec![
            ("api_key".to_string(), self.api_key.clone()),
            ("url".to_string(), url.to_string()),
            ("dynamic".to_string(), dynamic.to_string()),
        ];
        if dynamic && self.js_wait_ms > 0 {
            params.push(("wait".to_string(), self.js_wait_ms.to_string()));
        }

        debug!("Fetching: {} (dynamic={})", url, dynamic);
        let response = self.client.get(RENDER_API_URL).query(&params).send().await?;
        let status_code = response.status().as_u16();
        let html = response.text().await?;

        Ok(PageResponse {
            html,
            status_code,
            credits_used: if dynamic { 5 } else { 1 },
        })
    }
}

#[async_trait]
impl PageFetcher for RenderClient {
    async fn fetch_page(&self, url: &str, dynamic: bool) -> Result<PageResponse> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(url, dynamic).await {
                Ok(response) if response.status_code == 200 => {
                    debug!(
                        "Fetched successfully, ~{} credits used",
                        response.credits_used
                    );
                    return Ok(response);
                }
                Ok(response) => {
                    if is_retryable_status(response.status_code) && attempt < self.max_retries {
                        warn!(
                            "Transient status {} for {}, retrying ({}/{})",
                            response.status_code, url, attempt, self.max_retries
                        );
                        tokio::time::sleep(backoff_delay(attempt)).await;
                        continue;
                    }
                    return Err(ScrapeError::Api {
                        message: format!(
                            "Proxy API returned status {} for {}",
                            response.status_code, url
                        ),
                    });
                }
                Err(ScrapeError::Http(e)) if e.is_timeout() && attempt < self.max_retries => {
                    warn!("Request timed out for {}, retrying ({}/{})", url, attempt, self.max_retries);
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(attempt.saturating_sub(1).min(4)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_status_classification() {
        for status in [408, 410, 429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status), "{} should retry", status);
        }
        for status in [200, 301, 400, 401, 403, 404, 501] {
            assert!(!is_retryable_status(status), "{} should be fatal", status);
        }
    }

    #[test]
    fn test_missing_api_key_is_fatal() {
        let config = ScrapeConfig::default();
        let result = RenderClient::new(&config);
        assert!(matches!(result, Err(ScrapeError::Config(_))));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(10), Duration::from_millis(8000));
    }

    #[tokio::test]
    async fn test_rate_limit_spaces_requests() {
        let config = ScrapeConfig {
            render_api_key: Some("test-key".to_string()),
            request_delay_ms: 50,
            ..Default::default()
        };
        let client = RenderClient::new(&config).unwrap();

        let start = Instant::now();
        client.rate_limit().await;
        client.rate_limit().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
