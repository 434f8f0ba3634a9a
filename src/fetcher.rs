use crate::{config::Config, error::TransportError, CrawlerError};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Unit of the linear backoff applied after an HTTP 429.
pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single GET exchange. Retries and delays are the fetcher's business.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<Response, TransportError>;
}

/// `reqwest` backed transport with browser-like headers.
///
/// The client's connection pool lives as long as this value and is released
/// when it is dropped.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<HttpTransport, CrawlerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(HttpTransport { client })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Response, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(Response { status, body })
    }
}

/// Rate-limited fetcher with bounded retries.
///
/// Every failure mode ends in `None`: callers skip the URL instead of
/// aborting the crawl.
pub struct Fetcher<T = HttpTransport> {
    transport: T,
    max_retries: u32,
    request_delay: Duration,
    rate_limit_backoff: Duration,
    cancel: CancellationToken,
}

impl Fetcher<HttpTransport> {
    pub fn open(config: &Config, cancel: CancellationToken) -> Result<Self, CrawlerError> {
        let transport = HttpTransport::new(config)?;
        Ok(Fetcher::with_transport(transport, config, cancel))
    }
}

impl<T: Transport> Fetcher<T> {
    pub fn with_transport(transport: T, config: &Config, cancel: CancellationToken) -> Self {
        Fetcher {
            transport,
            // at least one attempt
            max_retries: config.max_retries.max(1),
            request_delay: config.request_delay(),
            rate_limit_backoff: RATE_LIMIT_BACKOFF,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn fetch(&self, url: &str) -> Option<String> {
        for attempt in 0..self.max_retries {
            if attempt > 0 && !self.pause(jitter(self.request_delay, 0.5)).await {
                return None;
            }
            if self.is_cancelled() {
                return None;
            }

            debug!("Visit {} (attempt {})", url, attempt + 1);
            match self.transport.get(url).await {
                Ok(response) if response.is_success() => return Some(response.body),
                Ok(response) if response.status == 429 => {
                    let wait = self.rate_limit_backoff * (attempt + 1);
                    warn!("Rate limited on {}, waiting {:?}", url, wait);
                    if !self.pause(wait).await {
                        return None;
                    }
                }
                Ok(response) if response.status >= 500 => {
                    warn!("Server error {} on {}", response.status, url);
                    if !self.pause(self.request_delay).await {
                        return None;
                    }
                }
                Ok(response) => {
                    warn!("Giving up on {}: HTTP {}", url, response.status);
                    return None;
                }
                Err(e) if e.is_transient() => {
                    warn!("{} on {}", e, url);
                    if attempt + 1 < self.max_retries
                        && !self.pause(self.request_delay * (attempt + 1)).await
                    {
                        return None;
                    }
                }
                Err(e) => {
                    warn!("Giving up on {}: {}", url, e);
                    return None;
                }
            }
        }

        warn!("Retries exhausted for {}", url);
        None
    }

    /// Like [`Fetcher::fetch`], after a short randomized delay. Used for detail
    /// pages, which far outnumber listing pages.
    pub async fn fetch_with_leading_delay(&self, url: &str) -> Option<String> {
        if !self.pause(jitter(self.request_delay, 0.3)).await {
            return None;
        }
        self.fetch(url).await
    }

    // false when cancelled while sleeping
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

fn jitter(base: Duration, spread: f64) -> Duration {
    base.mul_f64(1.0 + rand::rng().random_range(0.0..=spread))
}
