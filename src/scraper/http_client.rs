use crate::config::ScraperConfig;
use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::header;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

/// Plain HTTP page access, swappable for tests.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a URL as text. `user_agent` overrides the client default.
    async fn get_text(&self, url: &str, user_agent: Option<&str>) -> Result<String, ServiceError>;

    /// Status code of a single GET with the default user agent. No retries.
    async fn status_of(&self, url: &str) -> Result<u16, ServiceError>;
}

pub struct HttpClient {
    inner: reqwest::Client,
    config: ScraperConfig,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self, ServiceError> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Quote lookups need the consent cookie to stick between calls
            .cookie_store(true)
            .build()?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.inner
    }

    /// Exponential backoff with jitter, bounded by `max_retries`.
    fn backoff(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(2)
            .factor(self.config.retry_base_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries as usize)
    }

    async fn try_get_text(&self, url: &str, user_agent: Option<&str>) -> Result<String, ServiceError> {
        debug!("GET {}", url);
        let mut req = self.inner.get(url);
        if let Some(ua) = user_agent {
            req = req.header(header::USER_AGENT, ua);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Http {
                status,
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }

    /// GET with retry on transient failures (network errors, 429, 5xx).
    pub async fn get_with_retry(&self, url: &str, user_agent: Option<&str>) -> Result<String, ServiceError> {
        RetryIf::start(
            self.backoff(),
            || self.try_get_text(url, user_agent),
            |e: &ServiceError| {
                let retry = e.is_transient();
                if retry {
                    warn!("Retrying {} after transient failure: {}", url, e);
                }
                retry
            },
        )
        .await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, service: &'static str) -> Result<T, ServiceError> {
        let body = self.get_with_retry(url, None).await?;
        serde_json::from_str(&body).map_err(|e| ServiceError::unexpected(service, e.to_string()))
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn get_text(&self, url: &str, user_agent: Option<&str>) -> Result<String, ServiceError> {
        self.get_with_retry(url, user_agent).await
    }

    async fn status_of(&self, url: &str) -> Result<u16, ServiceError> {
        let resp = self.inner.get(url).send().await?;
        Ok(resp.status().as_u16())
    }
}
