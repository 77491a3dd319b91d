use crate::error::ServiceError;
use crate::models::SearchHit;
use crate::scraper::http_client::HttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

#[async_trait]
pub trait SearchService: Send + Sync {
    /// Organic results, best first.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError>;
}

/// Google results through SerpApi.
pub struct SerpApiClient {
    http: Arc<HttpClient>,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<SearchHit>,
    #[serde(default)]
    error: Option<String>,
}

impl SerpApiClient {
    pub fn new(http: Arc<HttpClient>, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl SearchService for SerpApiClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ServiceError::MissingApiKey("search"))?;
        let url = Url::parse_with_params(
            &format!("{}/search.json", self.base_url),
            &[("engine", "google"), ("q", query), ("api_key", api_key)],
        )
        .map_err(|_| ServiceError::InvalidUrl(self.base_url.clone()))?;

        let resp: SerpApiResponse = self.http.get_json(url.as_str(), "search").await?;
        if let Some(err) = resp.error {
            return Err(ServiceError::unexpected("search", err));
        }
        Ok(resp.organic_results)
    }
}
