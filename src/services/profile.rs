use crate::error::ServiceError;
use crate::models::CompanyProfile;
use crate::scraper::http_client::HttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait CompanyProfileService: Send + Sync {
    async fn lookup(&self, ticker: &str) -> Result<CompanyProfile, ServiceError>;
}

// ── Yahoo quote summary ───────────────────────────────────────────────────────

/// Company profile from Yahoo Finance's `quoteSummary` (assetProfile + price).
pub struct YahooProfileClient {
    http: Arc<HttpClient>,
    base_url: String,
    cookie_url: Option<String>,
    crumb: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryEnvelope {
    quote_summary: QuoteSummary,
}

#[derive(Debug, Deserialize)]
struct QuoteSummary {
    #[serde(default)]
    result: Option<Vec<QuoteSummaryResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    asset_profile: Option<AssetProfile>,
    #[serde(default)]
    price: Option<PriceModule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetProfile {
    #[serde(default)]
    ir_website: Option<String>,
    #[serde(default)]
    website: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    #[serde(default)]
    long_name: Option<String>,
    #[serde(default)]
    short_name: Option<String>,
}

impl YahooProfileClient {
    /// `cookie_url` is visited before the first crumb request; empty skips it.
    pub fn new(http: Arc<HttpClient>, base_url: &str, cookie_url: &str) -> Self {
        let cookie_url = cookie_url.trim();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cookie_url: (!cookie_url.is_empty()).then(|| cookie_url.to_string()),
            crumb: OnceCell::new(),
        }
    }

    pub fn cookie_url(&self) -> Option<&str> {
        self.cookie_url.as_deref()
    }

    /// Yahoo wants a session cookie plus a matching crumb on every summary call.
    async fn crumb(&self) -> Result<&str, ServiceError> {
        let crumb = self
            .crumb
            .get_or_try_init(|| async move {
                // Only sets the session cookie; a failure surfaces at the crumb request.
                if let Some(url) = self.cookie_url() {
                    match self.http.inner().get(url).send().await {
                        Ok(resp) => debug!("Cookie warm-up at {} answered {}", url, resp.status()),
                        Err(e) => debug!("Cookie warm-up at {} failed: {}", url, e),
                    }
                }
                let crumb = self
                    .http
                    .get_with_retry(&format!("{}/v1/test/getcrumb", self.base_url), None)
                    .await?;
                let crumb = crumb.trim().to_string();
                if crumb.is_empty() || crumb.contains('<') {
                    return Err(ServiceError::unexpected("profile", "empty crumb"));
                }
                Ok::<_, ServiceError>(crumb)
            })
            .await?;
        Ok(crumb.as_str())
    }
}

#[async_trait]
impl CompanyProfileService for YahooProfileClient {
    async fn lookup(&self, ticker: &str) -> Result<CompanyProfile, ServiceError> {
        let crumb = self.crumb().await?;
        let url = Url::parse_with_params(
            &format!("{}/v10/finance/quoteSummary/{}", self.base_url, ticker),
            &[("modules", "assetProfile,price"), ("crumb", crumb)],
        )
        .map_err(|_| ServiceError::InvalidUrl(ticker.to_string()))?;

        let envelope: QuoteSummaryEnvelope = self.http.get_json(url.as_str(), "profile").await?;
        let profile = profile_from_summary(envelope.quote_summary)?;
        debug!("{}: profile {:?}", ticker, profile);
        Ok(profile)
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn profile_from_summary(summary: QuoteSummary) -> Result<CompanyProfile, ServiceError> {
    if let Some(err) = summary.error.filter(|e| !e.is_null()) {
        return Err(ServiceError::unexpected("profile", err.to_string()));
    }
    let Some(result) = summary.result.and_then(|r| r.into_iter().next()) else {
        return Err(ServiceError::unexpected("profile", "no quote summary result"));
    };

    let (ir, website) = match result.asset_profile {
        Some(ap) => (non_empty(ap.ir_website), non_empty(ap.website)),
        None => (None, None),
    };
    let name = result
        .price
        .and_then(|p| non_empty(p.long_name).or(non_empty(p.short_name)));

    Ok(CompanyProfile {
        investor_relations_url: ir,
        website,
        name,
    })
}
