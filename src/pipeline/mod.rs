//! Pipeline orchestrator: ticker → IR site → results page → classified documents.
//!
//! ## Stages
//!
//!   1. Resolve the company's investor relations site (profile, search, probing)
//!   2. Locate the quarterly results page among the IR home page's links
//!   3. Collect the results page's links and classify them per (type, period)
//!
//! Any stage failing aborts the request; there are no partial results.
//! Requests are independent, so several may run concurrently on one `Pipeline`.

use crate::config::AppConfig;
use crate::discovery::{DocumentClassifier, ResultsPageLocator, SiteResolver};
use crate::error::DiscoveryError;
use crate::models::{DocumentResponse, TickerRequest};
use crate::scraper::LinkExtractor;
use crate::scraper::http_client::HttpClient;
use crate::scraper::webdriver::WebDriverBrowser;
use crate::services::{SerpApiClient, YahooProfileClient, build_llm};
use crate::utils::Timer;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub struct Pipeline {
    resolver: SiteResolver,
    locator: ResultsPageLocator,
    classifier: DocumentClassifier,
    extractor: Arc<LinkExtractor>,
}

impl Pipeline {
    pub fn new(
        resolver: SiteResolver,
        locator: ResultsPageLocator,
        classifier: DocumentClassifier,
        extractor: Arc<LinkExtractor>,
    ) -> Self {
        Self {
            resolver,
            locator,
            classifier,
            extractor,
        }
    }

    /// Wire the production services from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let http = Arc::new(HttpClient::new(&config.scraper).context("Failed to build HTTP client")?);

        let profiles = Arc::new(YahooProfileClient::new(
            http.clone(),
            &config.services.profile_base_url,
            &config.services.profile_cookie_url,
        ));
        let search = Arc::new(SerpApiClient::new(
            http.clone(),
            &config.services.search_base_url,
            config.services.search_api_key(),
        ));
        let browser = Arc::new(WebDriverBrowser::new(&config.scraper));
        let extractor = Arc::new(LinkExtractor::new(http.clone(), browser, &config.scraper));

        let locator_llm = build_llm(&config.llm.locator).context("Failed to build locator model client")?;
        let classifier_llm =
            build_llm(&config.llm.classifier).context("Failed to build classifier model client")?;

        Ok(Self::new(
            SiteResolver::new(profiles, search, http),
            ResultsPageLocator::new(extractor.clone(), locator_llm),
            DocumentClassifier::new(extractor.clone(), classifier_llm, config.classifier.clone()),
            extractor,
        ))
    }

    pub fn resolver(&self) -> &SiteResolver {
        &self.resolver
    }

    pub fn locator(&self) -> &ResultsPageLocator {
        &self.locator
    }

    pub fn extractor(&self) -> &LinkExtractor {
        &self.extractor
    }

    pub async fn run(&self, request: &TickerRequest) -> Result<Vec<DocumentResponse>, DiscoveryError> {
        let ticker = request.ticker();
        let timer = Timer::start(format!("{} ({} cells)", ticker, request.cell_count()));

        // ── 1. Investor relations site ───────────────────────────────────────
        info!("=== Step 1: Resolving IR site for {} ===", ticker);
        let ir_site = self
            .resolver
            .resolve(ticker)
            .await
            .map_err(|e| DiscoveryError::Resolution {
                ticker: ticker.to_string(),
                reason: e.to_string(),
            })?
            .ok_or_else(|| DiscoveryError::Resolution {
                ticker: ticker.to_string(),
                reason: "no profile, search result or conventional IR address".into(),
            })?;

        // ── 2. Quarterly results page ────────────────────────────────────────
        info!("=== Step 2: Locating results page on {} ===", ir_site);
        let results_page = self.locator.locate(&ir_site).await?;

        // ── 3. Documents ─────────────────────────────────────────────────────
        info!("=== Step 3: Classifying documents on {} ===", results_page);
        let responses = self
            .classifier
            .classify(&results_page, request.document_types(), request.fiscal_periods())
            .await?;

        let found = responses.iter().filter(|r| r.document_response.is_found()).count();
        info!(
            "=== Done: {} | {} of {} documents found in {:.1?} ===",
            ticker,
            found,
            responses.len(),
            timer.elapsed()
        );
        Ok(responses)
    }
}
