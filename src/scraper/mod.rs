pub mod browser;
pub mod cleaner;
pub mod http_client;
pub mod parsers;
pub mod webdriver;

use crate::config::ScraperConfig;
use crate::error::ServiceError;
use crate::models::CandidateLink;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use self::browser::{BrowserDriver, RenderOptions, collect_rendered_links};
use self::cleaner::keep_static;
use self::http_client::PageFetcher;
use self::parsers::parse_anchors;

/// An anchor as read off the page, before any relevance filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAnchor {
    /// Absolute href.
    pub href: String,
    /// Trimmed text content of the anchor itself.
    pub text: String,
    /// Text of nested `span`/`label` children, space-joined.
    #[serde(default)]
    pub label_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractMode {
    /// Fetch raw HTML and parse it.
    Static,
    /// Render in a browser and walk year/period selectors.
    Rendered,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub mode: ExtractMode,
    /// Present a desktop browser user agent instead of the default.
    pub custom_user_agent: bool,
}

impl ExtractOptions {
    pub fn fixed(mode: ExtractMode) -> Self {
        Self {
            mode,
            custom_user_agent: false,
        }
    }
}

// ── Link extractor ────────────────────────────────────────────────────────────

pub struct LinkExtractor {
    pages: Arc<dyn PageFetcher>,
    browser: Arc<dyn BrowserDriver>,
    browser_user_agent: String,
    navigation_timeout: Duration,
    settle_delay: Duration,
}

impl LinkExtractor {
    pub fn new(pages: Arc<dyn PageFetcher>, browser: Arc<dyn BrowserDriver>, config: &ScraperConfig) -> Self {
        Self {
            pages,
            browser,
            browser_user_agent: config.browser_user_agent.clone(),
            navigation_timeout: config.navigation_timeout(),
            settle_delay: config.settle_delay(),
        }
    }

    /// Candidate links on `page_url` whose text (or, rendered, href) names a term.
    ///
    /// Static failures are returned; rendered failures degrade to whatever was
    /// collected before the failure.
    pub async fn extract_links(
        &self,
        page_url: &str,
        terms: &[String],
        options: ExtractOptions,
    ) -> Result<Vec<CandidateLink>, ServiceError> {
        match options.mode {
            ExtractMode::Static => self.extract_static(page_url, terms, options.custom_user_agent).await,
            ExtractMode::Rendered => Ok(self.extract_rendered(page_url, terms, options.custom_user_agent).await),
        }
    }

    pub async fn extract_static(
        &self,
        page_url: &str,
        terms: &[String],
        custom_user_agent: bool,
    ) -> Result<Vec<CandidateLink>, ServiceError> {
        let base = Url::parse(page_url).map_err(|_| ServiceError::InvalidUrl(page_url.to_string()))?;
        let ua = custom_user_agent.then_some(self.browser_user_agent.as_str());

        let html = self.pages.get_text(page_url, ua).await?;
        let anchors = parse_anchors(&html, &base)?;
        let links: Vec<CandidateLink> = anchors.iter().filter_map(|a| keep_static(a, terms)).collect();

        info!("{}: {} of {} anchors relevant", page_url, links.len(), anchors.len());
        Ok(links)
    }

    pub async fn extract_rendered(&self, page_url: &str, terms: &[String], custom_user_agent: bool) -> Vec<CandidateLink> {
        let opts = RenderOptions {
            user_agent: custom_user_agent.then(|| self.browser_user_agent.clone()),
            navigation_timeout: self.navigation_timeout,
            settle_delay: self.settle_delay,
        };
        collect_rendered_links(self.browser.as_ref(), page_url, terms, &opts).await
    }

    /// Whether the page refuses the default user agent (anything but a 200).
    /// An unreachable page is treated as needing one.
    ///
    /// The check is one plain HTTP GET carrying the client's own agent, which
    /// stands in for the headless browser's default: sites that turn away
    /// non-browser agents turn away both. A `true` switches static and
    /// rendered extraction to `browser_user_agent`.
    pub async fn needs_user_agent(&self, page_url: &str) -> bool {
        match self.pages.status_of(page_url).await {
            Ok(200) => false,
            Ok(status) => {
                debug!("{} answered {} to the default user agent", page_url, status);
                true
            }
            Err(e) => {
                warn!("User agent check of {} failed: {}", page_url, e);
                true
            }
        }
    }
}
