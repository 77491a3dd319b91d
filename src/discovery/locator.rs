use super::prompts::{JSON_ONLY_SYSTEM, results_page_prompt};
use super::terms::results_page_terms;
use crate::error::DiscoveryError;
use crate::scraper::LinkExtractor;
use crate::services::llm::{LlmClient, parse_lenient};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct LocatorAnswer {
    #[serde(rename = "earningsPage", default)]
    earnings_page: Option<String>,
}

/// IR home page → quarterly results page, via one completion.
pub struct ResultsPageLocator {
    extractor: Arc<LinkExtractor>,
    llm: Arc<dyn LlmClient>,
}

impl ResultsPageLocator {
    pub fn new(extractor: Arc<LinkExtractor>, llm: Arc<dyn LlmClient>) -> Self {
        Self { extractor, llm }
    }

    /// The model's `earningsPage`, verbatim. Reachability is not checked here.
    pub async fn locate(&self, ir_site: &str) -> Result<String, DiscoveryError> {
        let terms = results_page_terms();
        let location_err = |reason: String| DiscoveryError::Location {
            site: ir_site.to_string(),
            reason,
        };

        let mut links = match self.extractor.extract_static(ir_site, &terms, false).await {
            Ok(links) => links,
            Err(e) => {
                warn!("Static fetch of {} failed: {}", ir_site, e);
                Vec::new()
            }
        };
        if links.is_empty() {
            debug!("{}: nothing in static HTML, rendering instead", ir_site);
            links = self.extractor.extract_rendered(ir_site, &terms, false).await;
        }
        if links.is_empty() {
            return Err(location_err("no candidate links on the IR home page".into()));
        }

        let prompt = results_page_prompt(&links, ir_site);
        let raw = self.llm.complete(&prompt, Some(JSON_ONLY_SYSTEM)).await?;

        let answer: LocatorAnswer = parse_lenient(&raw, '{').map_err(|e| location_err(e.to_string()))?;
        let page = answer
            .earnings_page
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| location_err("model answer has no earningsPage".into()))?;

        info!("Quarterly results page: {}", page);
        Ok(page)
    }
}
