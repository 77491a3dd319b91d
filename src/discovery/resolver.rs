use crate::error::ServiceError;
use crate::models::CompanyProfile;
use crate::scraper::http_client::PageFetcher;
use crate::services::profile::CompanyProfileService;
use crate::services::search::SearchService;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Ticker → investor relations site.
///
/// Cheapest signal first: the profile's IR field, then a website that already
/// is the IR site, then a search, then well-known IR subdomains and paths.
pub struct SiteResolver {
    profiles: Arc<dyn CompanyProfileService>,
    search: Arc<dyn SearchService>,
    pages: Arc<dyn PageFetcher>,
}

impl SiteResolver {
    pub fn new(
        profiles: Arc<dyn CompanyProfileService>,
        search: Arc<dyn SearchService>,
        pages: Arc<dyn PageFetcher>,
    ) -> Self {
        Self {
            profiles,
            search,
            pages,
        }
    }

    /// `Ok(None)` when nothing usable is known about the company.
    pub async fn resolve(&self, ticker: &str) -> Result<Option<String>, ServiceError> {
        let profile = self.profiles.lookup(ticker).await?;

        if let Some(ir) = profile.investor_relations_url {
            info!("{}: IR site from profile: {}", ticker, ir);
            return Ok(Some(ir));
        }

        if let Some(site) = profile.website.as_deref().filter(|w| w.to_lowercase().contains("invest")) {
            info!("{}: company website is the IR site: {}", ticker, site);
            return Ok(Some(site.to_string()));
        }

        let domain = profile.website.as_deref().and_then(bare_domain);
        let Some(subject) = search_subject(&profile, domain.as_deref()) else {
            warn!("{}: profile has neither a website nor a name", ticker);
            return Ok(None);
        };

        let query = format!("{} investor relations site", subject);
        match self.search.search(&query).await {
            Ok(hits) => {
                if let Some(hit) = hits.into_iter().find(|h| Url::parse(&h.link).is_ok()) {
                    info!(
                        "{}: IR site from search {:?}: {} ({})",
                        ticker,
                        query,
                        hit.link,
                        hit.title.as_deref().unwrap_or("untitled")
                    );
                    return Ok(Some(hit.link));
                }
                debug!("{}: search {:?} returned nothing usable", ticker, query);
            }
            Err(e) => warn!("{}: search {:?} failed: {}", ticker, query, e),
        }

        let Some(domain) = domain else {
            return Ok(None);
        };
        for candidate in ir_candidates(&domain) {
            match self.pages.status_of(&candidate).await {
                Ok(status) if (200..300).contains(&status) => {
                    info!("{}: IR site by probing: {}", ticker, candidate);
                    return Ok(Some(candidate));
                }
                Ok(status) => debug!("{} answered {}", candidate, status),
                Err(e) => debug!("{} unreachable: {}", candidate, e),
            }
        }
        Ok(None)
    }
}

/// `https://www.abc.com/en/` → `abc.com`
pub fn bare_domain(website: &str) -> Option<String> {
    let website = website.trim();
    let parsed = Url::parse(website).or_else(|_| Url::parse(&format!("https://{}", website)));
    let host = parsed.ok()?.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    (!host.is_empty()).then_some(host)
}

fn search_subject(profile: &CompanyProfile, domain: Option<&str>) -> Option<String> {
    domain
        .map(str::to_string)
        .or_else(|| profile.name.clone())
        .filter(|s| !s.trim().is_empty())
}

/// Conventional IR locations, most common first.
pub fn ir_candidates(domain: &str) -> Vec<String> {
    vec![
        format!("https://investors.{}", domain),
        format!("https://investor.{}", domain),
        format!("https://ir.{}", domain),
        format!("https://{}/ir", domain),
        format!("https://{}/investors", domain),
    ]
}
