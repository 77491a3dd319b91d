//! Browser seam for script-rendered pages.
//!
//! A session is acquired through [`SessionGuard`], which closes it on every
//! exit path: explicit [`SessionGuard::close`] on the normal path, or a
//! spawned close from `Drop` when the owning future errors out early or is
//! abandoned mid-scan.

use super::RawAnchor;
use super::cleaner::keep_rendered;
use crate::error::BrowserError;
use crate::models::CandidateLink;
use async_trait::async_trait;
use serde::Deserialize;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A `<select>` control as found on the rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelectControl {
    /// Position among the page's `<select>` elements.
    pub index: usize,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub options: Vec<String>,
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Open one isolated browsing context.
    async fn open(&self, user_agent: Option<&str>) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

#[async_trait]
pub trait BrowserSession: Send {
    /// Navigate and wait for network idle, bounded by `timeout`.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn anchors(&mut self) -> Result<Vec<RawAnchor>, BrowserError>;

    async fn select_controls(&mut self) -> Result<Vec<SelectControl>, BrowserError>;

    async fn select_option(&mut self, control: &SelectControl, value: &str) -> Result<(), BrowserError>;

    /// Wait for re-render after an interaction. Returns early once the page is idle.
    async fn settle(&mut self, max: Duration) -> Result<(), BrowserError>;

    async fn close(self: Box<Self>) -> Result<(), BrowserError>;
}

// ── Scoped session ────────────────────────────────────────────────────────────

/// Stand-in left behind once the real session has been handed off for closing.
struct Released;

#[async_trait]
impl BrowserSession for Released {
    async fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        Err(BrowserError::Command("session already released".into()))
    }
    async fn anchors(&mut self) -> Result<Vec<RawAnchor>, BrowserError> {
        Err(BrowserError::Command("session already released".into()))
    }
    async fn select_controls(&mut self) -> Result<Vec<SelectControl>, BrowserError> {
        Err(BrowserError::Command("session already released".into()))
    }
    async fn select_option(&mut self, _control: &SelectControl, _value: &str) -> Result<(), BrowserError> {
        Err(BrowserError::Command("session already released".into()))
    }
    async fn settle(&mut self, _max: Duration) -> Result<(), BrowserError> {
        Ok(())
    }
    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        Ok(())
    }
}

pub struct SessionGuard {
    session: Box<dyn BrowserSession>,
    released: bool,
}

impl SessionGuard {
    pub async fn open(driver: &dyn BrowserDriver, user_agent: Option<&str>) -> Result<Self, BrowserError> {
        Ok(Self {
            session: driver.open(user_agent).await?,
            released: false,
        })
    }

    fn take(&mut self) -> Box<dyn BrowserSession> {
        self.released = true;
        std::mem::replace(&mut self.session, Box::new(Released))
    }

    pub async fn close(mut self) {
        if let Err(e) = self.take().close().await {
            warn!("Failed to close browser session: {}", e);
        }
    }
}

impl Deref for SessionGuard {
    type Target = dyn BrowserSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let session = self.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Closing abandoned browser session");
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!("Failed to close abandoned browser session: {}", e);
                    }
                });
            }
            Err(_) => warn!("Browser session dropped outside a runtime; it was not closed"),
        }
    }
}

// ── Rendered scan ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub user_agent: Option<String>,
    pub navigation_timeout: Duration,
    pub settle_delay: Duration,
}

/// Load `url` in a fresh session, collect relevant anchors, then walk every
/// `<select>` whose option values name a term, re-scanning after each pick.
///
/// Failures are logged and whatever was accumulated so far is returned.
pub async fn collect_rendered_links(
    driver: &dyn BrowserDriver,
    url: &str,
    terms: &[String],
    opts: &RenderOptions,
) -> Vec<CandidateLink> {
    let mut session = match SessionGuard::open(driver, opts.user_agent.as_deref()).await {
        Ok(s) => s,
        Err(e) => {
            warn!("Rendered extraction of {} skipped: {}", url, e);
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    if let Err(e) = scan(&mut session, url, terms, opts, &mut found).await {
        warn!(
            "Rendered extraction of {} stopped early: {} ({} links kept)",
            url,
            e,
            found.len()
        );
    }
    session.close().await;

    info!("{}: {} rendered links", url, found.len());
    found
}

async fn scan(
    session: &mut SessionGuard,
    url: &str,
    terms: &[String],
    opts: &RenderOptions,
    found: &mut Vec<CandidateLink>,
) -> Result<(), BrowserError> {
    session.navigate(url, opts.navigation_timeout).await?;
    found.extend(relevant_anchors(session, terms).await?);

    let controls = session.select_controls().await?;
    debug!("{}: {} select controls", url, controls.len());

    for control in &controls {
        let options = relevant_options(control, terms);
        if options.is_empty() {
            continue;
        }
        if let Err(e) = walk_control(session, control, &options, terms, opts, found).await {
            warn!(
                "Select control #{} ({}) on {} failed: {}",
                control.index,
                if control.id.is_empty() { &control.name } else { &control.id },
                url,
                e
            );
        }
    }
    Ok(())
}

async fn walk_control(
    session: &mut SessionGuard,
    control: &SelectControl,
    options: &[&str],
    terms: &[String],
    opts: &RenderOptions,
    found: &mut Vec<CandidateLink>,
) -> Result<(), BrowserError> {
    for option in options {
        debug!("Selecting {:?} on control #{}", option, control.index);
        session.select_option(control, option).await?;
        session.settle(opts.settle_delay).await?;
        found.extend(relevant_anchors(session, terms).await?);
    }
    Ok(())
}

async fn relevant_anchors(session: &mut SessionGuard, terms: &[String]) -> Result<Vec<CandidateLink>, BrowserError> {
    Ok(session
        .anchors()
        .await?
        .iter()
        .filter_map(|a| keep_rendered(a, terms))
        .collect())
}

/// Option values that contain a relevance term, e.g. `2024` in a fiscal-year picker.
pub fn relevant_options<'a>(control: &'a SelectControl, terms: &[String]) -> Vec<&'a str> {
    control
        .options
        .iter()
        .filter(|v| {
            let v = v.to_lowercase();
            terms.iter().any(|t| v.contains(&t.to_lowercase()))
        })
        .map(String::as_str)
        .collect()
}
