//! In-memory stand-ins for the network and browser seams.

use crate::error::{BrowserError, ServiceError};
use crate::models::{CompanyProfile, SearchHit};
use crate::scraper::RawAnchor;
use crate::scraper::browser::{BrowserDriver, BrowserSession, SelectControl};
use crate::scraper::http_client::PageFetcher;
use crate::services::llm::LlmClient;
use crate::services::profile::CompanyProfileService;
use crate::services::search::SearchService;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn http_error(status: u16, url: &str) -> ServiceError {
    ServiceError::Http {
        status: StatusCode::from_u16(status).unwrap_or(StatusCode::NOT_FOUND),
        url: url.to_string(),
    }
}

// ── Pages ─────────────────────────────────────────────────────────────────────

/// Static pages by URL. A status set with `with_status` is what the default
/// user agent gets; a custom user agent still receives the page body.
#[derive(Clone, Default)]
pub struct FakePages {
    bodies: HashMap<String, String>,
    statuses: HashMap<String, u16>,
    user_agents: Arc<Mutex<Vec<Option<String>>>>,
}

impl FakePages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.bodies.insert(url.to_string(), html.to_string());
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    /// User agent of every `get_text` call, in order.
    pub fn user_agents(&self) -> Vec<Option<String>> {
        self.user_agents.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakePages {
    async fn get_text(&self, url: &str, user_agent: Option<&str>) -> Result<String, ServiceError> {
        self.user_agents.lock().unwrap().push(user_agent.map(str::to_string));
        if let (None, Some(&status)) = (user_agent, self.statuses.get(url)) {
            return Err(http_error(status, url));
        }
        self.bodies.get(url).cloned().ok_or_else(|| http_error(404, url))
    }

    async fn status_of(&self, url: &str) -> Result<u16, ServiceError> {
        match (self.statuses.get(url), self.bodies.contains_key(url)) {
            (Some(&status), _) => Ok(status),
            (None, true) => Ok(200),
            (None, false) => Err(ServiceError::Timeout(url.to_string())),
        }
    }
}

// ── Browser ───────────────────────────────────────────────────────────────────

/// A rendered page: its initial anchors plus select controls whose options
/// swap in a different anchor set.
#[derive(Clone, Default)]
pub struct FakePage {
    anchors: Vec<RawAnchor>,
    controls: Vec<SelectControl>,
    reveals: HashMap<String, Vec<RawAnchor>>,
    failing: Vec<String>,
}

impl FakePage {
    pub fn new(anchors: Vec<RawAnchor>) -> Self {
        Self {
            anchors,
            ..Self::default()
        }
    }

    pub fn with_control(mut self, control: SelectControl, reveals: Vec<(&str, Vec<RawAnchor>)>) -> Self {
        self.controls.push(control);
        for (value, anchors) in reveals {
            self.reveals.insert(value.to_string(), anchors);
        }
        self
    }

    pub fn failing_selection(mut self, value: &str) -> Self {
        self.failing.push(value.to_string());
        self
    }
}

#[derive(Default)]
struct BrowserLog {
    open: AtomicUsize,
    closed: AtomicUsize,
    selections: AtomicUsize,
    user_agents: Mutex<Vec<Option<String>>>,
}

#[derive(Clone, Default)]
pub struct FakeBrowser {
    pages: HashMap<String, FakePage>,
    log: Arc<BrowserLog>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    pub fn open_sessions(&self) -> usize {
        self.log.open.load(Ordering::SeqCst)
    }

    pub fn closed_sessions(&self) -> usize {
        self.log.closed.load(Ordering::SeqCst)
    }

    pub fn selections(&self) -> usize {
        self.log.selections.load(Ordering::SeqCst)
    }

    /// User agent of every opened session, in order.
    pub fn user_agents(&self) -> Vec<Option<String>> {
        self.log.user_agents.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn open(&self, user_agent: Option<&str>) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.log.open.fetch_add(1, Ordering::SeqCst);
        self.log.user_agents.lock().unwrap().push(user_agent.map(str::to_string));
        Ok(Box::new(FakeSession {
            pages: self.pages.clone(),
            log: self.log.clone(),
            current: None,
        }))
    }
}

struct FakeSession {
    pages: HashMap<String, FakePage>,
    log: Arc<BrowserLog>,
    current: Option<(FakePage, Vec<RawAnchor>)>,
}

impl FakeSession {
    fn page(&mut self) -> Result<&mut (FakePage, Vec<RawAnchor>), BrowserError> {
        self.current
            .as_mut()
            .ok_or_else(|| BrowserError::Command("no page loaded".into()))
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let page = self.pages.get(url).cloned().ok_or_else(|| BrowserError::NavigationTimeout {
            url: url.to_string(),
            secs: timeout.as_secs(),
        })?;
        let anchors = page.anchors.clone();
        self.current = Some((page, anchors));
        Ok(())
    }

    async fn anchors(&mut self) -> Result<Vec<RawAnchor>, BrowserError> {
        Ok(self.page()?.1.clone())
    }

    async fn select_controls(&mut self) -> Result<Vec<SelectControl>, BrowserError> {
        Ok(self.page()?.0.controls.clone())
    }

    async fn select_option(&mut self, _control: &SelectControl, value: &str) -> Result<(), BrowserError> {
        let (page, shown) = self.page()?;
        if page.failing.iter().any(|v| v == value) {
            return Err(BrowserError::Script(format!("option {:?} detached", value)));
        }
        if let Some(revealed) = page.reveals.get(value) {
            *shown = revealed.clone();
        }
        self.log.selections.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn settle(&mut self, _max: Duration) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.log.open.fetch_sub(1, Ordering::SeqCst);
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Profiles and search ───────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeProfiles {
    profiles: HashMap<String, CompanyProfile>,
}

impl FakeProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ticker: &str, profile: CompanyProfile) -> Self {
        self.profiles.insert(ticker.to_string(), profile);
        self
    }
}

#[async_trait]
impl CompanyProfileService for FakeProfiles {
    async fn lookup(&self, ticker: &str) -> Result<CompanyProfile, ServiceError> {
        self.profiles
            .get(ticker)
            .cloned()
            .ok_or_else(|| ServiceError::unexpected("profile", format!("unknown ticker {}", ticker)))
    }
}

pub struct FakeSearch {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

impl FakeSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchService for FakeSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.hits.clone())
    }
}

// ── LLM ───────────────────────────────────────────────────────────────────────

type Responder = Box<dyn Fn(&str) -> String + Send + Sync>;

pub struct FakeLlm {
    respond: Responder,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn replying(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::responding(move |_| reply.clone())
    }

    /// Answer computed from the prompt.
    pub fn responding(respond: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, prompt: &str, _system: Option<&str>) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok((self.respond)(prompt))
    }
}
