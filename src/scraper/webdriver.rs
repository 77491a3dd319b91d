use super::RawAnchor;
use super::browser::{BrowserDriver, BrowserSession, SelectControl};
use crate::config::ScraperConfig;
use crate::error::BrowserError;
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::debug;

const ANCHORS_JS: &str = r#"
return Array.from(document.querySelectorAll('a')).map(a => ({
    href: typeof a.href === 'string' ? a.href : '',
    text: (a.textContent || '').trim(),
    labelText: Array.from(a.querySelectorAll('span, label'))
        .map(el => (el.textContent || '').trim())
        .filter(t => t.length > 0)
        .join(' ')
}));
"#;

const SELECTS_JS: &str = r#"
return Array.from(document.querySelectorAll('select')).map((s, i) => ({
    index: i,
    id: s.id || '',
    name: s.name || '',
    options: Array.from(s.querySelectorAll('option')).map(o => o.value)
}));
"#;

const SELECT_OPTION_JS: &str = r#"
const [index, value] = arguments;
const select = document.querySelectorAll('select')[index];
if (!select) { return false; }
select.value = value;
select.dispatchEvent(new Event('input', { bubbles: true }));
select.dispatchEvent(new Event('change', { bubbles: true }));
return true;
"#;

// Resource timing entries only appear once a load finishes, so in-flight
// fetch/XHR calls are counted separately.
const TRACK_PENDING_JS: &str = r#"
if (window.__irPending === undefined) {
    window.__irPending = 0;
    const origFetch = window.fetch;
    if (origFetch) {
        window.fetch = function (...args) {
            window.__irPending++;
            return origFetch.apply(this, args).finally(() => { window.__irPending--; });
        };
    }
    const origSend = XMLHttpRequest.prototype.send;
    XMLHttpRequest.prototype.send = function (...args) {
        window.__irPending++;
        this.addEventListener('loadend', () => { window.__irPending--; });
        return origSend.apply(this, args);
    };
}
return true;
"#;

const LOAD_STATE_JS: &str = r#"
return {
    ready: document.readyState,
    resources: performance.getEntriesByType('resource').length,
    pending: window.__irPending || 0
};
"#;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Drives Chrome through a WebDriver endpoint (chromedriver, selenium).
pub struct WebDriverBrowser {
    webdriver_url: String,
    headless: bool,
    idle_window: Duration,
}

impl WebDriverBrowser {
    pub fn new(config: &ScraperConfig) -> Self {
        Self {
            webdriver_url: config.webdriver_url.clone(),
            headless: config.headless,
            idle_window: config.idle_window(),
        }
    }
}

#[async_trait]
impl BrowserDriver for WebDriverBrowser {
    async fn open(&self, user_agent: Option<&str>) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let mut args = vec!["--disable-gpu".to_string(), "--no-sandbox".to_string()];
        if self.headless {
            args.push("--headless=new".to_string());
        }
        if let Some(ua) = user_agent {
            args.push(format!("--user-agent={}", ua));
        }

        let mut caps = serde_json::Map::new();
        caps.insert("browserName".to_string(), json!("chrome"));
        caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));

        let mut builder = ClientBuilder::native();
        builder.capabilities(caps);
        let client = builder
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| BrowserError::Session(e.to_string()))?;

        debug!("Opened WebDriver session at {}", self.webdriver_url);
        Ok(Box::new(WebDriverSession {
            client,
            idle_window: self.idle_window,
        }))
    }
}

pub struct WebDriverSession {
    client: Client,
    idle_window: Duration,
}

#[derive(Debug, Deserialize)]
struct LoadState {
    ready: String,
    resources: u64,
    pending: u64,
}

impl WebDriverSession {
    async fn eval<T: DeserializeOwned>(&self, script: &str, args: Vec<Value>) -> Result<T, BrowserError> {
        let value = self
            .client
            .execute(script, args)
            .await
            .map_err(|e| BrowserError::Command(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| BrowserError::Script(e.to_string()))
    }

    /// Poll until the document is complete, nothing is in flight, and no new
    /// resource entries appear for `idle_window`. Returns whether idle was
    /// reached before `max`.
    async fn wait_for_idle(&self, max: Duration) -> Result<bool, BrowserError> {
        let deadline = Instant::now() + max;
        let mut last_count = None;
        let mut quiet_since = Instant::now();

        loop {
            let state: LoadState = self.eval(LOAD_STATE_JS, vec![]).await?;
            let busy = state.ready != "complete" || state.pending > 0;
            if busy || last_count != Some(state.resources) {
                last_count = Some(state.resources);
                quiet_since = Instant::now();
            } else if quiet_since.elapsed() >= self.idle_window {
                return Ok(true);
            }

            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn navigate(&mut self, url: &str, limit: Duration) -> Result<(), BrowserError> {
        let started = Instant::now();
        timeout(limit, self.client.goto(url))
            .await
            .map_err(|_| BrowserError::NavigationTimeout {
                url: url.to_string(),
                secs: limit.as_secs(),
            })?
            .map_err(|e| BrowserError::Command(e.to_string()))?;
        let _: bool = self.eval(TRACK_PENDING_JS, vec![]).await?;

        let remaining = limit.saturating_sub(started.elapsed());
        if !self.wait_for_idle(remaining).await? {
            debug!("{} still loading resources after {:?}; scanning anyway", url, limit);
        }
        Ok(())
    }

    async fn anchors(&mut self) -> Result<Vec<RawAnchor>, BrowserError> {
        self.eval(ANCHORS_JS, vec![]).await
    }

    async fn select_controls(&mut self) -> Result<Vec<SelectControl>, BrowserError> {
        self.eval(SELECTS_JS, vec![]).await
    }

    async fn select_option(&mut self, control: &SelectControl, value: &str) -> Result<(), BrowserError> {
        let applied: bool = self
            .eval(SELECT_OPTION_JS, vec![json!(control.index), json!(value)])
            .await?;
        if applied {
            Ok(())
        } else {
            Err(BrowserError::Command(format!(
                "select #{} is no longer on the page",
                control.index
            )))
        }
    }

    async fn settle(&mut self, max: Duration) -> Result<(), BrowserError> {
        self.wait_for_idle(max).await.map(|_| ())
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.client
            .close()
            .await
            .map_err(|e| BrowserError::Command(e.to_string()))
    }
}
