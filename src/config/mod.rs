use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// Static fetch + browser configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Sent on plain HTTP fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Applied to browser sessions when the target rejects the automation default.
    #[serde(default = "default_browser_user_agent")]
    pub browser_user_agent: String,

    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// Upper bound on the wait after picking a selector option.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// How long the resource count must stay flat to call the page idle.
    #[serde(default = "default_idle_window_ms")]
    pub idle_window_ms: u64,
}

/// Company profile + search endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServicesConfig {
    #[serde(default = "default_profile_base_url")]
    pub profile_base_url: String,

    /// Visited once before the crumb request to pick up the session cookie.
    /// Empty skips the visit (mock profile endpoints).
    #[serde(default = "default_profile_cookie_url")]
    pub profile_cookie_url: String,

    #[serde(default = "default_search_base_url")]
    pub search_base_url: String,

    #[serde(default)]
    pub search_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
}

/// One completion backend. Each LLM call site gets its own.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmBackendConfig {
    pub provider: LlmProvider,
    pub model: String,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_locator_backend")]
    pub locator: LlmBackendConfig,

    #[serde(default = "default_classifier_backend")]
    pub classifier: LlmBackendConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Above this many (type, period) cells the request is split in two rounds.
    #[serde(default = "default_split_threshold")]
    pub split_threshold: usize,

    /// Fill cells the model left out with the not-found sentinel.
    #[serde(default = "default_true")]
    pub backfill_missing: bool,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    250
}
fn default_user_agent() -> String {
    "ir-discovery/0.1 (earnings document locator)".to_string()
}
fn default_browser_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3".to_string()
}
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}
fn default_navigation_timeout_secs() -> u64 {
    45
}
fn default_settle_delay_ms() -> u64 {
    3000
}
fn default_idle_window_ms() -> u64 {
    500
}
fn default_profile_base_url() -> String {
    "https://query2.finance.yahoo.com".to_string()
}
fn default_profile_cookie_url() -> String {
    "https://fc.yahoo.com".to_string()
}
fn default_search_base_url() -> String {
    "https://serpapi.com".to_string()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_locator_backend() -> LlmBackendConfig {
    LlmBackendConfig {
        provider: LlmProvider::OpenAi,
        model: "gpt-4".to_string(),
        base_url: None,
        api_key: None,
        max_tokens: default_max_tokens(),
        timeout_secs: default_llm_timeout_secs(),
    }
}
fn default_classifier_backend() -> LlmBackendConfig {
    LlmBackendConfig {
        provider: LlmProvider::Anthropic,
        model: "claude-3-opus-20240229".to_string(),
        base_url: None,
        api_key: None,
        max_tokens: default_max_tokens(),
        timeout_secs: default_llm_timeout_secs(),
    }
}
fn default_split_threshold() -> usize {
    18
}
fn default_true() -> bool {
    true
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            user_agent: default_user_agent(),
            browser_user_agent: default_browser_user_agent(),
            webdriver_url: default_webdriver_url(),
            headless: true,
            navigation_timeout_secs: default_navigation_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            idle_window_ms: default_idle_window_ms(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            profile_base_url: default_profile_base_url(),
            profile_cookie_url: default_profile_cookie_url(),
            search_base_url: default_search_base_url(),
            search_api_key: None,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            locator: default_locator_backend(),
            classifier: default_classifier_backend(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            split_threshold: default_split_threshold(),
            backfill_missing: true,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scraper: ScraperConfig::default(),
            services: ServicesConfig::default(),
            llm: LlmConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("IRDOCS").separator("__"))
            .build()
            .context("Failed to assemble configuration sources")?;

        cfg.try_deserialize()
            .context("Invalid configuration (check config/*.toml and IRDOCS__* variables)")
    }
}

impl ScraperConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.idle_window_ms)
    }
}

impl ServicesConfig {
    pub fn search_api_key(&self) -> Option<String> {
        self.search_api_key
            .clone()
            .or_else(|| std::env::var("SERPAPI_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

impl LlmBackendConfig {
    /// Configured key, else the provider's conventional environment variable.
    pub fn api_key(&self) -> Option<String> {
        let env_var = match self.provider {
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        };
        self.api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.provider) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, LlmProvider::OpenAi) => "https://api.openai.com",
            (None, LlmProvider::Anthropic) => "https://api.anthropic.com",
        }
    }
}
