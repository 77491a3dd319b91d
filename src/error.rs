use thiserror::Error;

/// Failures talking to anything over HTTP: profile, search, LLM and static pages.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("{0} timed out")]
    Timeout(String),

    #[error("No API key configured for {0}")]
    MissingApiKey(&'static str),

    #[error("Unexpected response from {service}: {detail}")]
    UnexpectedResponse {
        service: &'static str,
        detail: String,
    },

    #[error("Invalid URL {0:?}")]
    InvalidUrl(String),
}

impl ServiceError {
    /// Worth another attempt: network hiccups, throttling, server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ServiceError::Http { status, .. } => {
                status.as_u16() == 429 || status.is_server_error()
            }
            _ => false,
        }
    }

    pub fn unexpected(service: &'static str, detail: impl Into<String>) -> Self {
        ServiceError::UnexpectedResponse {
            service,
            detail: detail.into(),
        }
    }
}

/// Failures inside a browser session.
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Could not open browser session: {0}")]
    Session(String),

    #[error("Browser command failed: {0}")]
    Command(String),

    #[error("Navigation to {url} exceeded {secs}s")]
    NavigationTimeout { url: String, secs: u64 },

    #[error("Unexpected script result: {0}")]
    Script(String),
}

/// Neither the raw text nor the text from the first opening bracket parsed.
#[derive(Error, Debug)]
#[error("model output is not valid JSON ({source}); excerpt: {excerpt:?}")]
pub struct JsonRecoveryError {
    #[source]
    pub source: serde_json::Error,
    pub excerpt: String,
}

/// Request-level failures. Any of these aborts the whole request.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("No investor relations site could be resolved for {ticker}: {reason}")]
    Resolution { ticker: String, reason: String },

    #[error("Quarterly results page could not be located from {site}: {reason}")]
    Location { site: String, reason: String },

    #[error("Classification response could not be parsed: {0}")]
    ClassificationParse(#[from] JsonRecoveryError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}
