use crate::error::DiscoveryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Literal emitted when a requested document could not be matched.
pub const NOT_FOUND: &str = "Document not found";

// ── Document type ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum DocumentType {
    EarningsRelease,
    EarningsPresentation,
    EarningsWebcast,
}

impl DocumentType {
    pub const ALL: [DocumentType; 3] = [
        DocumentType::EarningsRelease,
        DocumentType::EarningsPresentation,
        DocumentType::EarningsWebcast,
    ];

    /// Wire identifier, e.g. `EarningsRelease`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::EarningsRelease => "EarningsRelease",
            DocumentType::EarningsPresentation => "EarningsPresentation",
            DocumentType::EarningsWebcast => "EarningsWebcast",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentType::EarningsRelease => "Earnings Release",
            DocumentType::EarningsPresentation => "Earnings Presentation",
            DocumentType::EarningsWebcast => "Earnings Webcast",
        }
    }

    /// Lowercase tokens used to pre-filter anchors.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            DocumentType::EarningsRelease => &["release", "report", "summary"],
            DocumentType::EarningsPresentation => &["presentation", "deck", "slide"],
            DocumentType::EarningsWebcast => &["webcast", "call", "webinar", "conference", "audio"],
        }
    }

    /// Names sites commonly use for this document, spelled out for the model.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            DocumentType::EarningsRelease => &[
                "Earnings Report",
                "Earnings Press Release",
                "Earnings Summary",
            ],
            DocumentType::EarningsPresentation => &[
                "Analyst Slide Deck",
                "Investor Presentation",
                "Earnings Slides",
            ],
            DocumentType::EarningsWebcast => &[
                "Earnings Call",
                "Earnings Webinar",
                "Conference Call",
                "Audio Replay",
            ],
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl FromStr for DocumentType {
    type Err = String;

    /// Accepts `EarningsRelease`, `Earnings Release`, `earnings-release` or a known alias.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = squash(s);
        DocumentType::ALL
            .into_iter()
            .find(|t| {
                squash(t.as_str()) == wanted || t.aliases().iter().any(|a| squash(a) == wanted)
            })
            .ok_or_else(|| format!("unknown document type {:?}", s))
    }
}

impl TryFrom<String> for DocumentType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ── Fiscal period ─────────────────────────────────────────────────────────────

/// Quarter-year pair, written `{quarter}Q{year}` (e.g. `1Q2024`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FiscalPeriod {
    quarter: u8,
    year: u16,
}

impl FiscalPeriod {
    pub fn new(quarter: u8, year: u16) -> Result<Self, String> {
        if !(1..=4).contains(&quarter) {
            return Err(format!("quarter {} out of range 1-4", quarter));
        }
        if !(1000..=9999).contains(&year) {
            return Err(format!("year {} is not four digits", year));
        }
        Ok(Self { quarter, year })
    }

    /// Fixed two-character prefix, e.g. `1Q`.
    pub fn quarter_token(&self) -> String {
        format!("{}Q", self.quarter)
    }

    pub fn year_token(&self) -> String {
        self.year.to_string()
    }
}

impl fmt::Display for FiscalPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.quarter, self.year)
    }
}

impl FromStr for FiscalPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if !s.is_ascii() || s.len() != 6 {
            return Err(format!("fiscal period {:?} is not in xQyyyy form", s));
        }
        let (quarter_tok, year_tok) = s.split_at(2);

        let mut q = quarter_tok.chars();
        let quarter = q
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(|| format!("fiscal period {:?} has no quarter digit", s))?;
        if !matches!(q.next(), Some('Q') | Some('q')) {
            return Err(format!("fiscal period {:?} is missing the Q marker", s));
        }
        if !year_tok.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("fiscal period {:?} has a non-numeric year", s));
        }
        let year: u16 = year_tok
            .parse()
            .map_err(|_| format!("fiscal period {:?} has an invalid year", s))?;

        FiscalPeriod::new(quarter as u8, year)
    }
}

impl TryFrom<String> for FiscalPeriod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FiscalPeriod> for String {
    fn from(p: FiscalPeriod) -> Self {
        p.to_string()
    }
}

// ── Candidate link ────────────────────────────────────────────────────────────

/// An anchor pulled off a page, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateLink {
    pub href: String,
    pub text: String,
}

impl CandidateLink {
    pub fn new(href: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            text: text.into(),
        }
    }
}

// ── Document response ─────────────────────────────────────────────────────────

/// Either a document URL or the not-found sentinel. Serialized as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DocumentLocation {
    Url(String),
    NotFound,
}

impl DocumentLocation {
    pub fn is_found(&self) -> bool {
        matches!(self, DocumentLocation::Url(_))
    }

    pub fn is_sentinel(raw: &str) -> bool {
        raw.trim().eq_ignore_ascii_case(NOT_FOUND)
    }
}

impl From<String> for DocumentLocation {
    fn from(raw: String) -> Self {
        if DocumentLocation::is_sentinel(&raw) || raw.trim().is_empty() {
            DocumentLocation::NotFound
        } else {
            DocumentLocation::Url(raw.trim().to_string())
        }
    }
}

impl From<DocumentLocation> for String {
    fn from(loc: DocumentLocation) -> Self {
        match loc {
            DocumentLocation::Url(url) => url,
            DocumentLocation::NotFound => NOT_FOUND.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub document_type: DocumentType,
    pub fiscal_period: FiscalPeriod,
    pub document_response: DocumentLocation,
}

impl DocumentResponse {
    pub fn not_found(document_type: DocumentType, fiscal_period: FiscalPeriod) -> Self {
        Self {
            document_type,
            fiscal_period,
            document_response: DocumentLocation::NotFound,
        }
    }
}

// ── Ticker request ────────────────────────────────────────────────────────────

/// A validated request. Types and periods are deduplicated, first occurrence wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerRequest {
    ticker: String,
    document_types: Vec<DocumentType>,
    fiscal_periods: Vec<FiscalPeriod>,
}

impl TickerRequest {
    pub fn new(
        ticker: &str,
        document_types: impl IntoIterator<Item = DocumentType>,
        fiscal_periods: impl IntoIterator<Item = FiscalPeriod>,
    ) -> Result<Self, DiscoveryError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(DiscoveryError::InvalidRequest("ticker is empty".into()));
        }

        let mut types = Vec::new();
        for t in document_types {
            if !types.contains(&t) {
                types.push(t);
            }
        }
        let mut periods = Vec::new();
        for p in fiscal_periods {
            if !periods.contains(&p) {
                periods.push(p);
            }
        }

        if types.is_empty() {
            return Err(DiscoveryError::InvalidRequest(
                "at least one document type is required".into(),
            ));
        }
        if periods.is_empty() {
            return Err(DiscoveryError::InvalidRequest(
                "at least one fiscal period is required".into(),
            ));
        }

        Ok(Self {
            ticker,
            document_types: types,
            fiscal_periods: periods,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn document_types(&self) -> &[DocumentType] {
        &self.document_types
    }

    pub fn fiscal_periods(&self) -> &[FiscalPeriod] {
        &self.fiscal_periods
    }

    pub fn cell_count(&self) -> usize {
        self.document_types.len() * self.fiscal_periods.len()
    }
}

// ── Boundary shapes ───────────────────────────────────────────────────────────

/// `{ ticker, documentType: [...], fiscalPeriod: [...] }`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRequest {
    pub ticker: String,
    pub document_type: Vec<DocumentType>,
    pub fiscal_period: Vec<FiscalPeriod>,
}

impl TryFrom<DiscoveryRequest> for TickerRequest {
    type Error = DiscoveryError;

    fn try_from(req: DiscoveryRequest) -> Result<Self, Self::Error> {
        TickerRequest::new(&req.ticker, req.document_type, req.fiscal_period)
    }
}

/// `{ documentResponses: [...] }`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    pub document_responses: Vec<DocumentResponse>,
}

// ── External collaborator shapes ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyProfile {
    pub investor_relations_url: Option<String>,
    pub website: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchHit {
    pub link: String,
    #[serde(default)]
    pub title: Option<String>,
}
