use crate::models::{DocumentType, FiscalPeriod};

/// Vocabulary present on nearly every earnings listing, whatever was requested.
pub const BASE_KEYWORDS: [&str; 6] = ["earn", "earnings", "invest", "investor", "press", "analyst"];

/// Terms that point from an IR home page toward its quarterly results page.
pub const RESULTS_PAGE_TERMS: [&str; 7] = [
    "earn", "invest", "relation", "quarter", "result", "report", "financ",
];

pub fn results_page_terms() -> Vec<String> {
    RESULTS_PAGE_TERMS.iter().map(|t| t.to_string()).collect()
}

fn push_unique(terms: &mut Vec<String>, term: String) {
    if !terms.contains(&term) {
        terms.push(term);
    }
}

/// Lowercase, deduplicated anchor filter for a request: quarter tokens, year
/// tokens, base keywords, then the keywords of each requested document type.
pub fn relevance_terms(types: &[DocumentType], periods: &[FiscalPeriod]) -> Vec<String> {
    let mut terms = Vec::new();

    for p in periods {
        push_unique(&mut terms, p.quarter_token().to_lowercase());
    }
    for p in periods {
        push_unique(&mut terms, p.year_token());
    }
    for k in BASE_KEYWORDS {
        push_unique(&mut terms, k.to_string());
    }
    for t in types {
        for k in t.keywords() {
            push_unique(&mut terms, k.to_string());
        }
    }
    terms
}

/// Split at `ceil(n / 2)`.
pub fn split_half<T>(items: &[T]) -> (&[T], &[T]) {
    items.split_at(items.len().div_ceil(2))
}

// ── Classification rounds ─────────────────────────────────────────────────────

/// One classification call: every type in `document_types` crossed with every
/// period in `fiscal_periods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round<'a> {
    pub document_types: &'a [DocumentType],
    pub fiscal_periods: &'a [FiscalPeriod],
}

impl<'a> Round<'a> {
    pub fn cell_count(&self) -> usize {
        self.document_types.len() * self.fiscal_periods.len()
    }

    /// Cells in type-major order.
    pub fn cells(&self) -> impl Iterator<Item = (DocumentType, FiscalPeriod)> + use<'a> {
        let periods = self.fiscal_periods;
        self.document_types
            .iter()
            .flat_map(move |t| periods.iter().map(move |p| (*t, *p)))
    }

    pub fn contains(&self, t: DocumentType, p: FiscalPeriod) -> bool {
        self.document_types.contains(&t) && self.fiscal_periods.contains(&p)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPlan<'a> {
    Single(Round<'a>),
    /// Two disjoint rounds whose union is the full grid.
    Split(Round<'a>, Round<'a>),
}

/// One round while the grid fits under `threshold` cells, two otherwise.
///
/// The split halves the fiscal periods and keeps every document type in both
/// rounds (types are halved instead when there is a single period), so no
/// requested cell falls between the rounds.
pub fn plan_rounds<'a>(
    types: &'a [DocumentType],
    periods: &'a [FiscalPeriod],
    threshold: usize,
) -> RoundPlan<'a> {
    let whole = Round {
        document_types: types,
        fiscal_periods: periods,
    };
    if whole.cell_count() <= threshold {
        return RoundPlan::Single(whole);
    }

    if periods.len() > 1 {
        let (first, second) = split_half(periods);
        RoundPlan::Split(
            Round { document_types: types, fiscal_periods: first },
            Round { document_types: types, fiscal_periods: second },
        )
    } else if types.len() > 1 {
        let (first, second) = split_half(types);
        RoundPlan::Split(
            Round { document_types: first, fiscal_periods: periods },
            Round { document_types: second, fiscal_periods: periods },
        )
    } else {
        RoundPlan::Single(whole)
    }
}
