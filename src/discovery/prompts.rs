use super::terms::Round;
use crate::models::{CandidateLink, NOT_FOUND};
use serde_json::json;

pub const JSON_ONLY_SYSTEM: &str =
    "ONLY REPLY WITH JSON. DO NOT INCLUDE ANY TEXT OTHER THAN JSON IN YOUR RESPONSE.";

fn links_json(links: &[CandidateLink]) -> String {
    serde_json::to_string(links).unwrap_or_else(|_| "[]".to_string())
}

/// Ask for the single quarterly-results page among an IR home page's links.
pub fn results_page_prompt(links: &[CandidateLink], site_url: &str) -> String {
    format!(
        "You are given links found on the home page of a company's investor relations website, \
         which is {site}.\n\
         Pick the one page that lists the company's quarterly earnings results \
         (press releases, presentations and webcasts per quarter).\n\
         Some hrefs may be relative. Resolve them against {site} so the answer is an absolute URL.\n\
         Return a single JSON object of exactly this form, with no other text around it: \
         {{\"earningsPage\": \"<absolute URL>\"}}\n\n\
         The links are:\n{links}\n",
        site = site_url,
        links = links_json(links),
    )
}

/// Ask for one `{documentType, fiscalPeriod, documentResponse}` per cell of `round`.
pub fn classification_prompt(links: &[CandidateLink], round: &Round<'_>) -> String {
    let types = round
        .document_types
        .iter()
        .map(|t| {
            format!(
                "- {} ({}; may also be called: {})",
                t.as_str(),
                t.label(),
                t.aliases().join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let periods = round
        .fiscal_periods
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let example = json!([{
        "documentType": round.document_types.first().map(|t| t.as_str()).unwrap_or("EarningsRelease"),
        "fiscalPeriod": round.fiscal_periods.first().map(|p| p.to_string()).unwrap_or_default(),
        "documentResponse": "<href copied exactly, or Document not found>"
    }]);

    format!(
        "You are given links (href and text) found on the quarterly earnings results page of a \
         company's investor relations website.\n\
         Find the document for every combination of the document types and fiscal periods below.\n\
         Fiscal periods are written xQyyyy, where x is the quarter and yyyy is the year.\n\n\
         Document types (use these exact identifiers in the answer):\n{types}\n\n\
         Fiscal periods: {periods}\n\n\
         Return ONLY a JSON array with exactly one object per combination ({cells} objects), \
         shaped like {example}.\n\
         Copy the href exactly as given into documentResponse. Do not shorten, rewrite or invent URLs.\n\
         If no link matches a combination, documentResponse must be \"{not_found}\".\n\n\
         The links are:\n{links}\n",
        types = types,
        periods = periods,
        cells = round.cell_count(),
        example = example,
        not_found = NOT_FOUND,
        links = links_json(links),
    )
}
