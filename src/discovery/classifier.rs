use super::prompts::{JSON_ONLY_SYSTEM, classification_prompt};
use super::terms::{Round, RoundPlan, plan_rounds, relevance_terms};
use crate::config::ClassifierConfig;
use crate::error::DiscoveryError;
use crate::models::{CandidateLink, DocumentLocation, DocumentResponse, DocumentType, FiscalPeriod};
use crate::scraper::LinkExtractor;
use crate::scraper::cleaner::merge_links;
use crate::services::llm::{LlmClient, parse_lenient};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Results page → one document response per requested (type, period).
pub struct DocumentClassifier {
    extractor: Arc<LinkExtractor>,
    llm: Arc<dyn LlmClient>,
    config: ClassifierConfig,
}

impl DocumentClassifier {
    pub fn new(extractor: Arc<LinkExtractor>, llm: Arc<dyn LlmClient>, config: ClassifierConfig) -> Self {
        Self { extractor, llm, config }
    }

    pub async fn classify(
        &self,
        results_page: &str,
        types: &[DocumentType],
        periods: &[FiscalPeriod],
    ) -> Result<Vec<DocumentResponse>, DiscoveryError> {
        let links = self.collect_links(results_page, types, periods).await;
        let base = Url::parse(results_page).ok();

        match plan_rounds(types, periods, self.config.split_threshold) {
            RoundPlan::Single(round) => self.run_round(&round, &links, base.as_ref()).await,
            RoundPlan::Split(first, second) => {
                info!(
                    "{} cells exceed {}; classifying in two rounds of {} and {}",
                    types.len() * periods.len(),
                    self.config.split_threshold,
                    first.cell_count(),
                    second.cell_count()
                );
                let (mut a, b) = tokio::try_join!(
                    self.run_round(&first, &links, base.as_ref()),
                    self.run_round(&second, &links, base.as_ref()),
                )?;
                a.extend(b);
                Ok(a)
            }
        }
    }

    /// Static and rendered links from the results page, merged.
    pub async fn collect_links(
        &self,
        results_page: &str,
        types: &[DocumentType],
        periods: &[FiscalPeriod],
    ) -> Vec<CandidateLink> {
        let terms = relevance_terms(types, periods);
        debug!("Relevance terms: {:?}", terms);

        let custom_ua = self.extractor.needs_user_agent(results_page).await;

        let visible = match self.extractor.extract_static(results_page, &terms, custom_ua).await {
            Ok(links) => links,
            Err(e) => {
                warn!("Static extraction of {} failed: {}", results_page, e);
                Vec::new()
            }
        };
        let rendered = self.extractor.extract_rendered(results_page, &terms, custom_ua).await;

        let links = merge_links(&visible, &rendered);
        info!(
            "{}: {} candidate links ({} static, {} rendered)",
            results_page,
            links.len(),
            visible.len(),
            rendered.len()
        );
        links
    }

    async fn run_round(
        &self,
        round: &Round<'_>,
        links: &[CandidateLink],
        base: Option<&Url>,
    ) -> Result<Vec<DocumentResponse>, DiscoveryError> {
        let prompt = classification_prompt(links, round);
        debug!("Classification prompt ({} cells, {} chars)", round.cell_count(), prompt.len());

        let raw = self.llm.complete(&prompt, Some(JSON_ONLY_SYSTEM)).await?;
        let cells: Vec<Value> = parse_lenient(&raw, '[')?;

        Ok(reconcile(cells, round, links, base, self.config.backfill_missing))
    }
}

/// Map the model's cells back onto the round's grid, in grid order.
///
/// Unrequested or malformed cells are dropped, the first answer for a cell
/// wins, and omitted cells become not-found when `backfill` is set.
fn reconcile(
    cells: Vec<Value>,
    round: &Round<'_>,
    links: &[CandidateLink],
    base: Option<&Url>,
    backfill: bool,
) -> Vec<DocumentResponse> {
    let offered: HashSet<&str> = links.iter().map(|l| l.href.as_str()).collect();
    let mut answers: HashMap<(DocumentType, FiscalPeriod), DocumentLocation> = HashMap::new();

    for cell in &cells {
        let field = |name: &str| cell.get(name).and_then(Value::as_str);
        let (Some(t), Some(p)) = (
            field("documentType").and_then(|s| s.parse::<DocumentType>().ok()),
            field("fiscalPeriod").and_then(|s| s.parse::<FiscalPeriod>().ok()),
        ) else {
            debug!("Skipping unreadable cell {}", cell);
            continue;
        };
        if !round.contains(t, p) {
            debug!("Skipping unrequested cell {} {}", t, p);
            continue;
        }
        answers
            .entry((t, p))
            .or_insert_with(|| normalize_location(field("documentResponse"), &offered, base));
    }

    round
        .cells()
        .filter_map(|(t, p)| match answers.remove(&(t, p)) {
            Some(location) => Some(DocumentResponse {
                document_type: t,
                fiscal_period: p,
                document_response: location,
            }),
            None if backfill => {
                warn!("Model omitted {} {}; reporting not found", t, p);
                Some(DocumentResponse::not_found(t, p))
            }
            None => {
                warn!("Model omitted {} {}", t, p);
                None
            }
        })
        .collect()
}

/// An absolute http(s) URL is kept as given. A relative answer is joined onto
/// `base` only when it is one of the `offered` hrefs or is written as a path
/// (`/`, `./`, `../`). Anything else, such as "N/A" or a reworded sentinel, is
/// not found.
fn normalize_location(raw: Option<&str>, offered: &HashSet<&str>, base: Option<&Url>) -> DocumentLocation {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return DocumentLocation::NotFound;
    };
    if DocumentLocation::is_sentinel(raw) {
        return DocumentLocation::NotFound;
    }

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => DocumentLocation::Url(raw.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) if offered.contains(raw) || looks_like_path(raw) => {
            match base.and_then(|b| b.join(raw).ok()) {
                Some(joined) => DocumentLocation::Url(joined.to_string()),
                None => DocumentLocation::NotFound,
            }
        }
        _ => {
            warn!("Model answered {:?}, which is not a document URL", raw);
            DocumentLocation::NotFound
        }
    }
}

fn looks_like_path(raw: &str) -> bool {
    ["/", "./", "../"].iter().any(|p| raw.starts_with(p)) && !raw.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScraperConfig;
    use crate::models::NOT_FOUND;
    use crate::scraper::RawAnchor;
    use crate::scraper::browser::SelectControl;
    use crate::testing::{FakeBrowser, FakeLlm, FakePage, FakePages};
    use serde_json::json;

    const RESULTS: &str = "https://ir.abc.com/results";

    fn period(s: &str) -> FiscalPeriod {
        s.parse().unwrap()
    }

    fn classifier(pages: FakePages, browser: FakeBrowser, llm: Arc<FakeLlm>) -> DocumentClassifier {
        let extractor = LinkExtractor::new(Arc::new(pages), Arc::new(browser), &ScraperConfig {
            settle_delay_ms: 1,
            ..ScraperConfig::default()
        });
        DocumentClassifier::new(Arc::new(extractor), llm, ClassifierConfig::default())
    }

    fn results_html() -> &'static str {
        r#"<a href="/q1-2024-release.pdf">1Q 2024 Earnings Release</a>
           <a href="/q1-2024-deck.pdf">Q1 2024 Investor Presentation</a>
           <a href="/careers">Careers</a>"#
    }

    #[test]
    fn reconcile_keeps_grid_order_and_backfills() {
        let types = [DocumentType::EarningsRelease, DocumentType::EarningsWebcast];
        let periods = [period("1Q2024"), period("2Q2024")];
        let round = Round { document_types: &types, fiscal_periods: &periods };
        let cells = vec![
            json!({"documentType":"EarningsWebcast","fiscalPeriod":"1Q2024","documentResponse":"https://x/call"}),
            json!({"documentType":"EarningsRelease","fiscalPeriod":"2Q2024","documentResponse":"Document not found"}),
            json!({"documentType":"EarningsRelease","fiscalPeriod":"1Q2024","documentResponse":"https://x/r1.pdf"}),
            json!({"documentType":"EarningsRelease","fiscalPeriod":"1Q2024","documentResponse":"https://x/dup.pdf"}),
            json!({"documentType":"EarningsPresentation","fiscalPeriod":"1Q2024","documentResponse":"https://x/deck"}),
            json!({"oops": true}),
        ];

        let out = reconcile(cells, &round, &[], None, true);

        assert_eq!(out.len(), 4);
        assert_eq!(out[0].document_response, DocumentLocation::Url("https://x/r1.pdf".into()));
        assert_eq!(out[1].document_response, DocumentLocation::NotFound);
        assert_eq!(out[2].document_response, DocumentLocation::Url("https://x/call".into()));
        assert_eq!(
            (out[3].document_type, out[3].fiscal_period, &out[3].document_response),
            (DocumentType::EarningsWebcast, period("2Q2024"), &DocumentLocation::NotFound)
        );
    }

    #[test]
    fn reconcile_without_backfill_leaves_gaps() {
        let types = [DocumentType::EarningsRelease];
        let periods = [period("1Q2024"), period("2Q2024")];
        let round = Round { document_types: &types, fiscal_periods: &periods };
        let cells = vec![json!({"documentType":"Earnings Release","fiscalPeriod":"2Q2024","documentResponse":"https://x/2"})];

        let out = reconcile(cells, &round, &[], None, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].fiscal_period, period("2Q2024"));
    }

    #[test]
    fn locations_are_urls_or_the_sentinel() {
        let base = Url::parse("https://ir.abc.com/results/").unwrap();
        let none = HashSet::new();
        assert_eq!(
            normalize_location(Some("/files/q1.pdf"), &none, Some(&base)),
            DocumentLocation::Url("https://ir.abc.com/files/q1.pdf".into())
        );
        assert_eq!(
            normalize_location(Some("../q1.pdf"), &none, Some(&base)),
            DocumentLocation::Url("https://ir.abc.com/q1.pdf".into())
        );
        assert_eq!(
            normalize_location(Some(" https://cdn.abc.com/q1.pdf "), &none, Some(&base)),
            DocumentLocation::Url("https://cdn.abc.com/q1.pdf".into())
        );
        assert_eq!(normalize_location(Some("document not found"), &none, Some(&base)), DocumentLocation::NotFound);
        assert_eq!(normalize_location(Some("javascript:void(0)"), &none, Some(&base)), DocumentLocation::NotFound);
        assert_eq!(normalize_location(None, &none, Some(&base)), DocumentLocation::NotFound);
    }

    #[test]
    fn free_text_answers_are_never_joined_onto_the_page() {
        let base = Url::parse("https://ir.abc.com/results/").unwrap();
        let none = HashSet::new();
        for answer in ["N/A", "Document not found.", "Not available", "No matching document", "/ not listed"] {
            assert_eq!(
                normalize_location(Some(answer), &none, Some(&base)),
                DocumentLocation::NotFound,
                "{:?}",
                answer
            );
        }
    }

    #[test]
    fn offered_relative_href_is_resolved() {
        let base = Url::parse("https://ir.abc.com/results/").unwrap();
        let offered = HashSet::from(["files/q2-2024.pdf"]);
        assert_eq!(
            normalize_location(Some("files/q2-2024.pdf"), &offered, Some(&base)),
            DocumentLocation::Url("https://ir.abc.com/results/files/q2-2024.pdf".into())
        );
        assert_eq!(
            normalize_location(Some("files/q3-2024.pdf"), &offered, Some(&base)),
            DocumentLocation::NotFound
        );
    }

    #[test]
    fn reconcile_reports_free_text_as_not_found() {
        let types = [DocumentType::EarningsRelease];
        let periods = [period("1Q2024"), period("2Q2024")];
        let round = Round { document_types: &types, fiscal_periods: &periods };
        let base = Url::parse(RESULTS).unwrap();
        let links = vec![CandidateLink::new("https://ir.abc.com/q1-2024-release.pdf", "1Q 2024 Earnings Release")];
        let cells = vec![
            json!({"documentType":"EarningsRelease","fiscalPeriod":"1Q2024","documentResponse":"https://ir.abc.com/q1-2024-release.pdf"}),
            json!({"documentType":"EarningsRelease","fiscalPeriod":"2Q2024","documentResponse":"N/A"}),
        ];

        let out = reconcile(cells, &round, &links, Some(&base), true);

        assert!(out[0].document_response.is_found());
        assert_eq!(out[1].document_response, DocumentLocation::NotFound);
    }

    #[tokio::test]
    async fn classifies_from_static_and_rendered_links() {
        let pages = FakePages::new().with_page(RESULTS, results_html());
        let browser = FakeBrowser::new().with_page(
            RESULTS,
            FakePage::new(vec![]).with_control(
                SelectControl {
                    index: 0,
                    id: "fy".into(),
                    name: String::new(),
                    options: vec!["2023".into(), "2024".into()],
                },
                vec![(
                    "2024",
                    vec![RawAnchor {
                        href: "https://ir.abc.com/q1-2024-call".into(),
                        text: String::new(),
                        label_text: "Q1 2024 Webcast".into(),
                    }],
                )],
            ),
        );
        let llm = Arc::new(FakeLlm::replying(
            r#"Sure, here it is:
            [{"documentType":"EarningsRelease","fiscalPeriod":"1Q2024","documentResponse":"https://ir.abc.com/q1-2024-release.pdf"},
             {"documentType":"EarningsWebcast","fiscalPeriod":"1Q2024","documentResponse":"https://ir.abc.com/q1-2024-call"}]"#,
        ));
        let c = classifier(pages, browser, llm.clone());

        let out = c
            .classify(RESULTS, &[DocumentType::EarningsRelease, DocumentType::EarningsWebcast], &[period("1Q2024")])
            .await
            .unwrap();

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| r.document_response.is_found()));

        let prompt = &llm.prompts()[0];
        assert!(prompt.contains("https://ir.abc.com/q1-2024-release.pdf"));
        assert!(prompt.contains("https://ir.abc.com/q1-2024-call"));
        assert!(!prompt.contains("/careers"));
    }

    #[tokio::test]
    async fn eighteen_cells_issue_one_call() {
        let pages = FakePages::new().with_page(RESULTS, results_html());
        let llm = Arc::new(FakeLlm::replying("[]"));
        let c = classifier(pages, FakeBrowser::new(), llm.clone());
        let periods: Vec<FiscalPeriod> = (1..=4)
            .map(|q| FiscalPeriod::new(q, 2023).unwrap())
            .chain((1..=2).map(|q| FiscalPeriod::new(q, 2024).unwrap()))
            .collect();

        let out = c.classify(RESULTS, &DocumentType::ALL, &periods).await.unwrap();

        assert_eq!(llm.prompts().len(), 1);
        assert_eq!(out.len(), 18);
        assert!(out.iter().all(|r| r.document_response == DocumentLocation::NotFound));
    }

    #[tokio::test]
    async fn more_than_eighteen_cells_issue_two_calls_covering_every_cell() {
        let pages = FakePages::new().with_page(RESULTS, results_html());
        let llm = Arc::new(FakeLlm::replying(&format!(
            r#"[{{"documentType":"EarningsRelease","fiscalPeriod":"1Q2022","documentResponse":"{}"}}]"#,
            NOT_FOUND
        )));
        let c = classifier(pages, FakeBrowser::new(), llm.clone());
        let periods: Vec<FiscalPeriod> = (2022..=2023)
            .flat_map(|y| (1..=4).map(move |q| FiscalPeriod::new(q, y).unwrap()))
            .collect();

        let out = c.classify(RESULTS, &DocumentType::ALL, &periods).await.unwrap();

        assert_eq!(llm.prompts().len(), 2);
        assert_eq!(out.len(), 24);
        assert_eq!(out[0].fiscal_period, period("1Q2022"));
        assert_eq!(out[12].fiscal_period, period("1Q2023"));
    }

    #[tokio::test]
    async fn unparseable_answer_fails_the_request() {
        let pages = FakePages::new().with_page(RESULTS, results_html());
        let llm = Arc::new(FakeLlm::replying("I could not find anything, sorry."));
        let c = classifier(pages, FakeBrowser::new(), llm);

        let err = c
            .classify(RESULTS, &[DocumentType::EarningsRelease], &[period("1Q2024")])
            .await
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::ClassificationParse(_)));
    }

    #[tokio::test]
    async fn blocked_page_gets_the_desktop_user_agent() {
        let pages = FakePages::new()
            .with_page(RESULTS, results_html())
            .with_status(RESULTS, 403);
        let browser = FakeBrowser::new().with_page(RESULTS, FakePage::new(vec![]));
        let llm = Arc::new(FakeLlm::replying("[]"));
        let c = classifier(pages.clone(), browser.clone(), llm.clone());

        let out = c
            .classify(RESULTS, &[DocumentType::EarningsRelease], &[period("1Q2024")])
            .await
            .unwrap();

        let desktop = Some(ScraperConfig::default().browser_user_agent);
        assert_eq!(pages.user_agents(), vec![desktop.clone()]);
        assert_eq!(browser.user_agents(), vec![desktop]);
        assert!(llm.prompts()[0].contains("q1-2024-release.pdf"));
        assert_eq!(out.len(), 1);
    }
}
