use super::RawAnchor;
use crate::models::CandidateLink;
use std::collections::HashSet;

/// Collapse runs of whitespace (newlines, tabs, nbsp) to single spaces.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_any(haystack: &str, terms: &[String]) -> bool {
    terms.iter().any(|t| haystack.contains(&t.to_lowercase()))
}

/// Static-page filter: non-empty href and text, and the text names a term.
pub fn keep_static(anchor: &RawAnchor, terms: &[String]) -> Option<CandidateLink> {
    let text = normalize_text(&anchor.text);
    if anchor.href.is_empty() || text.is_empty() {
        return None;
    }
    contains_any(&text.to_lowercase(), terms).then(|| CandidateLink::new(&anchor.href, text))
}

/// Rendered-page filter: the anchor text plus nested label text, or the href, names a term.
///
/// Sites often move the visible label into child spans, so the own text alone
/// is not enough.
pub fn keep_rendered(anchor: &RawAnchor, terms: &[String]) -> Option<CandidateLink> {
    if anchor.href.is_empty() {
        return None;
    }
    let text = normalize_text(&anchor.text);
    let full = format!("{} {}", text, normalize_text(&anchor.label_text))
        .trim()
        .to_lowercase();

    let relevant = contains_any(&full, terms) || contains_any(&anchor.href.to_lowercase(), terms);
    relevant.then(|| CandidateLink::new(&anchor.href, text))
}

/// Merge two link lists, keeping the first occurrence of each `(href, text)` pair.
///
/// Same href with different text stays: the text is what gets classified.
pub fn merge_links(first: &[CandidateLink], second: &[CandidateLink]) -> Vec<CandidateLink> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut merged = Vec::new();

    for link in first.iter().chain(second) {
        if seen.insert((link.href.as_str(), link.text.as_str())) {
            merged.push(link.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(ts: &[&str]) -> Vec<String> {
        ts.iter().map(|t| t.to_string()).collect()
    }

    fn anchor(href: &str, text: &str, label: &str) -> RawAnchor {
        RawAnchor {
            href: href.into(),
            text: text.into(),
            label_text: label.into(),
        }
    }

    #[test]
    fn static_filter_needs_text_match() {
        let t = terms(&["earn", "1q"]);
        assert!(keep_static(&anchor("https://x/a.pdf", "Q4 Earnings", ""), &t).is_some());
        assert!(keep_static(&anchor("https://x/1q.pdf", "Download", ""), &t).is_none());
        assert!(keep_static(&anchor("", "Earnings", ""), &t).is_none());
        assert!(keep_static(&anchor("https://x/a.pdf", "   ", ""), &t).is_none());
    }

    #[test]
    fn rendered_filter_reads_child_labels_and_href() {
        let t = terms(&["webcast", "2024"]);
        let by_label = keep_rendered(&anchor("https://x/e", "", "Listen to Webcast"), &t).unwrap();
        assert_eq!(by_label.text, "");

        assert!(keep_rendered(&anchor("https://x/2024/q1.pdf", "Download", ""), &t).is_some());
        assert!(keep_rendered(&anchor("https://x/about", "About us", "Team"), &t).is_none());
    }

    #[test]
    fn text_whitespace_is_collapsed() {
        let t = terms(&["release"]);
        let link = keep_static(&anchor("https://x/r", "\n  Press\n\t Release ", ""), &t).unwrap();
        assert_eq!(link.text, "Press Release");
    }

    #[test]
    fn merge_is_order_stable_and_keyed_on_href_and_text() {
        let a = vec![
            CandidateLink::new("https://x/1", "Release"),
            CandidateLink::new("https://x/2", "Deck"),
        ];
        let b = vec![
            CandidateLink::new("https://x/2", "Deck"),
            CandidateLink::new("https://x/1", "Q1 Release PDF"),
            CandidateLink::new("https://x/3", "Call"),
        ];

        let merged = merge_links(&a, &b);
        assert_eq!(
            merged,
            vec![
                CandidateLink::new("https://x/1", "Release"),
                CandidateLink::new("https://x/2", "Deck"),
                CandidateLink::new("https://x/1", "Q1 Release PDF"),
                CandidateLink::new("https://x/3", "Call"),
            ]
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let a = vec![
            CandidateLink::new("https://x/1", "Release"),
            CandidateLink::new("https://x/1", "Release"),
        ];
        let b = vec![CandidateLink::new("https://x/2", "Deck")];

        let once = merge_links(&a, &b);
        assert_eq!(merge_links(&once, &once), once);
        assert_eq!(merge_links(&once, &[]), once);
        assert_eq!(once.len(), 2);
    }
}
