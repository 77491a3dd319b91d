use super::RawAnchor;
use crate::error::ServiceError;
use scraper::{Html, Selector};
use url::Url;

// ── Anchors ───────────────────────────────────────────────────────────────────

/// Parse every `<a>` in a static document.
///
/// Hrefs are resolved against `base` the way a browser reports `a.href`;
/// anchors whose href is missing, unresolvable, or not http(s) are dropped.
pub fn parse_anchors(html: &str, base: &Url) -> Result<Vec<RawAnchor>, ServiceError> {
    let doc = Html::parse_document(html);

    let a_sel = Selector::parse("a")
        .map_err(|e| ServiceError::unexpected("html", format!("a selector: {:?}", e)))?;
    let label_sel = Selector::parse("span, label")
        .map_err(|e| ServiceError::unexpected("html", format!("label selector: {:?}", e)))?;

    let mut anchors = Vec::new();

    for a in doc.select(&a_sel) {
        let Some(raw_href) = a.value().attr("href") else { continue };
        let Some(href) = resolve_href(base, raw_href) else { continue };

        let text = a.text().collect::<String>();
        let label_text = a
            .select(&label_sel)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        anchors.push(RawAnchor {
            href,
            text: text.trim().to_string(),
            label_text,
        });
    }

    Ok(anchors)
}

fn resolve_href(base: &Url, raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = base.join(raw).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}
