//! Normalize raw markup into a [`ContentRecord`].
//!
//! Pure and synchronous. `scraper` handles the element-level lookups (title,
//! meta tags, JSON-LD blocks); regexes handle the inline hydration blobs that
//! live inside script text. Malformed JSON anywhere is dropped silently.

use crate::text;
use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Maximum characters of body text kept in a record.
pub const MAX_BODY_TEXT: usize = 2000;

/// Maximum number of meta tag pairs collected.
pub const MAX_META_TAGS: usize = 15;

/// Raw hydration text kept when it cannot be parsed as JSON.
const MAX_RAW_STATE: usize = 500;

/// Global names frameworks assign their bootstrap state to.
pub const HYDRATION_GLOBALS: &[&str] = &[
    "__INITIAL_STATE__",
    "__PRELOADED_STATE__",
    "__APOLLO_STATE__",
    "__NUXT__",
    "__DATA__",
    "__NEXT_DATA__",
];

/// Hydration state found in the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WindowState {
    Json(Value),
    /// The assignment was found but is not plain JSON (a function call, a JS literal...).
    Unparseable(String),
}

/// Normalized content of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub structured_data: Option<Vec<Value>>,
    pub window_state: Option<WindowState>,
    pub meta_tags: Option<BTreeMap<String, String>>,
    pub body_text: String,
    pub extracted_at: DateTime<Utc>,
}

/// Returned instead of a record when the input cannot be treated as markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDiagnostic {
    pub error: String,
    pub raw_length: usize,
}

/// Outcome of [`extract_content`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Extraction {
    Record(ContentRecord),
    Diagnostic(ExtractionDiagnostic),
}

impl Extraction {
    pub fn record(&self) -> Option<&ContentRecord> {
        match self {
            Extraction::Record(r) => Some(r),
            Extraction::Diagnostic(_) => None,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Extraction::Record(_))
    }
}

/// Extract a content record from raw markup.
pub fn extract_content(html: &str) -> Extraction {
    if let Some(error) = unusable_input(html) {
        return Extraction::Diagnostic(ExtractionDiagnostic {
            error,
            raw_length: html.len(),
        });
    }

    let document = Html::parse_document(html);

    let body_text = text::truncate_chars(&text::visible_text(html), MAX_BODY_TEXT);

    Extraction::Record(ContentRecord {
        title: extract_title(&document),
        meta_description: extract_meta_description(&document),
        structured_data: non_empty(extract_jsonld(&document)),
        window_state: extract_window_state(html, &document),
        meta_tags: Some(extract_meta_tags(&document)).filter(|m| !m.is_empty()),
        body_text,
        extracted_at: Utc::now(),
    })
}

fn unusable_input(html: &str) -> Option<String> {
    if html.trim().is_empty() {
        return Some("empty document".to_string());
    }
    let head = &html.as_bytes()[..html.len().min(1024)];
    if head.contains(&0u8) {
        return Some("binary content is not markup".to_string());
    }
    None
}

fn non_empty<T>(v: Vec<T>) -> Option<Vec<T>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

fn extract_title(document: &Html) -> Option<String> {
    document
        .select(&selector("title"))
        .next()
        .map(|el| text::collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty())
}

fn extract_meta_description(document: &Html) -> Option<String> {
    document
        .select(&selector("meta"))
        .find(|el| {
            el.value()
                .attr("name")
                .is_some_and(|n| n.trim().eq_ignore_ascii_case("description"))
        })
        .and_then(|el| el.value().attr("content"))
        .map(|c| c.trim().to_string())
}

fn extract_jsonld(document: &Html) -> Vec<Value> {
    document
        .select(&selector("script"))
        .filter(|el| {
            el.value()
                .attr("type")
                .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"))
        })
        .filter_map(|el| {
            let raw = el.text().collect::<String>();
            let raw = raw.trim();
            if raw.is_empty() {
                return None;
            }
            serde_json::from_str::<Value>(raw).ok()
        })
        .collect()
}

fn extract_meta_tags(document: &Html) -> BTreeMap<String, String> {
    document
        .select(&selector("meta"))
        .filter_map(|el| {
            let attrs = el.value();
            let key = attrs.attr("property").or_else(|| attrs.attr("name"))?;
            let content = attrs.attr("content")?;
            Some((key.to_string(), content.to_string()))
        })
        .take(MAX_META_TAGS)
        .collect()
}

fn window_assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let names = HYDRATION_GLOBALS.join("|");
        Regex::new(&format!(
            r"(?s)window\.(?:{names})\s*=\s*(.+?)\s*;?\s*(?:</script\s*>|;\s*window\.|\z)"
        ))
        .expect("hydration regex is valid")
    })
}

fn extract_window_state(html: &str, document: &Html) -> Option<WindowState> {
    if let Some(raw) = window_assignment_re()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
    {
        return Some(parse_state(raw));
    }

    // Next.js ships its state as a JSON script element rather than an assignment.
    document
        .select(&selector("script#__NEXT_DATA__"))
        .next()
        .map(|el| el.text().collect::<String>())
        .filter(|raw| !raw.trim().is_empty())
        .map(|raw| parse_state(raw.trim()))
}

fn parse_state(raw: &str) -> WindowState {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return WindowState::Json(value);
    }
    // The assignment may be followed by more script; keep the leading value.
    if raw.starts_with(['{', '[']) {
        if let Some(Ok(value)) = serde_json::Deserializer::from_str(raw)
            .into_iter::<Value>()
            .next()
        {
            return WindowState::Json(value);
        }
    }
    WindowState::Unparseable(text::truncate_chars(raw, MAX_RAW_STATE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>  Acme   Widgets </title>
  <META NAME="Description" content="Widgets for everyone">
  <meta property="og:title" content="Acme">
  <meta name="twitter:card" content="summary">
  <meta charset="utf-8">
  <script type="application/ld+json">{"@type": "Organization", "name": "Acme"}</script>
  <script type="application/ld+json">{ not json </script>
  <script type="application/ld+json">[{"@type": "WebSite"}]</script>
  <script>window.__INITIAL_STATE__ = {"user": null, "items": [1, 2]};</script>
</head>
<body>
  <h1>Welcome</h1>
  <script>console.log("hidden");</script>
  <p>Our   widgets
     are great.</p>
</body>
</html>"#;

    fn record(html: &str) -> ContentRecord {
        match extract_content(html) {
            Extraction::Record(r) => r,
            Extraction::Diagnostic(d) => panic!("unexpected diagnostic: {d:?}"),
        }
    }

    #[test]
    fn extracts_title_and_description() {
        let r = record(PAGE);
        assert_eq!(r.title.as_deref(), Some("Acme Widgets"));
        assert_eq!(r.meta_description.as_deref(), Some("Widgets for everyone"));
    }

    #[test]
    fn drops_invalid_jsonld_blocks() {
        let r = record(PAGE);
        let data = r.structured_data.expect("structured data present");
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["name"], "Acme");
        assert!(data[1].is_array());
    }

    #[test]
    fn parses_window_state_assignment() {
        let r = record(PAGE);
        assert_eq!(
            r.window_state,
            Some(WindowState::Json(json!({"user": null, "items": [1, 2]})))
        );
    }

    #[test]
    fn unparseable_window_state_is_kept_as_text() {
        let html = "<html><body><script>window.__NUXT__=(function(a){return {a:a}}(1));</script></body></html>";
        let r = record(html);
        match r.window_state {
            Some(WindowState::Unparseable(raw)) => assert!(raw.starts_with("(function(a)")),
            other => panic!("expected unparseable state, got {other:?}"),
        }
    }

    #[test]
    fn window_state_followed_by_other_statements_is_parsed() {
        let html = r#"<html><body><script>
            window.__INITIAL_STATE__ = {"a":1}; var analytics = true;
            </script></body></html>"#;
        let r = record(html);
        assert_eq!(r.window_state, Some(WindowState::Json(json!({"a": 1}))));

        let html = "<script>window.__PRELOADED_STATE__ = [1, 2]\ninit();</script>";
        let r = record(html);
        assert_eq!(r.window_state, Some(WindowState::Json(json!([1, 2]))));
    }

    #[test]
    fn broken_object_state_is_still_unparseable() {
        let html = r#"<script>window.__INITIAL_STATE__ = {"a": oops}; run();</script>"#;
        let r = record(html);
        assert!(matches!(r.window_state, Some(WindowState::Unparseable(_))));
    }

    #[test]
    fn next_data_script_element_is_read() {
        let html = r#"<html><body><div id="__next"></div>
            <script id="__NEXT_DATA__" type="application/json">{"page": "/", "props": {}}</script>
            </body></html>"#;
        let r = record(html);
        assert_eq!(
            r.window_state,
            Some(WindowState::Json(json!({"page": "/", "props": {}})))
        );
    }

    #[test]
    fn body_text_is_collapsed_and_script_free() {
        let r = record(PAGE);
        assert_eq!(r.body_text, "Welcome Our widgets are great.");
    }

    #[test]
    fn body_text_is_truncated() {
        let html = format!("<html><body><p>{}</p></body></html>", "a".repeat(5000));
        let r = record(&html);
        assert_eq!(r.body_text.chars().count(), MAX_BODY_TEXT);
    }

    #[test]
    fn meta_tags_prefer_property_and_skip_contentless() {
        let r = record(PAGE);
        let tags = r.meta_tags.expect("meta tags present");
        assert_eq!(tags.get("og:title").map(String::as_str), Some("Acme"));
        assert_eq!(tags.get("twitter:card").map(String::as_str), Some("summary"));
        assert!(!tags.contains_key("charset"));
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn meta_tags_are_capped() {
        let metas: String = (0..30)
            .map(|i| format!(r#"<meta name="k{i:02}" content="v{i}">"#))
            .collect();
        let html = format!("<html><head>{metas}</head><body>x</body></html>");
        let tags = record(&html).meta_tags.unwrap();
        assert_eq!(tags.len(), MAX_META_TAGS);
        assert!(tags.contains_key("k00"));
        assert!(!tags.contains_key("k15"));
    }

    #[test]
    fn empty_collections_become_none() {
        let r = record("<html><body><p>plain</p></body></html>");
        assert!(r.title.is_none());
        assert!(r.structured_data.is_none());
        assert!(r.window_state.is_none());
        assert!(r.meta_tags.is_none());
    }

    #[test]
    fn extraction_is_idempotent_apart_from_timestamp() {
        let mut a = record(PAGE);
        let mut b = record(PAGE);
        let epoch = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        a.extracted_at = epoch;
        b.extracted_at = epoch;
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn empty_and_binary_input_yield_diagnostics() {
        match extract_content("   ") {
            Extraction::Diagnostic(d) => {
                assert_eq!(d.raw_length, 3);
                assert!(d.error.contains("empty"));
            }
            other => panic!("expected diagnostic, got {other:?}"),
        }
        let binary = "%PDF-1.7\u{0}\u{0}binary";
        assert!(!extract_content(binary).is_record());
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let value = serde_json::to_value(record(PAGE)).unwrap();
        assert!(value.get("metaDescription").is_some());
        assert!(value.get("structuredData").is_some());
        assert!(value.get("windowState").is_some());
        assert!(value.get("extractedAt").is_some());
    }
}
