//! Markup-to-text helpers shared by the classifier and the extractor.

use regex::Regex;
use std::sync::OnceLock;

fn script_style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<style\b[^>]*>.*?</style\s*>")
            .expect("script/style regex is valid")
    })
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex is valid"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag regex is valid"))
}

fn body_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<body\b[^>]*>(.*?)(?:</body\s*>|\z)").expect("body regex is valid"))
}

/// The inner markup of `<body>`, or the whole document when there is none.
pub fn body_region(html: &str) -> &str {
    body_re()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(html)
}

/// Strip script/style blocks and tags from `html`, collapsing whitespace.
pub fn strip_markup(html: &str) -> String {
    let without_code = script_style_re().replace_all(html, " ");
    let without_comments = comment_re().replace_all(&without_code, " ");
    let without_tags = tag_re().replace_all(&without_comments, " ");
    collapse_whitespace(&decode_basic_entities(&without_tags))
}

/// Visible text of the document body.
pub fn visible_text(html: &str) -> String {
    strip_markup(body_region(html))
}

/// Collapse every run of whitespace into one space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

fn decode_basic_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_tags() {
        let html = r#"<html><head><style>p { color: red }</style></head>
            <body><p>Hello <b>world</b></p><script>var x = "<p>hidden</p>";</script>
            <!-- comment --></body></html>"#;
        assert_eq!(visible_text(html), "Hello world");
    }

    #[test]
    fn noscript_text_is_kept() {
        let html = "<body><noscript>Enable JavaScript</noscript><p>Article</p></body>";
        assert_eq!(visible_text(html), "Enable JavaScript Article");
    }

    #[test]
    fn body_region_falls_back_to_document() {
        assert_eq!(body_region("<p>fragment</p>"), "<p>fragment</p>");
        assert_eq!(body_region("<body class='x'>inner</body>"), "inner");
    }

    #[test]
    fn unterminated_body_runs_to_end() {
        assert_eq!(visible_text("<html><body><p>cut off"), "cut off");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(strip_markup("<p>Fish &amp; Chips&nbsp;Ltd</p>"), "Fish & Chips Ltd");
    }
}
