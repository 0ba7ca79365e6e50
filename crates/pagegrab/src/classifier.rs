//! Decide whether a fetched page needs JavaScript rendering.
//!
//! The decision is an ordered list of named rules. Each rule inspects the URL
//! or the raw markup and, when it fires, contributes an indicator tag such as
//! `spa:empty-root` or `antibot:cloudflare-challenge`. Precedence:
//!
//! 1. an allowlisted host never needs rendering, whatever the markup says;
//! 2. anti-bot markers or an interactive-platform URL always need rendering;
//! 3. SPA markers need rendering only when the visible text is thin.
//!
//! Thin text alone is not enough: plenty of static pages are short.

use crate::text;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use url::Url;

/// Visible text below this many characters counts as "thin".
pub const MIN_TEXT_LENGTH: usize = 200;

/// Hosts known to serve complete static HTML.
const SIMPLE_SITES: &[&str] = &[
    "wikipedia.org",
    "wikimedia.org",
    "wiktionary.org",
    "docs.rs",
    "crates.io",
    "rust-lang.org",
    "python.org",
    "readthedocs.io",
    "readthedocs.org",
    "developer.mozilla.org",
    "stackoverflow.com",
    "stackexchange.com",
    "github.io",
    "gitlab.io",
    "netlify.app",
    "pages.dev",
    "arxiv.org",
    "w3.org",
    "ietf.org",
    "gnu.org",
    "kernel.org",
    "archive.org",
    "news.ycombinator.com",
    "go.dev",
    "nodejs.org",
];

/// URL fragments of platforms that are unusable without a browser.
const INTERACTIVE_PLATFORMS: &[&str] = &[
    "twitter.com",
    "x.com",
    "facebook.com",
    "instagram.com",
    "linkedin.com",
    "tiktok.com",
    "youtube.com",
    "pinterest.com",
    "threads.net",
    "discord.com",
    "maps.google.",
    "google.com/maps",
    "bing.com/maps",
    "mail.google.com",
    "outlook.live.com",
    "outlook.office.com",
    "mail.yahoo.com",
];

/// Which family an indicator belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    SinglePageApp,
    AntiBot,
}

/// A named predicate over raw markup.
pub struct MarkupRule {
    pub name: &'static str,
    pub kind: RuleKind,
    pattern: &'static str,
}

impl MarkupRule {
    const fn new(name: &'static str, kind: RuleKind, pattern: &'static str) -> Self {
        Self {
            name,
            kind,
            pattern,
        }
    }

    pub fn tag(&self) -> String {
        match self.kind {
            RuleKind::SinglePageApp => format!("spa:{}", self.name),
            RuleKind::AntiBot => format!("antibot:{}", self.name),
        }
    }
}

/// Markup rules in evaluation order.
pub static MARKUP_RULES: &[MarkupRule] = &[
    MarkupRule::new(
        "empty-root",
        RuleKind::SinglePageApp,
        r#"(?i)<div[^>]*\bid\s*=\s*["']root["'][^>]*>\s*</div>"#,
    ),
    MarkupRule::new(
        "empty-app",
        RuleKind::SinglePageApp,
        r#"(?i)<div[^>]*\bid\s*=\s*["'](?:app|__next|__nuxt|main-app)["'][^>]*>\s*</div>"#,
    ),
    MarkupRule::new("next-data", RuleKind::SinglePageApp, r"__NEXT_DATA__"),
    MarkupRule::new("nuxt-state", RuleKind::SinglePageApp, r"window\.__NUXT__"),
    MarkupRule::new(
        "hydration-state",
        RuleKind::SinglePageApp,
        r"window\.__(?:INITIAL_STATE|PRELOADED_STATE|APOLLO_STATE|DATA)__",
    ),
    MarkupRule::new(
        "react-root",
        RuleKind::SinglePageApp,
        r"(?i)data-reactroot|_reactRootContainer",
    ),
    MarkupRule::new(
        "angular",
        RuleKind::SinglePageApp,
        r#"(?i)\bng-version\s*=|<app-root[\s>]"#,
    ),
    MarkupRule::new(
        "webpack-runtime",
        RuleKind::SinglePageApp,
        r"webpackJsonp|__webpack_require__|webpackChunk",
    ),
    MarkupRule::new(
        "vite-client",
        RuleKind::SinglePageApp,
        r#"/@vite/client|<script[^>]+type=["']module["'][^>]+/assets/index-[\w-]+\.js"#,
    ),
    // Interstitial pages only. Cloudflare also injects
    // `/cdn-cgi/challenge-platform/scripts/jsd/main.js` into ordinary pages.
    MarkupRule::new(
        "cloudflare-challenge",
        RuleKind::AntiBot,
        r"(?i)cf-browser-verification|cf_chl_opt|<title>\s*Just a moment\.\.\.",
    ),
    MarkupRule::new(
        "checking-browser",
        RuleKind::AntiBot,
        r"(?i)checking your browser|verify(?:ing)? you are (?:a )?human|ddos protection by",
    ),
    // Block pages, not the sensor scripts the same vendors load everywhere.
    MarkupRule::new(
        "bot-wall",
        RuleKind::AntiBot,
        r#"(?i)\bid\s*=\s*["']px-captcha["']|distil_r_captcha|Request unsuccessful\. Incapsula incident ID"#,
    ),
    MarkupRule::new(
        "enable-javascript",
        RuleKind::AntiBot,
        r"(?i)(?:please\s+)?enable\s+javascript\s+(?:to|and|in)|javascript\s+is\s+(?:required|disabled)|you\s+need\s+to\s+enable\s+javascript",
    ),
];

fn compiled_rules() -> &'static [(Regex, &'static MarkupRule)] {
    static RULES: OnceLock<Vec<(Regex, &'static MarkupRule)>> = OnceLock::new();
    RULES.get_or_init(|| {
        MARKUP_RULES
            .iter()
            .map(|rule| {
                (
                    Regex::new(rule.pattern).expect("classifier rule regex is valid"),
                    rule,
                )
            })
            .collect()
    })
}

/// Outcome of classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationVerdict {
    pub needs_rendering: bool,
    /// Every rule that fired, in evaluation order.
    pub indicators: Vec<String>,
    /// Length in characters of the visible body text.
    pub text_length: usize,
}

/// Allowlist entry matching the URL's host, if any.
pub fn allowlisted_site(url: &str) -> Option<&'static str> {
    let host = host_of(url)?;
    SIMPLE_SITES.iter().copied().find(|site| host_matches(&host, site))
}

/// Interactive platform matching the URL, if any.
pub fn interactive_platform(url: &str) -> Option<&'static str> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host_and_path = format!("{}{}", host, parsed.path().to_ascii_lowercase());
    INTERACTIVE_PLATFORMS.iter().copied().find(|platform| {
        if platform.contains('/') || platform.ends_with('.') {
            host_and_path.contains(platform) || host_and_path.contains(&format!(".{platform}"))
        } else {
            host_matches(&host, platform)
        }
    })
}

/// Markup rules that fire on `html`.
pub fn markup_indicators(html: &str) -> Vec<&'static MarkupRule> {
    compiled_rules()
        .iter()
        .filter(|(re, _)| re.is_match(html))
        .map(|(_, rule)| *rule)
        .collect()
}

/// Classify `html` fetched from `url`.
pub fn classify(html: &str, url: &str) -> ClassificationVerdict {
    let text_length = text::visible_text(html).chars().count();

    if let Some(site) = allowlisted_site(url) {
        return ClassificationVerdict {
            needs_rendering: false,
            indicators: vec![format!("allowlist:{site}")],
            text_length,
        };
    }

    let fired = markup_indicators(html);
    let has_spa = fired.iter().any(|r| r.kind == RuleKind::SinglePageApp);
    let has_antibot = fired.iter().any(|r| r.kind == RuleKind::AntiBot);
    let platform = interactive_platform(url);
    let thin = text_length < MIN_TEXT_LENGTH;

    let mut indicators: Vec<String> = fired.iter().map(|r| r.tag()).collect();
    if let Some(p) = platform {
        indicators.push(format!("platform:{p}"));
    }
    if thin {
        indicators.push("low-text".to_string());
    }

    let needs_rendering = has_antibot || platform.is_some() || (thin && has_spa);

    ClassificationVerdict {
        needs_rendering,
        indicators,
        text_length,
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
}

/// `site` equals the host or is a dot-separated suffix of it.
fn host_matches(host: &str, site: &str) -> bool {
    host == site || host.ends_with(&format!(".{site}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_text() -> String {
        "Static documentation paragraph with plenty of words. ".repeat(6)
    }

    #[test]
    fn allowlist_overrides_every_signal() {
        let html = r#"<html><body><div id="root"></div>
            <script>window.__NEXT_DATA__ = {}</script>Just a moment...</body></html>"#;
        let verdict = classify(html, "https://en.wikipedia.org/wiki/Rust");
        assert!(!verdict.needs_rendering);
        assert_eq!(verdict.indicators, vec!["allowlist:wikipedia.org"]);
    }

    #[test]
    fn empty_root_with_thin_text_needs_rendering() {
        let html = r#"<html><body><div id="root"></div><p>Loading</p></body></html>"#;
        let verdict = classify(html, "https://shop.example.net/");
        assert!(verdict.needs_rendering);
        assert!(verdict.indicators.contains(&"spa:empty-root".to_string()));
        assert!(verdict.indicators.contains(&"low-text".to_string()));
    }

    #[test]
    fn empty_root_with_enough_text_is_static() {
        let html = format!(
            r#"<html><body><div id="root"></div><p>{}</p></body></html>"#,
            long_text()
        );
        let verdict = classify(&html, "https://shop.example.net/");
        assert!(verdict.text_length >= MIN_TEXT_LENGTH);
        assert!(!verdict.needs_rendering);
        assert!(verdict.indicators.contains(&"spa:empty-root".to_string()));
    }

    #[test]
    fn thin_text_alone_does_not_force_rendering() {
        let html = "<html><head><title>Example Domain</title></head>\
                    <body><h1>Example Domain</h1><p>For use in examples.</p></body></html>";
        let verdict = classify(html, "https://example.com");
        assert!(!verdict.needs_rendering);
        assert_eq!(verdict.indicators, vec!["low-text"]);
    }

    #[test]
    fn antibot_markers_force_rendering_even_with_text() {
        let html = format!(
            "<html><body><p>{}</p><p>Checking your browser before accessing.</p></body></html>",
            long_text()
        );
        let verdict = classify(&html, "https://news.example.org/article");
        assert!(verdict.needs_rendering);
        assert!(verdict
            .indicators
            .contains(&"antibot:checking-browser".to_string()));
    }

    #[test]
    fn vendor_sensor_scripts_on_ordinary_pages_stay_static() {
        let sensors = [
            r#"<script src="/cdn-cgi/challenge-platform/scripts/jsd/main.js"></script>"#,
            r#"<script src="https://client.perimeterx.net/PXabc123/main.min.js"></script>"#,
            r#"<script src="/_Incapsula_Resource?SWJIYLWA=719d34d31c8e3a6e6fffd425f7e032f3"></script>"#,
            r#"<script>window._pxAppId = "PXabc123";</script>"#,
        ];
        for sensor in sensors {
            let html = format!(
                "<html><head><title>Article</title>{sensor}</head>\
                 <body><article><p>{}</p></article></body></html>",
                long_text()
            );
            let verdict = classify(&html, "https://news.example.org/article");
            assert!(!verdict.needs_rendering, "escalated on {sensor}");
            assert!(
                !verdict.indicators.iter().any(|i| i.starts_with("antibot:")),
                "antibot indicator for {sensor}: {:?}",
                verdict.indicators
            );
        }
    }

    #[test]
    fn interstitial_pages_are_antibot() {
        let pages = [
            (
                "cloudflare-challenge",
                "<html><head><title>Just a moment...</title></head><body></body></html>",
            ),
            ("cloudflare-challenge", "<script>window._cf_chl_opt = {cvId: '3'};</script>"),
            ("bot-wall", r#"<body><div id="px-captcha"></div></body>"#),
            (
                "bot-wall",
                "<body>Request unsuccessful. Incapsula incident ID: 1234-5678</body>",
            ),
        ];
        for (name, html) in pages {
            let fired = markup_indicators(html);
            assert!(fired.iter().any(|r| r.name == name), "{name} did not fire on {html:?}");
        }
    }

    #[test]
    fn enable_javascript_prompt_is_antibot() {
        let html = "<noscript>Please enable JavaScript to continue.</noscript>";
        let fired = markup_indicators(html);
        assert!(fired.iter().any(|r| r.name == "enable-javascript"));
    }

    #[test]
    fn interactive_platforms_force_rendering() {
        let html = format!("<html><body><p>{}</p></body></html>", long_text());
        for url in [
            "https://twitter.com/rustlang",
            "https://www.instagram.com/p/abc",
            "https://www.google.com/maps/place/Paris",
            "https://mail.google.com/mail/u/0",
        ] {
            let verdict = classify(&html, url);
            assert!(verdict.needs_rendering, "expected rendering for {url}");
            assert!(verdict.indicators.iter().any(|i| i.starts_with("platform:")));
        }
    }

    #[test]
    fn platform_match_is_not_a_loose_substring() {
        assert_eq!(interactive_platform("https://box.com/files"), None);
        assert_eq!(interactive_platform("https://x.com/home"), Some("x.com"));
        assert_eq!(interactive_platform("https://www.youtube.com/watch?v=1"), Some("youtube.com"));
    }

    #[test]
    fn next_data_marker_is_detected() {
        let html = r#"<script id="__NEXT_DATA__" type="application/json">{"props":{}}</script>"#;
        let verdict = classify(html, "https://app.example.io/");
        assert!(verdict.needs_rendering);
        assert!(verdict.indicators.contains(&"spa:next-data".to_string()));
    }

    #[test]
    fn each_rule_compiles_and_fires_on_its_sample() {
        let samples = [
            ("empty-root", r#"<div id="root"> </div>"#),
            ("empty-app", r#"<div class="x" id="app"></div>"#),
            ("next-data", "self.__NEXT_DATA__"),
            ("nuxt-state", "window.__NUXT__=(function(){})"),
            ("hydration-state", "window.__APOLLO_STATE__ = {}"),
            ("react-root", r#"<div data-reactroot="">"#),
            ("angular", r#"<app-root ng-version="17.0.0"></app-root>"#),
            ("webpack-runtime", "(self.webpackChunk_N_E = self.webpackChunk_N_E || [])"),
            ("vite-client", r#"<script type="module" src="/@vite/client"></script>"#),
            ("cloudflare-challenge", "<title>Just a moment...</title>"),
            ("checking-browser", "Verifying you are human. This may take a few seconds."),
            ("bot-wall", r#"<div id="px-captcha"></div>"#),
            ("enable-javascript", "You need to enable JavaScript to run this app."),
        ];
        assert_eq!(samples.len(), MARKUP_RULES.len());
        for (name, sample) in samples {
            let fired = markup_indicators(sample);
            assert!(
                fired.iter().any(|r| r.name == name),
                "rule {name} did not fire on {sample:?}"
            );
        }
    }

    #[test]
    fn allowlist_matches_subdomains_only_on_dot_boundary() {
        assert_eq!(allowlisted_site("https://docs.rs/serde"), Some("docs.rs"));
        assert_eq!(allowlisted_site("https://user.github.io/blog"), Some("github.io"));
        assert_eq!(allowlisted_site("https://notwikipedia.org/"), None);
        assert_eq!(allowlisted_site("not a url"), None);
    }
}
