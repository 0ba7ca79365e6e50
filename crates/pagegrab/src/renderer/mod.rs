//! Renderer abstraction for the full browser engine.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over the
//! browser (Chromium via chromiumoxide), a `BrowserLauncher` that creates a
//! renderer on first use, and [`render_page`], the full-engine stage itself.

pub mod chromium;

use crate::config::Viewport;
use crate::text;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Maximum headings collected by the in-page routine.
pub const MAX_HEADINGS: usize = 20;
/// Maximum paragraphs collected.
pub const MAX_PARAGRAPHS: usize = 10;
/// Maximum links collected.
pub const MAX_LINKS: usize = 15;
/// Maximum body text characters.
pub const MAX_RENDERED_TEXT: usize = 3000;

/// Runs inside the page after navigation.
pub const EXTRACT_SCRIPT: &str = r#"(() => {
  const clean = (s) => (s || '').replace(/\s+/g, ' ').trim();
  const meta = document.querySelector('meta[name="description" i]');
  const canonical = document.querySelector('link[rel="canonical"]');
  const headings = Array.from(document.querySelectorAll('h1, h2, h3, h4, h5, h6'))
    .map((h) => clean(h.textContent))
    .filter((t) => t.length > 0)
    .slice(0, 20);
  const paragraphs = Array.from(document.querySelectorAll('p'))
    .map((p) => clean(p.textContent))
    .filter((t) => t.length > 20)
    .slice(0, 10);
  const links = Array.from(document.querySelectorAll('a[href]'))
    .map((a) => ({ text: clean(a.textContent), href: a.href }))
    .filter((l) => l.text.length > 0)
    .slice(0, 15);
  const structuredData = [];
  document.querySelectorAll('script[type="application/ld+json"]').forEach((s) => {
    try { structuredData.push(JSON.parse(s.textContent)); } catch (e) {}
  });
  const body = document.body ? clean(document.body.innerText || document.body.textContent) : '';
  return {
    title: clean(document.title) || null,
    metaDescription: meta ? meta.getAttribute('content') : null,
    canonical: canonical ? canonical.href : null,
    headings,
    paragraphs,
    links,
    structuredData,
    bodyText: body.slice(0, 3000),
  };
})()"#;

/// A link as seen by the rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLink {
    pub text: String,
    pub href: String,
}

/// Content collected from a fully rendered page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderedPage {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub canonical: Option<String>,
    pub headings: Vec<String>,
    pub paragraphs: Vec<String>,
    pub links: Vec<PageLink>,
    pub structured_data: Vec<Value>,
    pub body_text: String,
}

impl RenderedPage {
    /// Parse the extraction script's return value, enforcing the collection
    /// limits even if the page tampered with the script's output.
    pub fn from_value(value: Value) -> Result<Self> {
        let mut page: RenderedPage =
            serde_json::from_value(value).context("unexpected extraction result shape")?;
        page.headings.truncate(MAX_HEADINGS);
        page.paragraphs.truncate(MAX_PARAGRAPHS);
        page.links.truncate(MAX_LINKS);
        page.body_text = text::truncate_chars(&page.body_text, MAX_RENDERED_TEXT);
        Ok(page)
    }
}

/// Per-page emulation settings.
#[derive(Debug, Clone)]
pub struct PageSettings {
    pub user_agent: String,
    pub viewport: Viewport,
    /// Fail requests for images, stylesheets, fonts and media.
    pub block_resources: bool,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Apply user agent, viewport and request blocking before navigation.
    async fn configure(&mut self, settings: &PageSettings) -> Result<()>;
    /// Navigate to a URL and wait for it to settle, within `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<()>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<Value>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Creates the shared renderer the first time the full engine is needed.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Renderer>>;
}

/// Launches headless Chromium.
#[derive(Debug, Default, Clone)]
pub struct ChromiumLauncher;

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        let renderer = chromium::ChromiumRenderer::new().await?;
        Ok(Arc::new(renderer))
    }
}

/// Launcher for HTTP-only operation: the full engine always fails.
#[derive(Debug, Default, Clone)]
pub struct NoopLauncher;

#[async_trait]
impl BrowserLauncher for NoopLauncher {
    async fn launch(&self) -> Result<Arc<dyn Renderer>> {
        Ok(Arc::new(NoopRenderer))
    }
}

/// A no-op renderer used when Chromium is unavailable.
///
/// The direct fetch and the light engine work without a browser; this stub
/// makes the full-engine stage fail while everything else still functions.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("Browser not available (HTTP-only mode)"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}

/// Open a tab, configure it, load `url` and run the extraction routine.
///
/// The tab is closed on every path.
pub async fn render_page(
    renderer: &dyn Renderer,
    url: &str,
    settings: &PageSettings,
    timeout_ms: u64,
) -> Result<RenderedPage> {
    let mut ctx = renderer.new_context().await?;

    let result = async {
        ctx.configure(settings).await?;
        ctx.navigate(url, timeout_ms).await?;
        let value = ctx.execute_js(EXTRACT_SCRIPT).await?;
        RenderedPage::from_value(value)
    }
    .await;

    if let Err(e) = ctx.close().await {
        tracing::debug!("closing tab for {url} failed: {e}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedRenderer {
        value: Value,
        fail_navigation: bool,
        open: Arc<AtomicUsize>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    struct ScriptedContext {
        value: Value,
        fail_navigation: bool,
        open: Arc<AtomicUsize>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedRenderer {
        fn new(value: Value, fail_navigation: bool) -> Self {
            Self {
                value,
                fail_navigation,
                open: Arc::new(AtomicUsize::new(0)),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Renderer for ScriptedRenderer {
        async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
            self.open.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedContext {
                value: self.value.clone(),
                fail_navigation: self.fail_navigation,
                open: Arc::clone(&self.open),
                calls: Arc::clone(&self.calls),
            }))
        }
        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
        fn active_contexts(&self) -> usize {
            self.open.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RenderContext for ScriptedContext {
        async fn configure(&mut self, settings: &PageSettings) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("configure:{}", settings.user_agent));
            Ok(())
        }
        async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<()> {
            self.calls.lock().unwrap().push(format!("navigate:{url}"));
            if self.fail_navigation {
                anyhow::bail!("navigation timed out");
            }
            Ok(())
        }
        async fn execute_js(&self, _script: &str) -> Result<Value> {
            self.calls.lock().unwrap().push("execute".to_string());
            Ok(self.value.clone())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            self.open.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn settings() -> PageSettings {
        PageSettings {
            user_agent: "ua/1".to_string(),
            viewport: Viewport::default(),
            block_resources: true,
        }
    }

    #[tokio::test]
    async fn renders_and_closes_tab() {
        let renderer = ScriptedRenderer::new(
            json!({
                "title": "Hello",
                "metaDescription": null,
                "canonical": "https://example.com/",
                "headings": ["Hello"],
                "paragraphs": [],
                "links": [{"text": "More", "href": "https://example.com/more"}],
                "structuredData": [],
                "bodyText": "Hello world"
            }),
            false,
        );
        let page = render_page(&renderer, "https://example.com", &settings(), 1000)
            .await
            .unwrap();
        assert_eq!(page.title.as_deref(), Some("Hello"));
        assert_eq!(page.links.len(), 1);
        assert_eq!(renderer.active_contexts(), 0);
        assert_eq!(
            *renderer.calls.lock().unwrap(),
            vec!["configure:ua/1", "navigate:https://example.com", "execute"]
        );
    }

    #[tokio::test]
    async fn navigation_failure_still_closes_tab() {
        let renderer = ScriptedRenderer::new(json!({}), true);
        let err = render_page(&renderer, "https://example.com", &settings(), 1000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[test]
    fn limits_are_enforced_on_parsed_result() {
        let headings: Vec<String> = (0..40).map(|i| format!("h{i}")).collect();
        let page = RenderedPage::from_value(json!({
            "headings": headings,
            "bodyText": "x".repeat(5000),
        }))
        .unwrap();
        assert_eq!(page.headings.len(), MAX_HEADINGS);
        assert_eq!(page.body_text.chars().count(), MAX_RENDERED_TEXT);
        assert!(page.links.is_empty());
    }

    #[test]
    fn non_object_result_is_an_error() {
        assert!(RenderedPage::from_value(json!("nope")).is_err());
    }

    #[tokio::test]
    async fn noop_renderer_refuses_contexts() {
        let renderer = NoopLauncher.launch().await.unwrap();
        let err = render_page(renderer.as_ref(), "https://example.com", &settings(), 1000)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not available"));
    }
}
