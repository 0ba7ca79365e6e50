//! The retrieval cascade.
//!
//! `PageRetriever` tries progressively more expensive methods until one
//! produces content:
//!
//! - **PDF gate**: `.pdf` URLs go straight to the PDF extractor.
//! - **Direct fetch**: one HTTP GET. If the classifier says the markup is
//!   usable as-is, we're done. A response sniffed as PDF, however large,
//!   is handed to the PDF extractor instead.
//! - **Light engine**: the external lightweight renderer, when installed.
//! - **Full engine**: headless Chromium, launched on first use and shared
//!   by every retrieval on this instance until [`PageRetriever::close`].
//!
//! Stages run strictly one after another. Every stage failure is logged and
//! remembered; the final [`RetrievalResult`] is assembled once at the end.

use crate::acquisition::http_client::{GetOptions, HttpClient};
use crate::acquisition::light_engine::LightEngine;
use crate::classifier::{self, ClassificationVerdict};
use crate::config::{RetrievalConfig, RetrievalOptions};
use crate::error::{FetchError, FetchResult};
use crate::extractor::{extract_content, ContentRecord, Extraction};
use crate::pdf::{self, NoopPdfExtractor, PdfDocument, PdfExtractor, PdfSignal};
use crate::process::ProcessRunner;
use crate::renderer::{
    render_page, BrowserLauncher, ChromiumLauncher, PageSettings, RenderedPage, Renderer,
};
use crate::stats::{Stage, StatsSnapshot, StatsTracker};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

/// Which method produced (or last attempted) the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalMethod {
    DirectFetch,
    LightEngine,
    FullEngine,
    Pdf,
    /// Every stage ran and none succeeded.
    Failed,
    /// The request could not be attempted at all.
    Error,
}

/// Content payload of a successful retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageContent {
    Record(ContentRecord),
    Rendered(RenderedPage),
    Pdf(PdfDocument),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub total_time_ms: u64,
    pub method: RetrievalMethod,
}

/// Everything a caller learns from one retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub success: bool,
    pub method: RetrievalMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<PageContent>,
    /// Raw markup, for the stages that produce it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Byte length of `html`, or of the serialized `content` when there is no markup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Classifier indicators from the direct fetch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicators: Option<Vec<String>>,
    pub performance: Performance,
    pub stats: StatsSnapshot,
}

/// Given a URL, a question and page content, return an answer.
#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    async fn answer(&self, url: &str, question: &str, content: &str) -> anyhow::Result<String>;
}

/// Outcome of [`PageRetriever::ask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// How the page content was retrieved.
    pub method: RetrievalMethod,
}

/// What the cascade settled on, before timing and stats are attached.
#[derive(Debug)]
struct Outcome {
    success: bool,
    method: RetrievalMethod,
    content: Option<PageContent>,
    html: Option<String>,
    error: Option<String>,
}

impl Outcome {
    fn success(method: RetrievalMethod, content: PageContent, html: Option<String>) -> Self {
        Self {
            success: true,
            method,
            content: Some(content),
            html,
            error: None,
        }
    }

    fn failure(method: RetrievalMethod, error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            method,
            content: None,
            html: None,
            error: Some(error.to_string()),
        }
    }
}

/// Result of one non-terminal stage.
enum Step {
    /// The cascade ends here, successfully or not.
    Done(Outcome),
    /// Fall through to the next stage, for this reason.
    Continue(String),
}

/// Cascade controller. Cheap to share behind an `Arc`; every method takes `&self`.
pub struct PageRetriever {
    config: RetrievalConfig,
    http: HttpClient,
    runner: ProcessRunner,
    stats: Arc<StatsTracker>,
    pdf: Arc<dyn PdfExtractor>,
    answerer: Option<Arc<dyn QuestionAnswerer>>,
    launcher: Arc<dyn BrowserLauncher>,
    /// Lazily launched full engine, released by `close`.
    browser: Mutex<Option<Arc<dyn Renderer>>>,
}

impl PageRetriever {
    /// Create a retriever with `config` as the instance defaults.
    ///
    /// PDF extraction and question answering are disabled until a
    /// collaborator is plugged in; the full engine is headless Chromium.
    pub fn new(config: RetrievalConfig) -> FetchResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            http: HttpClient::new()?,
            runner: ProcessRunner::new(),
            stats: Arc::new(StatsTracker::new()),
            pdf: Arc::new(NoopPdfExtractor),
            answerer: None,
            launcher: Arc::new(ChromiumLauncher),
            browser: Mutex::new(None),
        })
    }

    pub fn with_pdf_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.pdf = extractor;
        self
    }

    pub fn with_answerer(mut self, answerer: Arc<dyn QuestionAnswerer>) -> Self {
        self.answerer = Some(answerer);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_process_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Count into an existing tracker instead of a fresh one.
    pub fn with_stats(mut self, stats: Arc<StatsTracker>) -> Self {
        self.stats = stats;
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Retrieve `url`, escalating through the cascade.
    ///
    /// Only an invalid effective configuration is returned as `Err`; every
    /// runtime failure is described by the result.
    pub async fn retrieve(
        &self,
        url: &str,
        options: &RetrievalOptions,
    ) -> FetchResult<RetrievalResult> {
        let config = self.config.overlay(options);
        config.validate()?;

        let start = Instant::now();
        let (outcome, indicators) = self.cascade(url, &config).await;

        let size = match (&outcome.html, &outcome.content) {
            (Some(html), _) => Some(html.len()),
            (None, Some(content)) => serde_json::to_string(content).ok().map(|s| s.len()),
            (None, None) => None,
        };

        let total_time_ms = start.elapsed().as_millis() as u64;
        if outcome.success {
            note(
                config.verbose,
                format_args!("{url}: {:?} in {total_time_ms}ms", outcome.method),
            );
        } else {
            tracing::warn!(
                "{url}: retrieval failed ({:?}): {}",
                outcome.method,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }

        Ok(RetrievalResult {
            success: outcome.success,
            method: outcome.method,
            content: outcome.content,
            html: outcome.html,
            size,
            error: outcome.error,
            indicators,
            performance: Performance {
                total_time_ms,
                method: outcome.method,
            },
            stats: self.stats.snapshot(),
        })
    }

    /// Retrieve `url` and ask the configured answerer about it.
    pub async fn ask(
        &self,
        url: &str,
        question: &str,
        options: &RetrievalOptions,
    ) -> FetchResult<AnswerResult> {
        let Some(answerer) = self.answerer.clone() else {
            return Ok(AnswerResult {
                success: false,
                answer: None,
                error: Some("no question answerer configured".to_string()),
                method: RetrievalMethod::Error,
            });
        };

        let retrieval = self.retrieve(url, options).await?;
        if !retrieval.success {
            return Ok(AnswerResult {
                success: false,
                answer: None,
                error: retrieval.error,
                method: retrieval.method,
            });
        }

        let content = match &retrieval.content {
            Some(content) => serde_json::to_string(content).unwrap_or_default(),
            None => retrieval.html.clone().unwrap_or_default(),
        };

        Ok(match answerer.answer(url, question, &content).await {
            Ok(answer) => AnswerResult {
                success: true,
                answer: Some(answer),
                error: None,
                method: retrieval.method,
            },
            Err(e) => AnswerResult {
                success: false,
                answer: None,
                error: Some(format!("question answering failed: {e}")),
                method: retrieval.method,
            },
        })
    }

    /// Shut the shared browser down. A later retrieval launches a new one.
    pub async fn close(&self) -> FetchResult<()> {
        let renderer = self.browser.lock().await.take();
        if let Some(renderer) = renderer {
            renderer.shutdown().await.map_err(FetchError::browser)?;
            tracing::debug!("full engine closed");
        }
        Ok(())
    }

    async fn cascade(
        &self,
        url: &str,
        config: &RetrievalConfig,
    ) -> (Outcome, Option<Vec<String>>) {
        if let Err(e) = check_url(url) {
            return (Outcome::failure(RetrievalMethod::Error, e), None);
        }

        if pdf::is_pdf_url(url) {
            note(config.verbose, format_args!("{url}: PDF by URL"));
            return (self.pdf_stage(url, PdfSignal::Url).await, None);
        }

        let (step, indicators) = self.direct_fetch(url, config).await;
        match step {
            Step::Done(outcome) => return (outcome, indicators),
            Step::Continue(reason) => {
                note(config.verbose, format_args!("{url}: escalating: {reason}"));
            }
        }

        match self.light_engine(url, config).await {
            Step::Done(outcome) => return (outcome, indicators),
            Step::Continue(e) => {
                note(config.verbose, format_args!("{url}: light engine skipped: {e}"));
            }
        }

        (self.full_engine(url, config).await, indicators)
    }

    /// Also returns the classifier indicators when the page got that far.
    async fn direct_fetch(
        &self,
        url: &str,
        config: &RetrievalConfig,
    ) -> (Step, Option<Vec<String>>) {
        self.stats.record_attempt(Stage::DirectFetch);

        let opts = GetOptions {
            user_agent: &config.user_agent,
            timeout: Duration::from_millis(config.timeout_ms),
            retries: config.retries,
            max_body_bytes: config.max_body_bytes,
        };

        let response = match self.http.get(url, &opts).await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                tracing::warn!("{url}: direct fetch timed out after {}ms", config.timeout_ms);
                return (Step::Continue(e.to_string()), None);
            }
            Err(e) => {
                tracing::warn!("{url}: direct fetch failed: {e}");
                return (Step::Continue(e.to_string()), None);
            }
        };

        // Sniffed before the size check: an oversized PDF is still a PDF.
        if let Some(signal) = pdf::sniff(response.content_type.as_deref(), &response.body) {
            note(config.verbose, format_args!("{url}: PDF by {signal:?}"));
            return (Step::Done(self.pdf_stage(url, signal).await), None);
        }

        if let Some(e) = response.size_error(config.max_body_bytes) {
            tracing::warn!("{url}: direct fetch failed: {e}");
            return (Step::Continue(e.to_string()), None);
        }

        if !response.is_success() {
            let e = FetchError::HttpStatus {
                status: response.status,
                url: response.final_url.clone(),
            };
            tracing::warn!("{url}: direct fetch failed: {e}");
            return (Step::Continue(e.to_string()), None);
        }

        let html = response.text();
        let ClassificationVerdict {
            needs_rendering,
            indicators,
            ..
        } = classifier::classify(&html, url);
        let indicators = Some(indicators).filter(|i| !i.is_empty());

        if needs_rendering {
            let reason = format!(
                "needs rendering [{}]",
                indicators.as_deref().unwrap_or_default().join(", ")
            );
            return (Step::Continue(reason), indicators);
        }

        match extract_content(&html) {
            Extraction::Record(record) => {
                self.stats.record_success(Stage::DirectFetch);
                let outcome = Outcome::success(
                    RetrievalMethod::DirectFetch,
                    PageContent::Record(record),
                    Some(html),
                );
                (Step::Done(outcome), indicators)
            }
            Extraction::Diagnostic(d) => {
                tracing::warn!("{url}: direct fetch returned unusable markup: {}", d.error);
                (Step::Continue(d.error), indicators)
            }
        }
    }

    async fn light_engine(&self, url: &str, config: &RetrievalConfig) -> Step {
        self.stats.record_attempt(Stage::LightEngine);

        let engine =
            match LightEngine::locate(config.light_engine_path.as_deref(), self.runner.clone()) {
                Ok(engine) => engine,
                Err(e) => return Step::Continue(e.to_string()),
            };
        note(
            config.verbose,
            format_args!("{url}: running {}", engine.binary().display()),
        );

        let html = match engine
            .fetch(url, Duration::from_millis(config.timeout_ms))
            .await
        {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("{url}: light engine failed: {e}");
                return Step::Continue(e.to_string());
            }
        };

        match extract_content(&html) {
            Extraction::Record(record) => {
                self.stats.record_success(Stage::LightEngine);
                Step::Done(Outcome::success(
                    RetrievalMethod::LightEngine,
                    PageContent::Record(record),
                    Some(html),
                ))
            }
            Extraction::Diagnostic(d) => Step::Continue(d.error),
        }
    }

    async fn full_engine(&self, url: &str, config: &RetrievalConfig) -> Outcome {
        self.stats.record_attempt(Stage::FullEngine);

        let renderer = match self.renderer().await {
            Ok(r) => r,
            Err(e) => {
                return Outcome::failure(RetrievalMethod::Failed, FetchError::exhausted(e));
            }
        };

        let settings = PageSettings {
            user_agent: config.user_agent.clone(),
            viewport: config.viewport,
            block_resources: true,
        };

        match render_page(renderer.as_ref(), url, &settings, config.timeout_ms).await {
            Ok(page) => {
                self.stats.record_success(Stage::FullEngine);
                Outcome::success(RetrievalMethod::FullEngine, PageContent::Rendered(page), None)
            }
            Err(e) => Outcome::failure(
                RetrievalMethod::Failed,
                FetchError::exhausted(FetchError::browser(e)),
            ),
        }
    }

    async fn pdf_stage(&self, url: &str, signal: PdfSignal) -> Outcome {
        self.stats.record_attempt(Stage::Pdf);
        match self.pdf.extract(url).await {
            Ok(doc) => {
                self.stats.record_success(Stage::Pdf);
                Outcome::success(RetrievalMethod::Pdf, PageContent::Pdf(doc), None)
            }
            Err(e) => {
                tracing::warn!("{url}: PDF extraction failed ({signal:?}): {e}");
                Outcome::failure(RetrievalMethod::Pdf, FetchError::pdf(e.to_string()))
            }
        }
    }

    /// The shared renderer, launching it on first use.
    async fn renderer(&self) -> FetchResult<Arc<dyn Renderer>> {
        let mut slot = self.browser.lock().await;
        if let Some(renderer) = slot.as_ref() {
            return Ok(Arc::clone(renderer));
        }
        let renderer = self
            .launcher
            .launch()
            .await
            .map_err(|e| FetchError::BrowserUnavailable(e.to_string()))?;
        *slot = Some(Arc::clone(&renderer));
        Ok(renderer)
    }
}

fn check_url(url: &str) -> FetchResult<()> {
    let parsed = Url::parse(url)?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(FetchError::InvalidConfig(format!(
            "unsupported URL scheme: {other}"
        ))),
    }
}

/// Stage chatter: `info` when the caller asked for verbose output.
fn note(verbose: bool, message: std::fmt::Arguments<'_>) {
    if verbose {
        tracing::info!("{message}");
    } else {
        tracing::debug!("{message}");
    }
}
