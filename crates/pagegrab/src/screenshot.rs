//! Page screenshots through a headless browser subprocess.
//!
//! Each attempt runs the browser binary with `--screenshot=<tmp>.png` under
//! the [`ProcessRunner`] timeout, then reads the image back. The temporary
//! file is a [`tempfile::TempPath`], so it is removed whether the read
//! succeeds or not.

use crate::browser_path;
use crate::config::{Viewport, DEFAULT_USER_AGENT};
use crate::error::{FetchError, FetchResult};
use crate::process::{ProcessRunner, TerminationCause};
use base64::Engine;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Virtual time budget of a standard capture.
pub const STANDARD_BUDGET_MS: u64 = 10_000;

/// Process timeout of a standard capture when none is configured.
pub const DEFAULT_SCREENSHOT_TIMEOUT_MS: u64 = 15_000;

/// `(virtual time budget, process timeout)` per optimized attempt.
pub const OPTIMIZED_ATTEMPTS: [(u64, u64); 2] = [(5_000, 8_000), (8_000, 12_000)];

/// A captured PNG.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub bytes: Vec<u8>,
    /// Attempts it took, starting at 1.
    pub attempts: u32,
    pub elapsed: Duration,
}

impl Screenshot {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Per-call capture options.
#[derive(Debug, Clone, Default)]
pub struct ScreenshotOptions {
    /// Process timeout for a standard capture.
    pub timeout_ms: Option<u64>,
    pub viewport: Option<Viewport>,
    pub user_agent: Option<String>,
}

/// Standard and speed-optimized screenshot capture.
#[derive(Debug, Clone, Default)]
pub struct ScreenshotController {
    runner: ProcessRunner,
    browser: Option<PathBuf>,
}

impl ScreenshotController {
    pub fn new(runner: ProcessRunner) -> Self {
        Self {
            runner,
            browser: None,
        }
    }

    /// Use this executable instead of searching the install locations.
    pub fn with_browser(mut self, path: impl Into<PathBuf>) -> Self {
        self.browser = Some(path.into());
        self
    }

    fn browser(&self) -> FetchResult<PathBuf> {
        match &self.browser {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(FetchError::BrowserUnavailable(format!(
                "{} is not a file",
                path.display()
            ))),
            None => browser_path::find_browser().ok_or_else(|| {
                FetchError::BrowserUnavailable(format!(
                    "no browser found (checked {} and {} locations)",
                    browser_path::ENV_CHROME_PATH,
                    browser_path::candidates().len()
                ))
            }),
        }
    }

    /// Single attempt with the standard budget.
    pub async fn capture(
        &self,
        url: &str,
        options: &ScreenshotOptions,
    ) -> FetchResult<Screenshot> {
        let browser = self.browser()?;
        let start = Instant::now();
        let timeout = options.timeout_ms.unwrap_or(DEFAULT_SCREENSHOT_TIMEOUT_MS);

        let bytes = self
            .attempt(&browser, url, options, STANDARD_BUDGET_MS, timeout)
            .await?;

        Ok(Screenshot {
            bytes,
            attempts: 1,
            elapsed: start.elapsed(),
        })
    }

    /// Short attempt first, one longer retry, then give up quietly.
    ///
    /// `Ok(None)` means no image could be produced; only a missing browser
    /// is an error.
    pub async fn capture_optimized(
        &self,
        url: &str,
        options: &ScreenshotOptions,
    ) -> FetchResult<Option<Screenshot>> {
        let browser = self.browser()?;
        let start = Instant::now();

        for (n, (budget, timeout)) in OPTIMIZED_ATTEMPTS.iter().enumerate() {
            match self.attempt(&browser, url, options, *budget, *timeout).await {
                Ok(bytes) => {
                    return Ok(Some(Screenshot {
                        bytes,
                        attempts: n as u32 + 1,
                        elapsed: start.elapsed(),
                    }));
                }
                Err(e) => {
                    tracing::debug!("screenshot attempt {} for {url} failed: {e}", n + 1);
                }
            }
        }

        tracing::warn!("no screenshot for {url} after {} attempts", OPTIMIZED_ATTEMPTS.len());
        Ok(None)
    }

    async fn attempt(
        &self,
        browser: &Path,
        url: &str,
        options: &ScreenshotOptions,
        budget_ms: u64,
        timeout_ms: u64,
    ) -> FetchResult<Vec<u8>> {
        let output = tempfile::Builder::new()
            .prefix("pagegrab-")
            .suffix(".png")
            .tempfile()?
            .into_temp_path();

        let viewport = options.viewport.unwrap_or_default();
        let user_agent = options.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let args = capture_args(&output, url, viewport, user_agent, budget_ms);

        let timeout = Duration::from_millis(timeout_ms);
        let out = self.runner.run(browser, &args, timeout).await;

        if out.termination_cause != TerminationCause::Natural {
            return Err(FetchError::Timeout(timeout));
        }
        if out.exit_code != 0 {
            return Err(FetchError::ProcessFailed {
                code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }

        // `output` is dropped, and the file deleted, on every return below.
        let bytes = tokio::fs::read(&output).await?;
        if bytes.is_empty() {
            return Err(FetchError::browser("browser wrote an empty screenshot"));
        }
        Ok(bytes)
    }
}

fn capture_args(
    output: &Path,
    url: &str,
    viewport: Viewport,
    user_agent: &str,
    budget_ms: u64,
) -> Vec<String> {
    vec![
        "--headless".to_string(),
        "--disable-gpu".to_string(),
        "--no-sandbox".to_string(),
        "--hide-scrollbars".to_string(),
        format!("--screenshot={}", output.display()),
        format!("--window-size={},{}", viewport.width, viewport.height),
        format!("--virtual-time-budget={budget_ms}"),
        format!("--user-agent={user_agent}"),
        url.to_string(),
    ]
}
