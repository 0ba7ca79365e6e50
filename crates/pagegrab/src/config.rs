//! Retrieval configuration: defaults, environment overrides and per-call overlay.

use crate::error::{FetchError, FetchResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default request/navigation timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default cap on a direct-fetch response body (10 MiB).
pub const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// Desktop Chrome user agent sent by every stage unless overridden.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/131.0.0.0 Safari/537.36";

const ENV_LIGHT_ENGINE_PATH: &str = "PAGEGRAB_LIGHT_ENGINE_PATH";
const ENV_USER_AGENT: &str = "PAGEGRAB_USER_AGENT";
const ENV_TIMEOUT_MS: &str = "PAGEGRAB_TIMEOUT_MS";

/// Browser viewport used by the full engine and screenshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

/// Effective configuration for one retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalConfig {
    pub timeout_ms: u64,
    pub user_agent: String,
    /// Location of the lightweight rendering engine executable.
    pub light_engine_path: Option<PathBuf>,
    pub verbose: bool,
    /// Extra direct-fetch attempts on transport errors, 5xx and 429.
    pub retries: u32,
    pub max_body_bytes: u64,
    pub viewport: Viewport,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            light_engine_path: default_light_engine_path(),
            verbose: false,
            retries: 0,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            viewport: Viewport::default(),
        }
    }
}

/// Call-site options. Every `Some` field replaces the instance default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalOptions {
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
    pub light_engine_path: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub retries: Option<u32>,
    pub max_body_bytes: Option<u64>,
    pub viewport: Option<Viewport>,
}

impl RetrievalConfig {
    /// Defaults with `PAGEGRAB_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(p) = std::env::var(ENV_LIGHT_ENGINE_PATH) {
            if !p.trim().is_empty() {
                cfg.light_engine_path = Some(PathBuf::from(p));
            }
        }
        if let Ok(ua) = std::env::var(ENV_USER_AGENT) {
            if !ua.trim().is_empty() {
                cfg.user_agent = ua;
            }
        }
        if let Some(ms) = std::env::var(ENV_TIMEOUT_MS)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            cfg.timeout_ms = ms;
        }
        cfg
    }

    /// Produce the per-call config by overlaying `options` onto `self`.
    pub fn overlay(&self, options: &RetrievalOptions) -> Self {
        Self {
            timeout_ms: options.timeout_ms.unwrap_or(self.timeout_ms),
            user_agent: options
                .user_agent
                .clone()
                .unwrap_or_else(|| self.user_agent.clone()),
            light_engine_path: options
                .light_engine_path
                .clone()
                .or_else(|| self.light_engine_path.clone()),
            verbose: options.verbose.unwrap_or(self.verbose),
            retries: options.retries.unwrap_or(self.retries),
            max_body_bytes: options.max_body_bytes.unwrap_or(self.max_body_bytes),
            viewport: options.viewport.unwrap_or(self.viewport),
        }
    }

    /// Reject configurations no stage can honour.
    pub fn validate(&self) -> FetchResult<()> {
        if self.timeout_ms == 0 {
            return Err(FetchError::InvalidConfig(
                "timeout must be a positive number of milliseconds".to_string(),
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(FetchError::InvalidConfig(
                "max body size must be positive".to_string(),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(FetchError::InvalidConfig(
                "user agent must not be empty".to_string(),
            ));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(FetchError::InvalidConfig(format!(
                "viewport {}x{} has a zero dimension",
                self.viewport.width, self.viewport.height
            )));
        }
        Ok(())
    }
}

/// `~/.pagegrab/bin/lightpanda`, where the installer drops the engine.
pub fn default_light_engine_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".pagegrab/bin/lightpanda"))
}
