// Copyright 2026 Pagegrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pagegrab: fetch readable content from any URL as cheaply as possible.
//!
//! [`PageRetriever`] runs the retrieval cascade (direct HTTP fetch, the
//! lightweight rendering engine, then headless Chromium) and reports what
//! it found as a [`RetrievalResult`]. The building blocks are public too:
//! the markup classifier ([`classify`]), [`extract_content`], the
//! [`ProcessRunner`] subprocess supervisor and the [`ScreenshotController`].

pub mod acquisition;
pub mod browser_path;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod pdf;
pub mod process;
pub mod renderer;
pub mod retriever;
pub mod screenshot;
pub mod stats;
pub mod text;

pub use classifier::{classify, ClassificationVerdict};
pub use config::{RetrievalConfig, RetrievalOptions, Viewport};
pub use error::{FetchError, FetchResult};
pub use extractor::{extract_content, ContentRecord, Extraction};
pub use pdf::{PdfDocument, PdfExtractor};
pub use process::{ProcessOutput, ProcessRunner, TerminationCause};
pub use renderer::{BrowserLauncher, RenderedPage};
pub use retriever::{
    AnswerResult, PageContent, PageRetriever, QuestionAnswerer, RetrievalMethod, RetrievalResult,
};
pub use screenshot::{Screenshot, ScreenshotController, ScreenshotOptions};
pub use stats::{StatsSnapshot, StatsTracker};
