//! `pagegrab screenshot <url> --out <file>`.

use anyhow::{bail, Context, Result};
use pagegrab::{ProcessRunner, ScreenshotController, ScreenshotOptions};
use std::path::Path;

/// Run the screenshot command.
pub async fn run(url: &str, out: &Path, fast: bool, timeout_ms: Option<u64>) -> Result<()> {
    let controller = ScreenshotController::new(ProcessRunner::new());
    let options = ScreenshotOptions {
        timeout_ms,
        ..ScreenshotOptions::default()
    };

    let shot = if fast {
        match controller.capture_optimized(url, &options).await? {
            Some(shot) => shot,
            None => bail!("no screenshot could be captured for {url}"),
        }
    } else {
        controller.capture(url, &options).await?
    };

    std::fs::write(out, &shot.bytes)
        .with_context(|| format!("failed to write {}", out.display()))?;

    eprintln!(
        "  Saved {} ({} bytes, {} attempt(s), {:.1}s)",
        out.display(),
        shot.bytes.len(),
        shot.attempts,
        shot.elapsed.as_secs_f64()
    );
    Ok(())
}
