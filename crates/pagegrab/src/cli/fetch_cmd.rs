//! `pagegrab fetch <url>`: run the cascade and print the result as JSON.

use anyhow::{bail, Result};
use pagegrab::renderer::NoopLauncher;
use pagegrab::{PageRetriever, RetrievalConfig, RetrievalOptions};
use std::sync::Arc;

/// Run the fetch command.
pub async fn run(url: &str, options: RetrievalOptions, no_browser: bool) -> Result<()> {
    let mut retriever = PageRetriever::new(RetrievalConfig::from_env())?;
    if no_browser {
        retriever = retriever.with_launcher(Arc::new(NoopLauncher));
    }

    let result = retriever.retrieve(url, &options).await;
    if let Err(e) = retriever.close().await {
        tracing::warn!("browser shutdown failed: {e}");
    }
    let result = result?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        bail!(
            "{:?}: {}",
            result.method,
            result.error.as_deref().unwrap_or("retrieval failed")
        );
    }
    Ok(())
}
