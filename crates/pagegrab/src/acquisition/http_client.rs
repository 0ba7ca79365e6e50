//! Async HTTP client wrapping reqwest.
//!
//! Not a browser, just one GET with browser-like headers. Handles redirects,
//! per-request timeouts, a body size cap, optional retry on 5xx/transport
//! errors with exponential backoff, and backoff on 429.
//!
//! A body over the cap is not an error here. The response still comes back
//! with its status and headers, a body cut at the cap, and
//! [`HttpResponse::oversized`] set, so callers can tell a large PDF from a
//! large HTML page.

use crate::error::{FetchError, FetchResult};
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::time::Duration;

/// Response from an HTTP GET request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header.
    pub content_type: Option<String>,
    /// Response body, undecoded. At most the configured cap.
    pub body: Vec<u8>,
    /// Declared or observed body size when it exceeded the cap.
    pub oversized: Option<u64>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// [`FetchError::TooLarge`] when the body was cut at `limit`.
    pub fn size_error(&self, limit: u64) -> Option<FetchError> {
        self.oversized.map(|size| FetchError::TooLarge { size, limit })
    }
}

/// Per-request knobs for [`HttpClient::get`].
#[derive(Debug, Clone)]
pub struct GetOptions<'a> {
    pub user_agent: &'a str,
    pub timeout: Duration,
    pub retries: u32,
    pub max_body_bytes: u64,
}

/// Direct-fetch transport.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for sites that reject HTTP/2.
    h1_client: reqwest::Client,
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

impl HttpClient {
    /// Build the client pair with browser-like default headers.
    pub fn new() -> FetchResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .default_headers(browser_headers())
            .build()?;

        let h1_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(5))
            .default_headers(browser_headers())
            .http1_only()
            .build()?;

        Ok(Self { client, h1_client })
    }

    /// Perform a GET with retry on 5xx and backoff on 429.
    ///
    /// Falls back to HTTP/1.1 on protocol errors (some CDNs reject HTTP/2).
    /// Non-2xx responses are returned, not turned into errors; callers decide.
    pub async fn get(&self, url: &str, opts: &GetOptions<'_>) -> FetchResult<HttpResponse> {
        match self.get_inner(&self.client, url, opts).await {
            Ok(resp) => Ok(resp),
            Err(FetchError::Network(e)) if looks_like_protocol_error(&e) => {
                tracing::debug!("retrying {url} over HTTP/1.1 after: {e}");
                self.get_inner(&self.h1_client, url, opts).await
            }
            Err(e) => Err(e),
        }
    }

    async fn get_inner(
        &self,
        client: &reqwest::Client,
        url: &str,
        opts: &GetOptions<'_>,
    ) -> FetchResult<HttpResponse> {
        let mut retries = 0u32;

        loop {
            let resp = client
                .get(url)
                .header(header::USER_AGENT, opts.user_agent)
                .timeout(opts.timeout)
                .send()
                .await;

            match resp {
                Ok(r) => {
                    let status = r.status().as_u16();

                    // Retry on 5xx
                    if status >= 500 && retries < opts.retries {
                        retries += 1;
                        tokio::time::sleep(backoff(retries)).await;
                        continue;
                    }

                    // Backoff on 429
                    if status == 429 && retries < opts.retries {
                        retries += 1;
                        let retry_after = r
                            .headers()
                            .get(header::RETRY_AFTER)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(2);
                        tokio::time::sleep(Duration::from_secs(retry_after.min(10))).await;
                        continue;
                    }

                    return read_response(url, r, opts.max_body_bytes).await;
                }
                Err(e) => {
                    if retries < opts.retries && !e.is_builder() {
                        retries += 1;
                        tokio::time::sleep(backoff(retries)).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * 2u64.pow(attempt.saturating_sub(1)))
}

fn looks_like_protocol_error(e: &reqwest::Error) -> bool {
    let msg = format!("{e:?}").to_ascii_lowercase();
    msg.contains("http2") || msg.contains("protocol") || msg.contains("connection closed")
}

async fn read_response(
    url: &str,
    mut r: reqwest::Response,
    max_body_bytes: u64,
) -> FetchResult<HttpResponse> {
    let status = r.status().as_u16();
    let final_url = r.url().to_string();
    let content_type = r
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let limit = usize::try_from(max_body_bytes).unwrap_or(usize::MAX);
    let declared = r.content_length().filter(|&n| n > max_body_bytes);
    let mut oversized = declared;

    let mut body = Vec::new();
    while let Some(chunk) = r.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > limit {
            oversized = Some(declared.unwrap_or(body.len() as u64));
            body.truncate(limit);
            break;
        }
        // A declared overflow only needs the leading bytes for sniffing.
        if declared.is_some() {
            break;
        }
    }

    if let Some(size) = oversized {
        tracing::debug!("{url}: body of {size} bytes cut at {max_body_bytes}");
    }

    Ok(HttpResponse {
        url: url.to_string(),
        final_url,
        status,
        content_type,
        body,
        oversized,
    })
}
