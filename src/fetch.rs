//!
//! src/fetch.rs  Oct 19th, 2026
//!
//! Defines shared http client construction and the retry helper used for
//! idempotent requests against the backends
//!

use std::time::Duration;

use rand::{rngs::SmallRng, Rng, SeedableRng};
use reqwest::{Client, header, redirect};
use tokio::time::sleep;
use tracing::warn;

use crate::config::{HttpConfig, RetryConfig};
use crate::errors::UploaderError;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
}

fn client_with_headers(http: &HttpConfig, headers: header::HeaderMap) ->
    Result<Client, UploaderError> {
    client_helper(http)
        .default_headers(headers)
        .build()
        .map_err(|e| UploaderError::Http(format!("build client: {e}")))
}

/// Client for endpoints answering in json
pub fn base_client(http: &HttpConfig) -> Result<Client, UploaderError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_with_headers(http, h)
}

/// Client for the pinning backend, api key sent on every request
pub fn pin_client(http: &HttpConfig, api_key: &str) -> Result<Client, UploaderError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

    let mut key = header::HeaderValue::from_str(api_key)
        .map_err(|e| UploaderError::Config(format!("invalid pin api key {e}")))?;
    key.set_sensitive(true);
    h.insert("x-api-key", key);
    client_with_headers(http, h)
}

/// Client for gateways: no default accept header, audio and json both served
pub fn gateway_client(http: &HttpConfig) -> Result<Client, UploaderError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    client_with_headers(http, h)
}

/// Simple function to generate random wait for http_with_retry
fn generate_backoff(ms: u64, attempt: usize, rng: &mut SmallRng) -> Duration {
    let exp = (1_u64 << attempt.min(6)) * ms;
    let jitter = rng.gen_range(50..=200) as u64;
    Duration::from_millis(exp + jitter)
}

/// Maps a non-2xx status to the error taxonomy the pin client promises
pub fn status_error(status: reqwest::StatusCode, body: String) -> UploaderError {
    match status.as_u16() {
        401 | 403 => UploaderError::Auth(format!("{status}: {body}")),
        404 => UploaderError::NotFound(body),
        code => UploaderError::Backend { status: code, body },
    }
}

/// Client-level timeouts come back from reqwest without the deadline; fill
/// in the one the client was built with
pub fn with_deadline(e: UploaderError, deadline: Duration) -> UploaderError {
    match e {
        UploaderError::Timeout { after_ms: 0 } => UploaderError::Timeout {
            after_ms: deadline.as_millis() as u64,
        },
        other => other,
    }
}

/// Sends a cloneable request, retrying 429/5xx and transport errors with
/// jittered exponential backoff. Only for idempotent requests.
pub async fn http_with_retry(
    request: reqwest::RequestBuilder,
    retry: &RetryConfig,
) -> Result<serde_json::Value, UploaderError> {
    let mut rng = SmallRng::from_entropy();
    let max_retries = retry.max_attempts as usize;
    let backoff_ms = retry.base_backoff.as_millis() as u64;
    let mut attempt = 0_usize;
    loop {
        let response = request.try_clone()
            .ok_or_else(|| UploaderError::Http("non-cloneable request".to_string()))?
            .send()
            .await;
        match response {
            Ok(resp) => {
                if resp.status().is_success() {
                    let v = resp.json::<serde_json::Value>().await?;
                    return Ok(v);
                }
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                let retryable = status.as_u16() == 429 || status.is_server_error();
                if !retryable || attempt >= max_retries {
                    return Err(status_error(status, body));
                }
                let backoff = generate_backoff(backoff_ms, attempt, &mut rng);
                warn!(status = %status, backoff = ?backoff.as_millis(), "http.retry");
                sleep(backoff).await;
                attempt += 1;
            },
            Err(e) => {
                if attempt >= max_retries {
                    return Err(e.into());
                }
                let backoff = generate_backoff(backoff_ms, attempt, &mut rng);
                warn!(error = %e, backoff = ?backoff.as_millis(), "http.retry.error");
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
