//!
//! src/pin.rs  Oct 19th, 2026
//!
//! Client for the pinning backend: store bytes and get a content id back,
//! list what the api key has pinned, fetch pinned json through gateways
//!

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, multipart};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{HttpConfig, PinConfig, RetryConfig, STORE_MIN_TIMEOUT, STORE_TIMEOUT_PER_MB};
use crate::errors::UploaderError;
use crate::fetch;
use crate::gateway::GatewayResolver;
use crate::types::{Cid, PinRecord};

/// Deadline for storing `len` bytes: 2 minutes floor, 1 minute per MiB
pub fn store_timeout(len: u64) -> Duration {
    scaled_timeout(len, STORE_MIN_TIMEOUT)
}

fn scaled_timeout(len: u64, floor_ms: u64) -> Duration {
    let mb = len as f64 / (1024.0 * 1024.0);
    let scaled = (mb * STORE_TIMEOUT_PER_MB as f64).ceil() as u64;
    Duration::from_millis(scaled.max(floor_ms))
}

#[async_trait]
pub trait PinStore: Send + Sync {
    /// Stores `bytes` under `key`. Not resumable; a failed store is retried
    /// in full by the caller.
    async fn store(&self, bytes: Vec<u8>, content_type: &str, key: &str)
        -> Result<Cid, UploaderError>;

    /// Pins visible to the api key. Records are backend-native and may not
    /// be music metadata; callers filter.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<PinRecord>, UploaderError>;

    /// Fetches and parses the json object stored under `cid`
    async fn resolve(&self, cid: &Cid) -> Result<Value, UploaderError>;
}

#[derive(Debug, Deserialize)]
struct StoreResponse {
    pin: Option<StorePin>,
}

#[derive(Debug, Deserialize)]
struct StorePin {
    cid: Option<String>,
}

pub fn parse_store_response(body: &Value) -> Result<Cid, UploaderError> {
    let parsed: StoreResponse = serde_json::from_value(body.clone())?;
    let cid = parsed.pin
        .and_then(|p| p.cid)
        .ok_or_else(|| UploaderError::Parse(
            format!("store response missing pin.cid: {body}")
        ))?;
    Cid::parse(&cid)
}

/// Listing responses come as `{data: [..]}`, `{pins: [..]}` or a bare array
pub fn parse_pin_list(body: Value) -> Result<Vec<PinRecord>, UploaderError> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            match map.remove("data").or_else(|| map.remove("pins")) {
                Some(Value::Array(items)) => items,
                Some(other) => return Err(UploaderError::Parse(
                    format!("pin list is not an array: {other}")
                )),
                None => Vec::new(),
            }
        }
        other => return Err(UploaderError::Parse(
            format!("unexpected pin list response: {other}")
        )),
    };
    Ok(items.into_iter()
        .filter_map(|item| serde_json::from_value::<PinRecord>(item).ok())
        .collect())
}

#[derive(Debug, Clone)]
pub struct PinClient {
    http: Client,
    cfg: PinConfig,
    retry: RetryConfig,
    gateways: GatewayResolver,
    timeout: Duration,
    store_floor_ms: u64,
}

impl PinClient {
    pub fn new(http_config: &HttpConfig, cfg: &PinConfig, gateways: GatewayResolver) ->
        Result<Self, UploaderError> {
        let http = fetch::pin_client(http_config, &cfg.api_key)?;
        Ok( Self {
            http,
            cfg: cfg.clone(),
            retry: http_config.retry.clone(),
            gateways,
            timeout: http_config.timeout,
            store_floor_ms: STORE_MIN_TIMEOUT,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, UploaderError> {
        self.cfg.api_base.join(path)
            .map_err(|e| UploaderError::Config(format!("pin endpoint {path}: {e}")))
    }

    /// GET /v1/pinning?pageNumber=&perPage=
    fn pinning_page(&self, page: u32, per_page: u32) -> Result<reqwest::RequestBuilder, UploaderError> {
        let url = self.endpoint("v1/pinning")?;
        Ok(self.http.get(url).query(&[
            ("pageNumber", page.to_string()),
            ("perPage", per_page.to_string()),
        ]))
    }

    /// One-item listing to confirm the key is accepted
    pub async fn test_connection(&self) -> Result<(), UploaderError> {
        let response = self.pinning_page(1, 1)?
            .send()
            .await
            .map_err(|e| fetch::with_deadline(e.into(), self.timeout))?;
        let status = response.status();
        if status.is_success() {
            info!("pin.connection.ok");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, "pin.connection.failed");
        Err(fetch::status_error(status, body))
    }
}

#[async_trait]
impl PinStore for PinClient {
    /// POST /v1/s3/put-object (multipart Body, Key, ContentType)
    async fn store(&self, bytes: Vec<u8>, content_type: &str, key: &str)
        -> Result<Cid, UploaderError> {
        let len = bytes.len() as u64;
        let deadline = scaled_timeout(len, self.store_floor_ms);
        let url = self.endpoint("v1/s3/put-object")?;

        let body = multipart::Part::bytes(bytes)
            .file_name(key.to_string())
            .mime_str(content_type)
            .map_err(|e| UploaderError::Precondition(
                format!("invalid content type {content_type}: {e}")
            ))?;
        let form = multipart::Form::new()
            .part("Body", body)
            .text("Key", key.to_string())
            .text("ContentType", content_type.to_string());

        debug!(key, bytes = len, timeout_ms = deadline.as_millis() as u64, "pin.store.start");
        let started = Instant::now();

        let response = self.http
            .post(url)
            .multipart(form)
            .timeout(deadline)
            .send()
            .await
            .map_err(|e| if e.is_timeout() {
                UploaderError::Timeout { after_ms: deadline.as_millis() as u64 }
            } else {
                e.into()
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(key, status = %status, "pin.store.failed");
            return Err(fetch::status_error(status, text));
        }

        let body: Value = response.json()
            .await
            .map_err(|e| fetch::with_deadline(e.into(), deadline))?;
        let cid = parse_store_response(&body)?;
        info!(
            key, cid = %cid, bytes = len,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pin.store.done"
        );
        Ok(cid)
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<PinRecord>, UploaderError> {
        let per_page = self.cfg.page_size.max(1);
        let mut records = Vec::new();

        for page in 1..=self.cfg.max_pages.max(1) {
            let request = self.pinning_page(page, per_page)?;
            let body = fetch::http_with_retry(request, &self.retry)
                .await
                .map_err(|e| fetch::with_deadline(e, self.timeout))?;
            let batch = parse_pin_list(body)?;
            let short = (batch.len() as u32) < per_page;
            records.extend(batch);
            if short {
                break;
            }
        }

        debug!(owner, count = records.len(), "pin.list.done");
        Ok(records)
    }

    async fn resolve(&self, cid: &Cid) -> Result<Value, UploaderError> {
        let candidates = self.gateways.candidate_urls(cid);
        let total = candidates.len();

        for (i, url) in candidates.into_iter().enumerate() {
            let response = self.gateways.http()
                .get(url.clone())
                .header(reqwest::header::ACCEPT, "application/json,*/*")
                .timeout(self.gateways.resolve_timeout())
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<Value>().await {
                        Ok(doc) => {
                            debug!(cid = %cid, gateway = %url, attempt = i + 1, "pin.resolve.done");
                            return Ok(doc);
                        }
                        Err(e) => warn!(cid = %cid, gateway = %url, error = %e, "pin.resolve.parse"),
                    }
                }
                Ok(resp) => {
                    warn!(cid = %cid, gateway = %url, status = %resp.status(), "pin.resolve.status");
                }
                Err(e) => warn!(cid = %cid, gateway = %url, error = %e, "pin.resolve.error"),
            }
        }

        Err(UploaderError::NotFound(
            format!("{cid} not served by any of {total} gateways")
        ))
    }
}
