//!
//! src/gateway.rs  Oct 19th, 2026
//!
//! Turns a content id into the ordered list of gateway urls that may serve
//! it, and probes those urls for liveness
//!

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::{GatewayConfig, HttpConfig};
use crate::errors::UploaderError;
use crate::fetch;
use crate::types::Cid;

/// Outcome of looking for a content id inside a url or string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CidLookup {
    Found(Cid),
    NotIpfs,
}

impl CidLookup {
    pub fn cid(self) -> Option<Cid> {
        match self {
            CidLookup::Found(cid) => Some(cid),
            CidLookup::NotIpfs => None,
        }
    }
}

/// Accepts `https://host/ipfs/<cid>/...`, `ipfs://<cid>` or a bare cid
pub fn extract_cid(text: &str) -> CidLookup {
    let text = text.trim();

    if let Some(rest) = text.strip_prefix("ipfs://") {
        let id = rest.split(['/', '?', '#']).next().unwrap_or_default();
        return found(id);
    }

    if let Ok(url) = Url::parse(text) {
        if !matches!(url.scheme(), "http" | "https") {
            return CidLookup::NotIpfs;
        }
        let Some(mut segments) = url.path_segments() else {
            return CidLookup::NotIpfs;
        };
        while let Some(segment) = segments.next() {
            if segment == "ipfs" {
                return found(segments.next().unwrap_or_default());
            }
        }
        return CidLookup::NotIpfs;
    }

    // bare ids: CIDv0 is base58 "Qm..." (46 chars), CIDv1 base32 starts "b"
    let bare_v0 = text.starts_with("Qm") && text.len() == 46;
    let bare_v1 = text.starts_with("baf") && text.len() > 50;
    if bare_v0 || bare_v1 {
        return found(text);
    }
    CidLookup::NotIpfs
}

fn found(id: &str) -> CidLookup {
    match Cid::parse(id) {
        Ok(cid) => CidLookup::Found(cid),
        Err(_) => CidLookup::NotIpfs,
    }
}

/// Appends `t=<millis>` so a gateway or browser cache can't replay a failure
pub fn cache_bust(url: &Url, millis: i64) -> Url {
    let kept: Vec<(String, String)> = url.query_pairs()
        .filter(|(k, _)| k != "t")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut busted = url.clone();
    busted.set_query(None);
    {
        let mut pairs = busted.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("t", &millis.to_string());
    }
    busted
}

/// Liveness check seam; the playback controller only needs this
#[async_trait]
pub trait GatewayProbe: Send + Sync {
    async fn probe(&self, url: &Url) -> bool;
}

#[derive(Debug, Clone)]
pub struct GatewayResolver {
    gateways: Vec<Url>,
    http: Client,
    probe_timeout: Duration,
    resolve_timeout: Duration,
}

impl GatewayResolver {
    pub fn new(cfg: &GatewayConfig, http: &HttpConfig) -> Result<Self, UploaderError> {
        Ok( Self {
            gateways: cfg.gateways.clone(),
            http: fetch::gateway_client(http)?,
            probe_timeout: cfg.probe_timeout,
            resolve_timeout: cfg.resolve_timeout,
        })
    }

    /// Primary first, then secondaries in configured order; no I/O
    pub fn candidate_urls(&self, cid: &Cid) -> Vec<Url> {
        self.gateways.iter()
            .filter_map(|g| g.join(cid.as_str()).ok())
            .collect()
    }

    /// Url recorded in metadata documents
    pub fn gateway_url(&self, cid: &Cid) -> String {
        match self.candidate_urls(cid).into_iter().next() {
            Some(url) => url.to_string(),
            None => format!("ipfs://{cid}"),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn resolve_timeout(&self) -> Duration {
        self.resolve_timeout
    }

    /// Probes every candidate in order, reporting liveness for each
    pub async fn probe_all(&self, cid: &Cid) -> Vec<(Url, bool)> {
        let mut out = Vec::new();
        for url in self.candidate_urls(cid) {
            let live = self.probe(&url).await;
            out.push((url, live));
        }
        out
    }
}

#[async_trait]
impl GatewayProbe for GatewayResolver {
    async fn probe(&self, url: &Url) -> bool {
        let response = self.http
            .head(url.clone())
            .timeout(self.probe_timeout)
            .send()
            .await;
        let live = matches!(&response, Ok(r) if r.status().is_success());
        debug!(url = %url, live, "gateway.probe");
        live
    }
}
