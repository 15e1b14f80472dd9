//!
//! src/playback.rs  Oct 19th, 2026
//!
//! Playback fallback: walks the gateway candidates for a track's audio when
//! the current one errors, and re-probes all of them on a manual retry
//!

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::UploaderError;
use crate::gateway::{self, CidLookup, GatewayProbe, GatewayResolver};

#[derive(Debug)]
pub enum PlaybackEvent {
    /// Moved to the next candidate, already cache-busted
    Advanced(Url),
    /// Every candidate failed; reported once per exhaustion
    Failed(UploaderError),
    AlreadyFailed,
}

#[derive(Debug, Clone)]
pub struct PlaybackController {
    source: String,
    candidates: Vec<Url>,
    index: usize,
    current: Url,
    attempted: Vec<Url>,
    errored: bool,
    exhausted: bool,
}

impl PlaybackController {
    /// IPFS sources fan out over every gateway; anything else is played as is
    pub fn new(source: &str, resolver: &GatewayResolver) -> Result<Self, UploaderError> {
        let candidates = match gateway::extract_cid(source) {
            CidLookup::Found(cid) => resolver.candidate_urls(&cid),
            CidLookup::NotIpfs => vec![
                Url::parse(source)
                    .map_err(|e| UploaderError::Parse(format!("audio source {source}: {e}")))?
            ],
        };
        Self::with_candidates(source, candidates)
    }

    pub fn with_candidates(source: &str, candidates: Vec<Url>) -> Result<Self, UploaderError> {
        let first = candidates.first()
            .cloned()
            .ok_or_else(|| UploaderError::Precondition(format!("no playable url for {source}")))?;
        debug!(source, candidates = candidates.len(), "playback.init");
        Ok( Self {
            source: source.to_string(),
            attempted: vec![first.clone()],
            current: first,
            candidates,
            index: 0,
            errored: false,
            exhausted: false,
        })
    }

    pub fn current_url(&self) -> &Url {
        &self.current
    }

    pub fn attempted(&self) -> &[Url] {
        &self.attempted
    }

    pub fn candidates(&self) -> &[Url] {
        &self.candidates
    }

    pub fn has_error(&self) -> bool {
        self.errored
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn on_loaded(&mut self) {
        self.errored = false;
    }

    fn all_failed(&self) -> UploaderError {
        UploaderError::AllGatewaysFailed {
            target: self.source.clone(),
            attempted: self.candidates.len(),
        }
    }

    fn adopt(&mut self, index: usize) -> Url {
        self.index = index;
        self.current = gateway::cache_bust(&self.candidates[index], Utc::now().timestamp_millis());
        self.errored = false;
        self.exhausted = false;
        self.current.clone()
    }

    pub fn on_error(&mut self) -> PlaybackEvent {
        if self.exhausted {
            return PlaybackEvent::AlreadyFailed;
        }
        self.errored = true;

        let next = self.index + 1;
        if next < self.candidates.len() {
            self.attempted.push(self.candidates[next].clone());
            let url = self.adopt(next);
            info!(source = %self.source, attempt = next + 1, url = %url, "playback.fallback");
            return PlaybackEvent::Advanced(url);
        }

        self.exhausted = true;
        warn!(source = %self.source, attempted = self.candidates.len(), "playback.exhausted");
        PlaybackEvent::Failed(self.all_failed())
    }

    /// Manual retry: probes from the first candidate and adopts the first live one
    pub async fn retry(&mut self, probe: &dyn GatewayProbe) -> Result<Url, UploaderError> {
        self.attempted.clear();
        for i in 0..self.candidates.len() {
            let candidate = self.candidates[i].clone();
            self.attempted.push(candidate.clone());
            if probe.probe(&candidate).await {
                let url = self.adopt(i);
                info!(source = %self.source, url = %url, "playback.retry.live");
                return Ok(url);
            }
        }
        self.errored = true;
        self.exhausted = true;
        warn!(source = %self.source, "playback.retry.exhausted");
        Err(self.all_failed())
    }

    /// Downloads the source, treating every failed GET as a playback error
    pub async fn download(&mut self, http: &Client) -> Result<Vec<u8>, UploaderError> {
        let mut url = self.current.clone();
        loop {
            let failure = match http.get(url.clone()).send().await {
                Ok(resp) if resp.status().is_success() => match resp.bytes().await {
                    Ok(body) => {
                        self.on_loaded();
                        info!(url = %url, bytes = body.len(), "playback.loaded");
                        return Ok(body.to_vec());
                    }
                    Err(e) => e.to_string(),
                },
                Ok(resp) => format!("http {}", resp.status()),
                Err(e) => e.to_string(),
            };

            warn!(url = %url, error = %failure, "playback.error");
            match self.on_error() {
                PlaybackEvent::Advanced(next) => url = next,
                PlaybackEvent::Failed(e) => return Err(e),
                PlaybackEvent::AlreadyFailed => return Err(self.all_failed()),
            }
        }
    }

    /// `download`, and once every candidate has failed, a single manual
    /// retry from the first gateway found live by `liveness`
    pub async fn download_with_retry(&mut self, http: &Client, liveness: Option<&dyn GatewayProbe>)
        -> Result<Vec<u8>, UploaderError> {
        let err = match self.download(http).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) => e,
        };
        let Some(liveness) = liveness else {
            return Err(err);
        };
        if !(self.has_error() && self.is_exhausted()) {
            return Err(err);
        }

        info!(source = %self.source, error = %err, "playback.retry.manual");
        self.retry(liveness).await?;
        self.download(http).await
    }
}
