//!
//! src/copyright.rs  Oct 19th, 2026
//!
//! Copyright detection delegated to the fingerprinting service: signs an
//! identify request over an audio sample and scores the best match
//!

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use reqwest::{Client, multipart};
use serde::Deserialize;
use sha1::Sha1;
use tracing::{info, warn};

use crate::config::{CopyrightConfig, HttpConfig};
use crate::errors::UploaderError;
use crate::fetch;
use crate::types::{CopyrightCheckResult, DetectedMusic, MediaFile};

type HmacSha1 = Hmac<Sha1>;

const IDENTIFY_URI: &str = "/v1/identify";
const DATA_TYPE: &str = "audio";
const SIGNATURE_VERSION: &str = "1";

// status codes from the identify endpoint
const STATUS_OK: i64 = 0;
const STATUS_NO_RESULT: i64 = 1001;

#[async_trait]
pub trait CopyrightChecker: Send + Sync {
    /// `Err` means the service itself failed, not that a match was found
    async fn check(&self, audio: &MediaFile) -> Result<CopyrightCheckResult, UploaderError>;
}

#[derive(Debug, Deserialize)]
pub struct IdentifyResponse {
    pub status: IdentifyStatus,
    pub metadata: Option<IdentifyMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct IdentifyStatus {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
}

#[derive(Debug, Deserialize)]
pub struct IdentifyMetadata {
    #[serde(default)]
    pub music: Vec<MusicMatch>,
}

#[derive(Debug, Deserialize)]
pub struct MusicMatch {
    pub title: String,
    #[serde(default)]
    pub artists: Vec<NamedEntity>,
    pub album: Option<NamedEntity>,
    pub score: f64,
}

#[derive(Debug, Deserialize)]
pub struct NamedEntity {
    pub name: String,
}

/// Classifies an identify response. A match at or above `threshold` is not
/// original; "no result" is original with full confidence.
pub fn interpret(response: IdentifyResponse, threshold: u32) ->
    Result<CopyrightCheckResult, UploaderError> {

    match response.status.code {
        STATUS_OK => {}
        STATUS_NO_RESULT => return Ok(original()),
        code => return Err(UploaderError::CopyrightService(
            format!("status {code}: {}", response.status.msg)
        )),
    }

    let best = response.metadata
        .and_then(|m| m.music.into_iter().next());
    let Some(music) = best else {
        return Ok(original());
    };

    // floored, so an integer threshold compares the same as the raw score
    let score = music.score.clamp(0.0, 100.0).floor() as u32;
    let artist = music.artists.into_iter()
        .next()
        .map(|a| a.name)
        .unwrap_or_else(|| "Unknown".to_string());

    Ok(CopyrightCheckResult {
        is_original: score < threshold,
        confidence: score,
        detected_music: Some(DetectedMusic {
            title: music.title,
            artist,
            album: music.album.map(|a| a.name),
            score,
        }),
    })
}

fn original() -> CopyrightCheckResult {
    CopyrightCheckResult { is_original: true, confidence: 100, detected_music: None }
}

#[derive(Clone, Debug)]
pub struct AcrCloudClient {
    http: Client,
    cfg: CopyrightConfig,
    timeout: Duration,
}

impl AcrCloudClient {
    pub fn new(http_config: &HttpConfig, cfg: &CopyrightConfig) -> Result<Self, UploaderError> {
        let http = fetch::base_client(http_config)?;
        Ok( Self { http, cfg: cfg.clone(), timeout: http_config.timeout })
    }

    /// base64(HMAC-SHA1(secret, method \n uri \n key \n type \n version \n ts))
    pub fn sign(&self, timestamp: i64) -> Result<String, UploaderError> {
        let timestamp = timestamp.to_string();
        let string_to_sign = [
            "POST",
            IDENTIFY_URI,
            self.cfg.access_key.as_str(),
            DATA_TYPE,
            SIGNATURE_VERSION,
            timestamp.as_str(),
        ].join("\n");

        let mut mac = HmacSha1::new_from_slice(self.cfg.access_secret.as_bytes())
            .map_err(|e| UploaderError::Config(format!("hmac key: {e}")))?;
        mac.update(string_to_sign.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }

    fn identify_url(&self) -> String {
        format!("https://{}{IDENTIFY_URI}", self.cfg.host)
    }

    fn signed_form(&self, timestamp: i64) -> Result<multipart::Form, UploaderError> {
        Ok(multipart::Form::new()
            .text("access_key", self.cfg.access_key.clone())
            .text("data_type", DATA_TYPE)
            .text("signature_version", SIGNATURE_VERSION)
            .text("signature", self.sign(timestamp)?)
            .text("timestamp", timestamp.to_string()))
    }

    /// POST /v1/identify
    async fn identify(&self, sample: &[u8]) -> Result<IdentifyResponse, UploaderError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let part = multipart::Part::bytes(sample.to_vec()).file_name("sample.mp3");
        let form = self.signed_form(timestamp)?
            .part("sample", part)
            .text("sample_bytes", sample.len().to_string());

        let response = self.http
            .post(self.identify_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploaderError::CopyrightService(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploaderError::CopyrightService(format!("http {status}")));
        }
        response.json::<IdentifyResponse>()
            .await
            .map_err(|e| UploaderError::CopyrightService(format!("malformed response: {e}")))
    }

    /// Signed request without a sample; any 2xx means host and keys are usable
    pub async fn test_connection(&self) -> Result<(), UploaderError> {
        let timestamp = chrono::Utc::now().timestamp_millis();
        let response = self.http
            .post(self.identify_url())
            .multipart(self.signed_form(timestamp)?)
            .send()
            .await
            .map_err(|e| fetch::with_deadline(e.into(), self.timeout))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(UploaderError::CopyrightService(format!("http {}", response.status())))
        }
    }
}

#[async_trait]
impl CopyrightChecker for AcrCloudClient {
    async fn check(&self, audio: &MediaFile) -> Result<CopyrightCheckResult, UploaderError> {
        let sample_len = audio.bytes.len().min(self.cfg.sample_bytes);
        let response = self.identify(&audio.bytes[..sample_len]).await?;
        let result = interpret(response, self.cfg.block_threshold)?;

        match &result.detected_music {
            Some(m) => info!(
                title = %m.title, artist = %m.artist, score = m.score,
                original = result.is_original, "copyright.match"
            ),
            None => info!(file = %audio.name, "copyright.clean"),
        }
        if !result.is_original {
            warn!(file = %audio.name, confidence = result.confidence, "copyright.blocked");
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(secret: &str) -> AcrCloudClient {
        let cfg = CopyrightConfig {
            host: "identify-us-west-2.acrcloud.com".to_string(),
            access_key: "key".to_string(),
            access_secret: secret.to_string(),
            sample_bytes: 1024 * 1024,
            block_threshold: 80,
        };
        AcrCloudClient::new(&HttpConfig::default(), &cfg).unwrap()
    }

    fn response(v: serde_json::Value) -> IdentifyResponse {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn signature_is_base64_sha1_digest_and_time_dependent() {
        let c = client("secret");
        let a = c.sign(1_700_000_000_000).unwrap();
        let b = c.sign(1_700_000_000_001).unwrap();

        assert_eq!(BASE64.decode(&a).unwrap().len(), 20);
        assert_ne!(a, b);
        assert_eq!(a, c.sign(1_700_000_000_000).unwrap());
        assert_ne!(a, client("other").sign(1_700_000_000_000).unwrap());
    }

    #[test]
    fn no_result_status_is_original() {
        let r = interpret(response(json!({
            "status": { "code": 1001, "msg": "No result" }
        })), 80).unwrap();
        assert!(r.is_original);
        assert_eq!(r.confidence, 100);
        assert!(r.detected_music.is_none());
    }

    #[test]
    fn high_score_match_is_blocked() {
        let r = interpret(response(json!({
            "status": { "code": 0, "msg": "Success" },
            "metadata": { "music": [{
                "title": "Breathe Deeper",
                "artists": [{ "name": "Tame Impala" }],
                "album": { "name": "The Slow Rush" },
                "score": 95
            }]}
        })), 80).unwrap();

        assert!(!r.is_original);
        assert_eq!(r.confidence, 95);
        let m = r.detected_music.unwrap();
        assert_eq!(m.artist, "Tame Impala");
        assert_eq!(m.album.as_deref(), Some("The Slow Rush"));
    }

    #[test]
    fn threshold_is_inclusive_and_configurable() {
        let body = || response(json!({
            "status": { "code": 0 },
            "metadata": { "music": [{ "title": "x", "artists": [], "score": 80 }] }
        }));
        assert!(!interpret(body(), 80).unwrap().is_original);
        assert!(interpret(body(), 90).unwrap().is_original);
        assert_eq!(
            interpret(body(), 80).unwrap().detected_music.unwrap().artist,
            "Unknown"
        );
    }

    #[test]
    fn fractional_score_below_threshold_passes() {
        let body = |score: f64| response(json!({
            "status": { "code": 0 },
            "metadata": { "music": [{
                "title": "x", "artists": [{ "name": "y" }], "score": score
            }]}
        }));

        let just_under = interpret(body(79.5), 80).unwrap();
        assert!(just_under.is_original);
        assert_eq!(just_under.confidence, 79);
        assert_eq!(just_under.detected_music.unwrap().score, 79);

        assert!(interpret(body(79.99), 80).unwrap().is_original);
        assert!(!interpret(body(80.0), 80).unwrap().is_original);
        assert!(!interpret(body(80.4), 80).unwrap().is_original);
    }

    #[test]
    fn service_errors_are_not_verdicts() {
        let r = interpret(response(json!({
            "status": { "code": 3001, "msg": "Missing/Invalid Access Key" }
        })), 80);
        assert!(matches!(r, Err(UploaderError::CopyrightService(_))));
    }

    #[test]
    fn success_without_music_is_original() {
        let r = interpret(response(json!({
            "status": { "code": 0 }, "metadata": { "music": [] }
        })), 80).unwrap();
        assert!(r.is_original);
    }
}
