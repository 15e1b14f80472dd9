//!
//! src/types.rs  Oct 19th, 2026
//!
//! Shared records: content ids, metadata documents, upload results and the
//! track view model rebuilt from pinned metadata
//!

use std::{fmt, path::Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::UploaderError;

// Content identifier returned by the pinning backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    pub fn parse(s: &str) -> Result<Self, UploaderError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(UploaderError::Parse("empty content id".to_string()));
        }
        if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(UploaderError::Parse(format!("malformed content id: {s}")));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Cid {
    type Error = UploaderError;
    fn try_from(s: String) -> Result<Self, Self::Error> { Cid::parse(&s) }
}

impl From<Cid> for String {
    fn from(c: Cid) -> Self { c.0 }
}

/// Fields the uploader fills in before submitting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicMetadata {
    pub title: String,
    pub artist: String,
    pub ticker: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
}

impl MusicMetadata {
    /// Names of required fields left blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("title", &self.title),
            ("artist", &self.artist),
            ("ticker", &self.ticker),
            ("description", &self.description),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect()
    }
}

/// A single object stored on the pinning backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedObject {
    pub hash: Cid,
    pub url: String,
}

/// Audio (and optional cover) that made it to the backend before the
/// metadata step. Enough to rebuild the metadata document without
/// uploading the audio again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedAudio {
    pub audio: PinnedObject,
    pub cover: Option<PinnedObject>,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
}

/// JSON document persisted next to the audio, addressed by its own hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataDocument {
    #[serde(flatten)]
    pub metadata: MusicMetadata,
    pub owner: String,
    pub uploaded_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    pub audio_hash: Cid,
    pub audio_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_hash: Option<Cid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub file_size: u64,
    pub file_name: String,
    pub mime_type: String,
}

impl MetadataDocument {
    pub fn assemble(
        metadata: &MusicMetadata,
        owner: &str,
        tier: Option<&str>,
        pinned: &PinnedAudio,
        uploaded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            metadata: metadata.clone(),
            owner: owner.to_string(),
            uploaded_by: owner.to_string(),
            tier: tier.map(str::to_string),
            audio_hash: pinned.audio.hash.clone(),
            audio_url: pinned.audio.url.clone(),
            cover_hash: pinned.cover.as_ref().map(|c| c.hash.clone()),
            cover_url: pinned.cover.as_ref().map(|c| c.url.clone()),
            uploaded_at,
            file_size: pinned.file_size,
            file_name: pinned.file_name.clone(),
            mime_type: pinned.mime_type.clone(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, UploaderError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub metadata_hash: Cid,
    pub metadata_url: String,
    pub audio_hash: Cid,
    pub audio_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_hash: Option<Cid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

impl UploadResult {
    pub fn new(metadata: PinnedObject, pinned: &PinnedAudio) -> Self {
        Self {
            metadata_hash: metadata.hash,
            metadata_url: metadata.url,
            audio_hash: pinned.audio.hash.clone(),
            audio_url: pinned.audio.url.clone(),
            cover_hash: pinned.cover.as_ref().map(|c| c.hash.clone()),
            cover_url: pinned.cover.as_ref().map(|c| c.url.clone()),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.audio_hash.as_str().is_empty() && !self.metadata_hash.as_str().is_empty()
    }
}

/// Track view model, rebuilt from a metadata document fetched by hash
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub cid: Cid,
    pub title: String,
    pub artist: String,
    pub ticker: Option<String>,
    pub description: Option<String>,
    pub audio_url: String,
    pub cover_url: Option<String>,
    pub duration: Option<f64>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub file_size: Option<u64>,
    pub owner: Option<String>,
}

impl Track {
    /// Documents pinned by older clients are missing fields, so this reads
    /// the raw json instead of a strict `MetadataDocument`
    pub fn from_document(cid: Cid, doc: &Value) -> Option<Self> {
        let text = |key: &str| {
            doc.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let title = text("title")?;
        let artist = text("artist")?;
        let audio_url = text("audioUrl")?;

        Some(Self {
            cid,
            title,
            artist,
            ticker: text("ticker"),
            description: text("description"),
            audio_url,
            cover_url: text("coverUrl"),
            duration: doc.get("duration").and_then(Value::as_f64),
            uploaded_at: text("uploadedAt")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|d| d.with_timezone(&Utc)),
            file_size: doc.get("fileSize").and_then(Value::as_u64),
            owner: text("owner"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub success: bool,
    pub transaction_hash: Option<String>,
    pub amount_paid: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedMusic {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyrightCheckResult {
    pub is_original: bool,
    pub confidence: u32,
    pub detected_music: Option<DetectedMusic>,
}

/// A file picked for upload, read fully into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl MediaFile {
    pub fn new(name: &str, mime_type: &str, bytes: Vec<u8>) -> Self {
        Self { name: name.to_string(), mime_type: mime_type.to_string(), bytes }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, UploaderError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| UploaderError::Precondition(
                format!("no file name in {}", path.display())
            ))?
            .to_string();
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(Self::new(&name, &mime_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PinRef {
    pub cid: Option<String>,
}

/// Raw entry from the backend's pin listing; shape varies between API
/// versions so every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRecord {
    pub name: Option<String>,
    pub cid: Option<String>,
    pub pin: Option<PinRef>,
    pub hash: Option<String>,
    #[serde(alias = "created")]
    pub created_at: Option<String>,
}

impl PinRecord {
    pub fn content_id(&self) -> Option<Cid> {
        self.cid.as_deref()
            .or_else(|| self.pin.as_ref().and_then(|p| p.cid.as_deref()))
            .or(self.hash.as_deref())
            .and_then(|s| Cid::parse(s).ok())
    }

    /// When the backend pinned it, if the listing says
    pub fn pinned_at(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    }

    /// Metadata documents are named `metadata-*.json` by the uploader
    pub fn looks_like_metadata(&self) -> bool {
        self.name.as_deref()
            .is_some_and(|n| n.contains("metadata") || n.ends_with(".json"))
    }
}
