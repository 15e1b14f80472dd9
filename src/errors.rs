//!
//! src/errors.rs  Oct 19th, 2026
//!
//! Defines enums and methods of error conversion
//! for errors the uploader uses
//!
//!

use thiserror::Error;

use crate::types::PinnedAudio;

#[derive(Error, Debug)]
pub enum UploaderError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("pinning backend rejected credentials: {0}")]
    Auth(String),
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("backend returned {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("copyrighted content detected: \"{title}\" by {artist} ({confidence}%)")]
    CopyrightViolation { title: String, artist: String, confidence: u32 },
    #[error("copyright service error: {0}")]
    CopyrightService(String),
    #[error("payment failed: {0}")]
    Payment(#[from] PaymentError),

    #[error("cover upload failed: {0}")]
    CoverUpload(#[source] Box<UploaderError>),
    #[error("audio upload failed: {0}")]
    AudioUpload(#[source] Box<UploaderError>),
    #[error("metadata upload failed, audio {} is already pinned: {source}", .pinned.audio.hash)]
    MetadataUpload {
        pinned: PinnedAudio,
        #[source]
        source: Box<UploaderError>,
    },

    #[error("all {attempted} gateways failed for {target}")]
    AllGatewaysFailed { target: String, attempted: usize },
}

impl UploaderError {
    /// Pinned audio a metadata retry can reuse, if this failure left any behind
    pub fn pinned_audio(&self) -> Option<&PinnedAudio> {
        match self {
            UploaderError::MetadataUpload { pinned, .. } => Some(pinned),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            UploaderError::Timeout { .. } => true,
            UploaderError::AudioUpload(inner)
            | UploaderError::CoverUpload(inner) => inner.is_timeout(),
            UploaderError::MetadataUpload { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for UploaderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not report the deadline; callers that know it
            // map the error themselves
            UploaderError::Timeout { after_ms: 0 }
        } else {
            UploaderError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for UploaderError {
    fn from(e: serde_json::Error) -> Self { UploaderError::Parse(e.to_string()) }
}

/// Failures of the launch fee transaction, each cause kept distinct
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("transaction rejected by user")]
    UserRejected,
    #[error("insufficient balance: required {required_wei} wei, available {available_wei} wei")]
    InsufficientFunds { required_wei: u128, available_wei: u128 },
    #[error("transaction failed to broadcast: {0}")]
    BroadcastFailed(String),
    #[error("could not switch wallet to chain {chain_id}: {message}")]
    ChainSwitch { chain_id: u64, message: String },
    #[error("invalid treasury wallet address: {0}")]
    InvalidTreasury(String),
    #[error("wallet rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl PaymentError {
    pub fn cause(&self) -> &'static str {
        match self {
            PaymentError::UserRejected => "user-rejected",
            PaymentError::InsufficientFunds { .. } => "insufficient-funds",
            PaymentError::BroadcastFailed(_) => "broadcast-failure",
            PaymentError::ChainSwitch { .. } => "chain-switch",
            PaymentError::InvalidTreasury(_) => "invalid-treasury",
            PaymentError::Rpc { .. } => "rpc",
        }
    }
}
