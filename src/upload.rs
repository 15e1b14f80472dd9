//!
//! src/upload.rs  Oct 19th, 2026
//!
//! Upload orchestration: validates the request, runs the optional copyright
//! check and launch fee, pins cover, audio and the metadata document in that
//! order and reconciles partial failures. A metadata failure keeps the pinned
//! audio so the metadata step alone can be retried.
//!

use std::sync::Arc;

use chrono::Utc;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::config::UploadPolicy;
use crate::copyright::CopyrightChecker;
use crate::errors::{PaymentError, UploaderError};
use crate::gateway::GatewayResolver;
use crate::payment::PaymentProcessor;
use crate::pin::{PinStore, store_timeout};
use crate::status::StatusLog;
use crate::types::{
    MediaFile, MetadataDocument, MusicMetadata, PaymentResult, PinnedAudio, PinnedObject,
    UploadResult,
};

const METADATA_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPath {
    /// Free upload for wallets on the verified list
    Verified,
    /// Fee-based upload, copyright checked and paid for
    Launch,
}

impl UploadPath {
    fn tier(self) -> Option<&'static str> {
        match self {
            UploadPath::Verified => None,
            UploadPath::Launch => Some("launch"),
        }
    }
}

/// Step names without payload, used for the transition history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    CheckingCopyright,
    ProcessingPayment,
    UploadingCover,
    UploadingAudio,
    AssemblingMetadata,
    UploadingMetadata,
    Complete,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    Idle,
    CheckingCopyright,
    ProcessingPayment,
    UploadingCover,
    UploadingAudio,
    AssemblingMetadata,
    UploadingMetadata,
    Complete(UploadResult),
    Failed(String),
}

impl UploadState {
    pub fn stage(&self) -> Stage {
        match self {
            UploadState::Idle => Stage::Idle,
            UploadState::CheckingCopyright => Stage::CheckingCopyright,
            UploadState::ProcessingPayment => Stage::ProcessingPayment,
            UploadState::UploadingCover => Stage::UploadingCover,
            UploadState::UploadingAudio => Stage::UploadingAudio,
            UploadState::AssemblingMetadata => Stage::AssemblingMetadata,
            UploadState::UploadingMetadata => Stage::UploadingMetadata,
            UploadState::Complete(_) => Stage::Complete,
            UploadState::Failed(_) => Stage::Failed,
        }
    }
}

/// Everything the uploader filled in. Left untouched by a failed attempt so
/// it can be edited and submitted again.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub audio: Option<MediaFile>,
    pub cover: Option<MediaFile>,
    pub metadata: MusicMetadata,
    pub wallet: Option<String>,
    pub path: UploadPath,
}

#[derive(Debug, Clone)]
pub struct UploadAttempt {
    pub id: Uuid,
    pub state: UploadState,
    pub history: Vec<Stage>,
    pub log: StatusLog,
    pub payment: Option<PaymentResult>,
    /// Set when the audio itself was rejected and must be replaced
    pub requires_new_file: bool,
}

impl UploadAttempt {
    pub fn new(log_lines: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: UploadState::Idle,
            history: vec![Stage::Idle],
            log: StatusLog::new(log_lines),
            payment: None,
            requires_new_file: false,
        }
    }

    fn enter(&mut self, state: UploadState, message: &str) {
        info!(
            attempt = %self.id, from = ?self.state.stage(), to = ?state.stage(),
            "upload.state"
        );
        self.history.push(state.stage());
        self.state = state;
        if !message.is_empty() {
            self.log.push(message);
        }
    }

    fn fail(&mut self, error: &UploaderError) {
        warn!(attempt = %self.id, stage = ?self.state.stage(), error = %error, "upload.failed");
        self.requires_new_file = matches!(error, UploaderError::CopyrightViolation { .. });
        let message = format!("Error: {error}");
        self.enter(UploadState::Failed(error.to_string()), &message);
    }
}

pub struct Orchestrator {
    pins: Arc<dyn PinStore>,
    resolver: GatewayResolver,
    copyright: Option<Arc<dyn CopyrightChecker>>,
    payment: Option<Arc<dyn PaymentProcessor>>,
    policy: UploadPolicy,
}

impl Orchestrator {
    pub fn new(pins: Arc<dyn PinStore>, resolver: GatewayResolver, policy: UploadPolicy) -> Self {
        Self { pins, resolver, copyright: None, payment: None, policy }
    }

    pub fn with_copyright(mut self, checker: Arc<dyn CopyrightChecker>) -> Self {
        self.copyright = Some(checker);
        self
    }

    pub fn with_payment(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.payment = Some(processor);
        self
    }

    pub fn begin(&self) -> UploadAttempt {
        UploadAttempt::new(self.policy.status_lines)
    }

    /// Runs the whole flow once. The attempt ends in `Complete` or `Failed`.
    pub async fn run(&self, request: &UploadRequest, attempt: &mut UploadAttempt)
        -> Result<UploadResult, UploaderError> {
        let span = info_span!("upload", attempt = %attempt.id, path = ?request.path);
        let outcome = self.execute(request, attempt).instrument(span).await;
        self.settle(attempt, outcome)
    }

    /// Redoes only the metadata steps for audio pinned by an earlier attempt
    pub async fn resume(
        &self,
        request: &UploadRequest,
        pinned: &PinnedAudio,
        attempt: &mut UploadAttempt,
    ) -> Result<UploadResult, UploaderError> {
        let span = info_span!("upload.resume", attempt = %attempt.id, audio = %pinned.audio.hash);
        let outcome = self.republish(request, pinned, attempt).instrument(span).await;
        self.settle(attempt, outcome)
    }

    async fn republish(
        &self,
        request: &UploadRequest,
        pinned: &PinnedAudio,
        attempt: &mut UploadAttempt,
    ) -> Result<UploadResult, UploaderError> {
        let wallet = self.check_identity(request)?;
        attempt.log.push(format!("Reusing pinned audio {}", pinned.audio.hash));
        self.publish_metadata(request, wallet, pinned, attempt).await
    }

    fn settle(&self, attempt: &mut UploadAttempt, outcome: Result<UploadResult, UploaderError>)
        -> Result<UploadResult, UploaderError> {
        match &outcome {
            Ok(result) => {
                debug_assert!(result.is_valid());
                attempt.enter(UploadState::Complete(result.clone()), "Upload complete!");
                info!(
                    attempt = %attempt.id, audio = %result.audio_hash,
                    metadata = %result.metadata_hash, "upload.complete"
                );
            }
            Err(e) => attempt.fail(e),
        }
        outcome
    }

    /// Wallet and metadata checks shared by fresh runs and resumes
    fn check_identity<'a>(&self, request: &'a UploadRequest) -> Result<&'a str, UploaderError> {
        let wallet = request.wallet.as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .ok_or_else(|| UploaderError::Precondition("connect a wallet first".to_string()))?;

        let missing = request.metadata.missing_fields();
        if !missing.is_empty() {
            return Err(UploaderError::Precondition(
                format!("missing required fields: {}", missing.join(", "))
            ));
        }

        if request.path == UploadPath::Verified && !self.policy.is_verified(wallet) {
            return Err(UploaderError::Precondition(
                format!("wallet {wallet} is not verified for free uploads")
            ));
        }
        Ok(wallet)
    }

    fn check_preconditions<'a>(&self, request: &'a UploadRequest)
        -> Result<(&'a MediaFile, &'a str), UploaderError> {
        let audio = request.audio.as_ref()
            .ok_or_else(|| UploaderError::Precondition("select an audio file".to_string()))?;
        if !audio.is_audio() {
            return Err(UploaderError::Precondition(
                format!("{} is {}, not audio", audio.name, audio.mime_type)
            ));
        }
        if let Some(cover) = &request.cover {
            if !cover.is_image() {
                return Err(UploaderError::Precondition(
                    format!("cover {} is {}, not an image", cover.name, cover.mime_type)
                ));
            }
        }
        if request.path == UploadPath::Launch && self.payment.is_none() {
            return Err(UploaderError::Precondition("no payment processor configured".to_string()));
        }
        let wallet = self.check_identity(request)?;
        Ok((audio, wallet))
    }

    async fn execute(&self, request: &UploadRequest, attempt: &mut UploadAttempt)
        -> Result<UploadResult, UploaderError> {
        let (audio, wallet) = self.check_preconditions(request)?;

        if request.path == UploadPath::Launch {
            self.check_copyright(audio, attempt).await?;
            self.pay(wallet, attempt).await?;
        }

        let cover = match &request.cover {
            Some(cover) => self.upload_cover(cover, attempt).await,
            None => None,
        };
        let pinned = self.upload_audio(audio, cover, attempt).await?;
        self.publish_metadata(request, wallet, &pinned, attempt).await
    }

    async fn check_copyright(&self, audio: &MediaFile, attempt: &mut UploadAttempt)
        -> Result<(), UploaderError> {
        attempt.enter(UploadState::CheckingCopyright, "Checking copyright...");
        let Some(checker) = &self.copyright else {
            warn!(attempt = %attempt.id, "copyright.unavailable");
            attempt.log.push("Copyright check unavailable, continuing");
            return Ok(());
        };

        match checker.check(audio).await {
            Ok(result) => {
                if let Some(music) = &result.detected_music {
                    if result.confidence >= self.policy.copyright_threshold {
                        return Err(UploaderError::CopyrightViolation {
                            title: music.title.clone(),
                            artist: music.artist.clone(),
                            confidence: result.confidence,
                        });
                    }
                }
                attempt.log.push("Copyright check passed");
                Ok(())
            }
            Err(e) => {
                // a broken fingerprint service must not block uploads
                warn!(attempt = %attempt.id, error = %e, "copyright.error");
                attempt.log.push("Copyright check failed, continuing");
                Ok(())
            }
        }
    }

    async fn pay(&self, wallet: &str, attempt: &mut UploadAttempt) -> Result<(), UploaderError> {
        attempt.enter(UploadState::ProcessingPayment, "Processing launch fee payment...");
        let processor = self.payment.as_ref()
            .ok_or_else(|| UploaderError::Precondition("no payment processor configured".to_string()))?;

        let result = processor.process_launch_payment(wallet).await?;
        if !result.success {
            let reason = result.error.clone().unwrap_or_else(|| "payment not confirmed".to_string());
            return Err(PaymentError::BroadcastFailed(reason).into());
        }
        let hash = result.transaction_hash.clone().unwrap_or_default();
        info!(attempt = %attempt.id, tx = %hash, "upload.paid");
        attempt.log.push(format!("Payment sent: {hash}"));
        attempt.payment = Some(result);
        Ok(())
    }

    /// Best effort; a failed cover never fails the upload
    async fn upload_cover(&self, cover: &MediaFile, attempt: &mut UploadAttempt) -> Option<PinnedObject> {
        attempt.enter(UploadState::UploadingCover, "Uploading cover image...");
        let key = format!("cover-{}-{}", Utc::now().timestamp_millis(), cover.name);

        match self.pins.store(cover.bytes.clone(), &cover.mime_type, &key).await {
            Ok(hash) => {
                attempt.log.push("Cover uploaded");
                let url = self.resolver.gateway_url(&hash);
                Some(PinnedObject { hash, url })
            }
            Err(e) => {
                let e = UploaderError::CoverUpload(Box::new(e));
                warn!(attempt = %attempt.id, error = %e, "upload.cover.skipped");
                attempt.log.push("Cover upload failed, continuing without cover");
                None
            }
        }
    }

    async fn upload_audio(
        &self,
        audio: &MediaFile,
        cover: Option<PinnedObject>,
        attempt: &mut UploadAttempt,
    ) -> Result<PinnedAudio, UploaderError> {
        attempt.enter(UploadState::UploadingAudio, "Uploading audio file...");
        info!(
            attempt = %attempt.id, file = %audio.name, bytes = audio.size(),
            timeout_ms = store_timeout(audio.size()).as_millis() as u64,
            "upload.audio.start"
        );

        let hash = self.pins.store(audio.bytes.clone(), &audio.mime_type, &audio.name)
            .await
            .map_err(|e| UploaderError::AudioUpload(Box::new(e)))?;
        attempt.log.push(format!("Audio uploaded: {hash}"));

        let url = self.resolver.gateway_url(&hash);
        Ok(PinnedAudio {
            audio: PinnedObject { hash, url },
            cover,
            file_name: audio.name.clone(),
            file_size: audio.size(),
            mime_type: audio.mime_type.clone(),
        })
    }

    async fn publish_metadata(
        &self,
        request: &UploadRequest,
        wallet: &str,
        pinned: &PinnedAudio,
        attempt: &mut UploadAttempt,
    ) -> Result<UploadResult, UploaderError> {
        attempt.enter(UploadState::AssemblingMetadata, "Creating metadata...");
        let document = MetadataDocument::assemble(
            &request.metadata, wallet, request.path.tier(), pinned, Utc::now()
        );
        let bytes = document.to_bytes()?;

        attempt.enter(UploadState::UploadingMetadata, "Uploading metadata...");
        let key = format!("metadata-{}.json", Utc::now().timestamp_millis());
        let hash = self.pins.store(bytes, METADATA_CONTENT_TYPE, &key)
            .await
            .map_err(|e| UploaderError::MetadataUpload {
                pinned: pinned.clone(),
                source: Box::new(e),
            })?;

        let url = self.resolver.gateway_url(&hash);
        Ok(UploadResult::new(PinnedObject { hash, url }, pinned))
    }
}
