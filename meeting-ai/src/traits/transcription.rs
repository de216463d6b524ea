//! Transcription provider trait.

use crate::types::operation::Tuning;
use crate::Error;
use async_trait::async_trait;
use std::sync::Arc;

/// Abstraction for speech-to-text over short buffered audio units.
///
/// The audio format is whatever the upstream capture produced; it is opaque to the
/// orchestrator. Return [`Error::NoAudioData`] when the unit holds nothing to
/// transcribe so session code can ignore it without counting a failure.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn transcribe(&self, audio: Arc<[u8]>, tuning: Tuning)
        -> std::result::Result<String, Error>;

    /// Return unique identifier for this provider (e.g., "whisper", "deepgram").
    fn provider_id(&self) -> &str;
}
