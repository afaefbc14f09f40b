//! The uniform ASR / LLM / TTS adapter contract (spec §4.5).
//!
//! Every adapter exposes an `open` call that returns a live streaming
//! `Handle` scoped to a `CancellationToken`. Cancelling the token must close
//! the underlying connection within one outstanding I/O and stop emitting
//! events promptly; no adapter invokes a caller-supplied callback, since all
//! callback-style streaming has been re-expressed as a channel the caller
//! drains (spec §9: callback style re-expressed as explicit channels).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use voiceagent_domain::error::Result;
use voiceagent_domain::tool::Message;

use voiceagent_domain::stream::{AsrEvent, LlmEvent, TtsEvent};

/// Transcript-producing external service.
#[async_trait]
pub trait AsrProvider: Send + Sync {
    /// Open a session-scoped ASR stream. `cancel` is the session's
    /// cancellation token (spec §5: ASR is scoped to the session, not the
    /// turn). Returns a receiver of [`AsrEvent`]s and a sender for
    /// microphone frames.
    async fn open(&self, cancel: CancellationToken) -> Result<AsrHandle>;
}

pub struct AsrHandle {
    pub events: tokio::sync::mpsc::Receiver<AsrEvent>,
    pub audio_in: tokio::sync::mpsc::Sender<Vec<u8>>,
}

/// Token-producing external service.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Open a turn-scoped completion stream over the given conversation
    /// history. `cancel` is the turn's cancellation token.
    async fn open(
        &self,
        messages: &[Message],
        cancel: CancellationToken,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<LlmEvent>>>;
}

/// Audio-producing external service.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesize one segment's audio. `cancel` is the turn's cancellation
    /// token; at most one TTS request is in flight per turn (spec §4.2).
    async fn open(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<TtsEvent>>>;
}
