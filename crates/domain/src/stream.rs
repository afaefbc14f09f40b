use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// A boxed async stream, used for every adapter's streaming output.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted by the ASR adapter while a session is open.
#[derive(Debug, Clone)]
pub enum AsrEvent {
    /// A non-final (interim) transcript hypothesis. Never forwarded to the
    /// client or acted on by the orchestrator; informational only.
    Partial { text: String },
    /// A final transcript for one utterance.
    Final { text: String },
    /// Voice-activity classification, passed through to the client verbatim.
    Vad { state: VadState, prob: f32 },
    /// The user started or stopped speaking, independent of VAD framing.
    Utterance { phase: UtterancePhase },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadState {
    Speech,
    Silence,
    Noise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UtterancePhase {
    Begin,
    End,
}

/// Events emitted by the LLM adapter while a turn's completion is streaming.
#[derive(Debug, Clone)]
pub enum LlmEvent {
    /// A UTF-8 text token. Tokens are not guaranteed to align with words or
    /// sentinel boundaries — see `SegmentExtractor`.
    Token { text: String },
    /// The stream has ended; no further tokens will arrive.
    Done,
}

/// Events emitted by the TTS adapter for one segment's audio.
#[derive(Debug, Clone)]
pub enum TtsEvent {
    /// PCM16 little-endian, mono, 48 000 Hz audio bytes.
    Audio { pcm: Vec<u8> },
    /// The segment's audio is complete.
    Done,
}
