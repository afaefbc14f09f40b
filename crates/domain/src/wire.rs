//! JSON text-frame message shapes exchanged on `/ws/agent` (spec §6).
//!
//! Both directions use a tagged-variant enum (`#[serde(tag = "type")]`) with
//! one case per `type` discriminator, the same shape the teacher uses for
//! `TurnEvent`. Unknown inbound `type` values are rejected at decode time by
//! serde and the caller logs + ignores the frame (spec §7, protocol error).

use serde::{Deserialize, Serialize};

use crate::persona::Persona;

/// Client → server JSON text frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Start { persona: Persona },
    Stop {},
    FinalAudioComplete {},
}

/// Server → client JSON text frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Status { message: StatusMessage },
    AsrFinal { text: String },
    LlmToken { text: String },
    SegmentDone { is_final: bool },
    TurnDone {},
    Hangup {},
    Done {},
    Vad { state: VadWire, prob: f32 },
    Utterance { phase: UtterancePhaseWire },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusMessage {
    Connected,
    Initializing,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VadWire {
    Speech,
    Silence,
    Noise,
}

impl From<crate::stream::VadState> for VadWire {
    fn from(s: crate::stream::VadState) -> Self {
        match s {
            crate::stream::VadState::Speech => VadWire::Speech,
            crate::stream::VadState::Silence => VadWire::Silence,
            crate::stream::VadState::Noise => VadWire::Noise,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UtterancePhaseWire {
    Begin,
    End,
}

impl From<crate::stream::UtterancePhase> for UtterancePhaseWire {
    fn from(p: crate::stream::UtterancePhase) -> Self {
        match p {
            crate::stream::UtterancePhase::Begin => UtterancePhaseWire::Begin,
            crate::stream::UtterancePhase::End => UtterancePhaseWire::End,
        }
    }
}
