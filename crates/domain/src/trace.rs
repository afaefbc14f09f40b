use serde::Serialize;

/// Structured session lifecycle events, emitted as a single `trace_event`
/// JSON field on an `info!` call (mirrors `sa_domain::trace::TraceEvent`).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionStarted {
        session_id: String,
        persona: String,
    },
    TurnStarted {
        session_id: String,
        turn_id: u64,
    },
    BargeIn {
        session_id: String,
        cancelled_turn_id: u64,
    },
    HangupRequested {
        session_id: String,
        turn_id: u64,
    },
    SessionTorndown {
        session_id: String,
        reason: &'static str,
    },
    BackpressureDrop {
        session_id: String,
        queue: &'static str,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        let ts = chrono::Utc::now().to_rfc3339();
        tracing::info!(trace_event = %json, ts = %ts, "voiceagent_event");
    }
}
