//! `/ws/agent` — the single serialization point for one voice session
//! (spec §4.4).
//!
//! Grounded on the teacher's `nodes/ws.rs::handle_socket`: split the socket,
//! run one writer task that owns the sink exclusively, and drive the reader
//! loop against whatever inbound frames arrive. JSON control messages and
//! binary audio share the one writer task (the teacher's node protocol only
//! ever writes one message type; this one interleaves two, so the writer
//! selects between both channels instead of draining a single one).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use voiceagent_domain::wire::{InboundMessage, OutboundMessage};
use voiceagent_orchestrator::SessionOrchestrator;

use crate::state::AppState;

pub async fn agent_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<OutboundMessage>(64);
    let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(32);

    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    match msg {
                        Some(msg) => {
                            let text = match serde_json::to_string(&msg) {
                                Ok(t) => t,
                                Err(e) => {
                                    tracing::warn!(error = %e, "failed to encode outbound message");
                                    continue;
                                }
                            };
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                frame = audio_rx.recv() => {
                    match frame {
                        Some(pcm) => {
                            if sink.send(Message::Binary(pcm)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    let session_id = uuid::Uuid::new_v4().to_string();
    let session = SessionOrchestrator::new(
        session_id.clone(),
        state.asr.clone(),
        state.llm.clone(),
        state.tts.clone(),
        outbound_tx,
        audio_tx,
    );

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "websocket transport error");
                break;
            }
        };
        match msg {
            Message::Text(text) => handle_inbound_text(&session, &text).await,
            Message::Binary(bytes) => session.on_inbound_binary(bytes).await,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    session.stop().await;
    writer.abort();
    tracing::info!(session_id = %session_id, "session closed");
}

async fn handle_inbound_text(session: &Arc<SessionOrchestrator>, text: &str) {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(InboundMessage::Start { persona }) => session.start(persona).await,
        Ok(InboundMessage::Stop {}) => session.stop().await,
        Ok(InboundMessage::FinalAudioComplete {}) => session.on_final_audio_complete().await,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed inbound frame");
        }
    }
}
