//! Streaming ASR adapter.
//!
//! Bidirectional: microphone frames go out as binary WebSocket frames, the
//! ASR service's transcript/VAD events come back as JSON text frames.
//! Grounded on the teacher's `NodeClient::connect_and_run` shape — connect,
//! split into sink/stream, spawn a writer task fed by an `mpsc` channel, and
//! run the reader as a `tokio::select!` loop against the cancellation token.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use voiceagent_domain::config::ServiceConfig;
use voiceagent_domain::error::{Error, Result};
use voiceagent_domain::stream::{AsrEvent, UtterancePhase, VadState};

use crate::traits::{AsrHandle, AsrProvider};

pub struct WsAsr {
    ws_url: String,
    api_key: String,
}

impl WsAsr {
    pub fn new(cfg: &ServiceConfig) -> Self {
        Self {
            ws_url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
        }
    }
}

/// Wire shape for events the ASR service sends back as JSON text frames.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AsrWireEvent {
    Transcript { is_final: bool, text: String },
    Vad { state: VadState, prob: f32 },
    Utterance { phase: UtterancePhase },
}

impl From<AsrWireEvent> for AsrEvent {
    fn from(e: AsrWireEvent) -> Self {
        match e {
            AsrWireEvent::Transcript { is_final, text } => {
                if is_final {
                    AsrEvent::Final { text }
                } else {
                    AsrEvent::Partial { text }
                }
            }
            AsrWireEvent::Vad { state, prob } => AsrEvent::Vad { state, prob },
            AsrWireEvent::Utterance { phase } => AsrEvent::Utterance { phase },
        }
    }
}

#[async_trait]
impl AsrProvider for WsAsr {
    async fn open(&self, cancel: CancellationToken) -> Result<AsrHandle> {
        let url = format!("{}?api_key={}", self.ws_url, self.api_key);
        let (ws, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| Error::Provider {
                provider: "asr",
                message: e.to_string(),
            })?;
        let (mut sink, mut stream) = ws.split();

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(6);
        let (event_tx, event_rx) = mpsc::channel(64);

        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_cancel.cancelled() => break,
                    frame = audio_rx.recv() => {
                        match frame {
                            Some(bytes) => {
                                if sink.send(Message::Binary(bytes)).await.is_err() {
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

        let reader_cancel = cancel;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reader_cancel.cancelled() => break,
                    msg = stream.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<AsrWireEvent>(&text) {
                                    Ok(wire) => {
                                        if event_tx.send(AsrEvent::from(wire)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!(error = %e, "malformed ASR event, dropping");
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                tracing::warn!(error = %e, "ASR socket error");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(AsrHandle {
            events: event_rx,
            audio_in: audio_tx,
        })
    }
}
