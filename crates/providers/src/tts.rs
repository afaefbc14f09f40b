//! Streaming TTS adapter.
//!
//! Unlike the LLM adapter, TTS responses are raw PCM16 bytes over a chunked
//! HTTP response body, not SSE text — the segment's stream ends with the
//! response body closing, never with a sentinel byte (spec §4.5). Grounded
//! on the same `reqwest::Client` + cancellable-forwarder-task shape as
//! [`crate::llm::OpenAiCompatLlm`], but draining `bytes_stream()` directly
//! instead of through the SSE line-splitter.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voiceagent_domain::config::ServiceConfig;
use voiceagent_domain::error::{Error, Result};
use voiceagent_domain::stream::TtsEvent;

use crate::traits::TtsProvider;

pub struct HttpTts {
    base_url: String,
    api_key: String,
    voice: String,
    client: reqwest::Client,
}

impl HttpTts {
    pub fn new(cfg: &ServiceConfig, voice: impl Into<String>) -> Self {
        Self {
            base_url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
            voice: voice.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
        }
    }
}

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

#[async_trait]
impl TtsProvider for HttpTts {
    async fn open(
        &self,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Result<TtsEvent>>> {
        let resp = self
            .client
            .post(format!("{}/speak", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "voice": self.voice,
                "text": text,
                "sample_rate_hz": 48_000,
                "encoding": "pcm16",
            }))
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "tts",
                message: format!("HTTP {} - {body}", status.as_u16()),
            });
        }

        let mut bytes_stream = resp.bytes_stream();
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    chunk = bytes_stream.next() => {
                        match chunk {
                            Some(Ok(bytes)) => {
                                if bytes.is_empty() {
                                    continue;
                                }
                                if tx
                                    .send(Ok(TtsEvent::Audio { pcm: bytes.to_vec() }))
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Some(Err(e)) => {
                                let _ = tx.send(Err(from_reqwest(e))).await;
                                break;
                            }
                            None => {
                                let _ = tx.send(Ok(TtsEvent::Done)).await;
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
