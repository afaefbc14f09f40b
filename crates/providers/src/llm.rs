//! OpenAI-compatible streaming LLM adapter.
//!
//! Grounded on the teacher's `OpenAiCompatProvider::chat_stream`: POST a
//! chat-completions body with `"stream": true`, read the response as SSE,
//! and forward `delta.content` chunks as tokens. Tool-call assembly is
//! dropped — this system's LLM leg never emits tool calls (spec §4.5).

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voiceagent_domain::config::ServiceConfig;
use voiceagent_domain::error::{Error, Result};
use voiceagent_domain::stream::LlmEvent;
use voiceagent_domain::tool::{Message, Role};

use crate::sse::sse_response_stream;
use crate::traits::LlmProvider;

pub struct OpenAiCompatLlm {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiCompatLlm {
    pub fn new(cfg: &ServiceConfig, model: impl Into<String>) -> Self {
        Self {
            base_url: cfg.url.clone(),
            api_key: cfg.api_key.clone(),
            model: model.into(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("reqwest client"),
        }
    }

    fn body(&self, messages: &[Message]) -> Value {
        json!({
            "model": self.model,
            "stream": true,
            "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
        })
    }
}

fn message_json(m: &Message) -> Value {
    let role = match m.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    json!({ "role": role, "content": m.content })
}

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Parse one SSE `data:` payload into zero or one [`LlmEvent`].
fn parse_sse_data(data: &str) -> Vec<Result<LlmEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(LlmEvent::Done)];
    }
    let parsed: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let Some(choice) = parsed.get("choices").and_then(|c| c.get(0)) else {
        return Vec::new();
    };
    if choice.get("finish_reason").and_then(|v| v.as_str()).is_some() {
        return vec![Ok(LlmEvent::Done)];
    }
    let Some(text) = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(|v| v.as_str())
    else {
        return Vec::new();
    };
    if text.is_empty() {
        return Vec::new();
    }
    vec![Ok(LlmEvent::Token {
        text: text.to_string(),
    })]
}

#[async_trait]
impl LlmProvider for OpenAiCompatLlm {
    async fn open(
        &self,
        messages: &[Message],
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<Result<LlmEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(messages))
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Provider {
                provider: "llm",
                message: format!("HTTP {} - {text}", status.as_u16()),
            });
        }

        let mut inner = sse_response_stream(resp, parse_sse_data);
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            use futures_util::StreamExt;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    item = inner.next() => {
                        match item {
                            Some(event) => {
                                let is_done = matches!(event, Ok(LlmEvent::Done));
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                                if is_done {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_delta() {
        let events = parse_sse_data(r#"{"choices":[{"delta":{"content":"hi"}}]}"#);
        assert!(matches!(&events[0], Ok(LlmEvent::Token { text }) if text == "hi"));
    }

    #[test]
    fn parses_done_sentinel() {
        let events = parse_sse_data("[DONE]");
        assert!(matches!(events[0], Ok(LlmEvent::Done)));
    }

    #[test]
    fn parses_finish_reason_as_done() {
        let events =
            parse_sse_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert!(matches!(events[0], Ok(LlmEvent::Done)));
    }

    #[test]
    fn ignores_empty_content_delta() {
        let events = parse_sse_data(r#"{"choices":[{"delta":{"content":""}}]}"#);
        assert!(events.is_empty());
    }
}
