//! One turn's LLM→segment→TTS pipeline (spec §4.2, §4.3).
//!
//! `TRANSCRIBED` is implicit: a pipeline is only constructed once the user's
//! final transcript has already been committed to history by the caller, so
//! `run` starts directly in `LLM_STREAMING`. TTS requests are strictly
//! sequential — the next segment is never opened until the previous one's
//! audio has fully drained (spec §4.2 "at most one TTS request in flight").
//! Grounded on the teacher's `runtime::turn::TurnRunner` for the
//! state-machine shape and on `nodes/ws.rs::handle_socket`'s single-writer
//! discipline for why audio and control frames go out over two channels
//! instead of being interleaved ad hoc.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voiceagent_domain::stream::{LlmEvent, TtsEvent};
use voiceagent_domain::tool::{Message, Role};
use voiceagent_domain::wire::OutboundMessage;
use voiceagent_providers::traits::{LlmProvider, TtsProvider};

use crate::history::HistoryStore;
use crate::segment::{Segment, SegmentExtractor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TurnState {
    Transcribed = 0,
    LlmStreaming = 1,
    SegmentSynthesizing = 2,
    PlaybackDraining = 3,
    Done = 4,
    Cancelled = 5,
}

impl TurnState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TurnState::Transcribed,
            1 => TurnState::LlmStreaming,
            2 => TurnState::SegmentSynthesizing,
            3 => TurnState::PlaybackDraining,
            4 => TurnState::Done,
            _ => TurnState::Cancelled,
        }
    }
}

/// Shared, readable-from-the-session handle on which state a turn is
/// currently in (spec §4.2's `TRANSCRIBED -> ... -> PLAYBACK_DRAINING`
/// machine). Barge-in trigger (b) — an utterance-begin event — is only
/// honored while the turn is in `PLAYBACK_DRAINING` (spec §4.1).
#[derive(Clone)]
pub struct TurnStateCell(Arc<AtomicU8>);

impl TurnStateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(TurnState::Transcribed as u8)))
    }

    fn set(&self, state: TurnState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub fn get(&self) -> TurnState {
        TurnState::from_u8(self.0.load(Ordering::Acquire))
    }
}

impl Default for TurnStateCell {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Ran to completion with no hangup sentinel.
    Completed,
    /// The hangup sentinel was seen; the caller should start the 6s
    /// teardown timer (spec §4.2).
    Hangup,
    /// Barge-in or a provider error cut the turn short.
    Cancelled,
}

pub struct TurnPipeline {
    pub turn_id: u64,
    llm: Arc<dyn LlmProvider>,
    tts: Arc<dyn TtsProvider>,
    history: Arc<HistoryStore>,
    outbound: mpsc::Sender<OutboundMessage>,
    audio_out: mpsc::Sender<Vec<u8>>,
    state: TurnStateCell,
}

impl TurnPipeline {
    pub fn new(
        turn_id: u64,
        llm: Arc<dyn LlmProvider>,
        tts: Arc<dyn TtsProvider>,
        history: Arc<HistoryStore>,
        outbound: mpsc::Sender<OutboundMessage>,
        audio_out: mpsc::Sender<Vec<u8>>,
        state: TurnStateCell,
    ) -> Self {
        Self {
            turn_id,
            llm,
            tts,
            history,
            outbound,
            audio_out,
            state,
        }
    }

    pub async fn run(&self, messages: Vec<Message>, cancel: CancellationToken) -> TurnOutcome {
        let mut extractor = SegmentExtractor::new();
        let mut full_text = String::new();
        let mut hangup = false;
        let mut cancelled = false;

        let mut llm_rx = match self.llm.open(&messages, cancel.clone()).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(turn_id = self.turn_id, error = %e, "llm open failed");
                self.state.set(TurnState::Cancelled);
                return self.finish(TurnOutcome::Cancelled).await;
            }
        };
        self.state.set(TurnState::LlmStreaming);

        'outer: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break 'outer;
                }
                token = llm_rx.recv() => {
                    match token {
                        Some(Ok(LlmEvent::Token { text })) => {
                            let (forwardable, segments) = extractor.push_token(&text);
                            if !forwardable.is_empty() {
                                let _ = self
                                    .outbound
                                    .send(OutboundMessage::LlmToken { text: forwardable })
                                    .await;
                            }
                            for segment in segments {
                                if segment.is_final {
                                    hangup = true;
                                }
                                append_segment_text(&mut full_text, &segment);
                                self.state.set(TurnState::SegmentSynthesizing);
                                if self.synthesize(&segment, &cancel).await == SegmentOutcome::Cancelled {
                                    cancelled = true;
                                    break 'outer;
                                }
                                if segment.is_final {
                                    cancel.cancel();
                                    break 'outer;
                                }
                                self.state.set(TurnState::LlmStreaming);
                            }
                        }
                        Some(Ok(LlmEvent::Done)) => break,
                        Some(Err(e)) => {
                            tracing::warn!(turn_id = self.turn_id, error = %e, "llm stream error");
                            cancelled = true;
                            break 'outer;
                        }
                        None => break,
                    }
                }
            }
        }

        if !cancelled {
            self.state.set(TurnState::PlaybackDraining);
            let (forwardable, segments) = extractor.flush_on_close();
            if !forwardable.is_empty() {
                let _ = self
                    .outbound
                    .send(OutboundMessage::LlmToken { text: forwardable })
                    .await;
            }
            for segment in segments {
                append_segment_text(&mut full_text, &segment);
                if self.synthesize(&segment, &cancel).await == SegmentOutcome::Cancelled {
                    cancelled = true;
                    break;
                }
            }
        }

        if cancelled {
            self.state.set(TurnState::Cancelled);
            return self.finish(TurnOutcome::Cancelled).await;
        }

        let trimmed = full_text.trim().to_string();
        if !trimmed.is_empty() {
            self.history.append(Role::Assistant, trimmed);
        }

        self.state.set(TurnState::Done);
        if hangup {
            self.finish(TurnOutcome::Hangup).await
        } else {
            self.finish(TurnOutcome::Completed).await
        }
    }

    async fn finish(&self, outcome: TurnOutcome) -> TurnOutcome {
        match outcome {
            TurnOutcome::Hangup => {
                let _ = self.outbound.send(OutboundMessage::Hangup {}).await;
            }
            TurnOutcome::Completed | TurnOutcome::Cancelled => {
                let _ = self.outbound.send(OutboundMessage::TurnDone {}).await;
            }
        }
        outcome
    }

    /// Synthesizes one segment and drains its audio before returning, so the
    /// next segment (if any) never starts early. A TTS error — whether
    /// opening the stream or mid-stream — only ever skips this segment's
    /// remaining audio (spec §7 "TTS error mid-segment"): `segment_done`
    /// still fires and the turn continues. Only the turn's own cancellation,
    /// or the client socket going away, aborts the whole turn.
    async fn synthesize(&self, segment: &Segment, cancel: &CancellationToken) -> SegmentOutcome {
        if segment.text.is_empty() {
            let _ = self
                .outbound
                .send(OutboundMessage::SegmentDone {
                    is_final: segment.is_final,
                })
                .await;
            return SegmentOutcome::Completed;
        }

        let mut tts_rx = match self.tts.open(&segment.text, cancel.clone()).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(turn_id = self.turn_id, error = %e, "tts open failed, skipping segment");
                let _ = self
                    .outbound
                    .send(OutboundMessage::SegmentDone {
                        is_final: segment.is_final,
                    })
                    .await;
                return SegmentOutcome::Completed;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SegmentOutcome::Cancelled,
                event = tts_rx.recv() => {
                    match event {
                        Some(Ok(TtsEvent::Audio { pcm })) => {
                            if self.audio_out.send(pcm).await.is_err() {
                                return SegmentOutcome::Cancelled;
                            }
                        }
                        Some(Ok(TtsEvent::Done)) => break,
                        Some(Err(e)) => {
                            tracing::warn!(
                                turn_id = self.turn_id,
                                error = %e,
                                "tts stream error, skipping rest of segment"
                            );
                            break;
                        }
                        None => break,
                    }
                }
            }
        }

        let _ = self
            .outbound
            .send(OutboundMessage::SegmentDone {
                is_final: segment.is_final,
            })
            .await;
        SegmentOutcome::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentOutcome {
    Completed,
    Cancelled,
}

fn append_segment_text(full_text: &mut String, segment: &Segment) {
    if segment.text.is_empty() {
        return;
    }
    if !full_text.is_empty() {
        full_text.push(' ');
    }
    full_text.push_str(&segment.text);
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use voiceagent_domain::error::Result;

    struct FakeLlm {
        tokens: Vec<&'static str>,
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        async fn open(
            &self,
            _messages: &[Message],
            _cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<Result<LlmEvent>>> {
            let (tx, rx) = mpsc::channel(16);
            let tokens = self.tokens.clone();
            tokio::spawn(async move {
                for t in tokens {
                    if tx.send(Ok(LlmEvent::Token { text: t.to_string() })).await.is_err() {
                        return;
                    }
                }
                let _ = tx.send(Ok(LlmEvent::Done)).await;
            });
            Ok(rx)
        }
    }

    struct FakeTts;

    #[async_trait]
    impl TtsProvider for FakeTts {
        async fn open(
            &self,
            _text: &str,
            _cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<Result<TtsEvent>>> {
            let (tx, rx) = mpsc::channel(16);
            tokio::spawn(async move {
                let _ = tx.send(Ok(TtsEvent::Audio { pcm: vec![1, 2, 3] })).await;
                let _ = tx.send(Ok(TtsEvent::Done)).await;
            });
            Ok(rx)
        }
    }

    /// Errors mid-stream on every segment after emitting one audio chunk,
    /// to exercise the "skip this segment only" recovery path.
    struct FlakyTts;

    #[async_trait]
    impl TtsProvider for FlakyTts {
        async fn open(
            &self,
            _text: &str,
            _cancel: CancellationToken,
        ) -> Result<mpsc::Receiver<Result<TtsEvent>>> {
            let (tx, rx) = mpsc::channel(16);
            tokio::spawn(async move {
                let _ = tx.send(Ok(TtsEvent::Audio { pcm: vec![9] })).await;
                let _ = tx
                    .send(Err(voiceagent_domain::error::Error::Provider {
                        provider: "tts",
                        message: "synthesis dropped".into(),
                    }))
                    .await;
            });
            Ok(rx)
        }
    }

    fn pipeline(tokens: Vec<&'static str>) -> (TurnPipeline, mpsc::Receiver<OutboundMessage>, mpsc::Receiver<Vec<u8>>) {
        pipeline_with_tts(tokens, Arc::new(FakeTts))
    }

    fn pipeline_with_tts(
        tokens: Vec<&'static str>,
        tts: Arc<dyn TtsProvider>,
    ) -> (TurnPipeline, mpsc::Receiver<OutboundMessage>, mpsc::Receiver<Vec<u8>>) {
        let (out_tx, out_rx) = mpsc::channel(64);
        let (audio_tx, audio_rx) = mpsc::channel(64);
        let history = Arc::new(HistoryStore::new());
        let p = TurnPipeline::new(
            1,
            Arc::new(FakeLlm { tokens }),
            tts,
            history,
            out_tx,
            audio_tx,
            TurnStateCell::new(),
        );
        (p, out_rx, audio_rx)
    }

    #[tokio::test]
    async fn completes_normally_and_commits_history() {
        let (p, mut out_rx, mut audio_rx) = pipeline(vec!["Hello there. ", "Bye now."]);
        let history = p.history.clone();
        let outcome = p.run(vec![], CancellationToken::new()).await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(history.len(), 1);

        let mut saw_turn_done = false;
        while let Ok(msg) = out_rx.try_recv() {
            if matches!(msg, OutboundMessage::TurnDone {}) {
                saw_turn_done = true;
            }
        }
        assert!(saw_turn_done);
        assert!(audio_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn hangup_sentinel_commits_history_without_sentinel_and_sends_hangup() {
        let (p, mut out_rx, _audio_rx) = pipeline(vec!["Goodbye. [HANGUP]"]);
        let history = p.history.clone();
        let outcome = p.run(vec![], CancellationToken::new()).await;
        assert_eq!(outcome, TurnOutcome::Hangup);
        let snapshot = history.snapshot_as_messages();
        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot[0].content.contains("HANGUP"));

        let mut saw_hangup = false;
        while let Ok(msg) = out_rx.try_recv() {
            if matches!(msg, OutboundMessage::Hangup {}) {
                saw_hangup = true;
            }
        }
        assert!(saw_hangup);
    }

    #[tokio::test]
    async fn tts_error_mid_segment_skips_audio_but_keeps_turn_and_history() {
        let (p, mut out_rx, _audio_rx) =
            pipeline_with_tts(vec!["Hello there. ", "Bye now."], Arc::new(FlakyTts));
        let history = p.history.clone();
        let outcome = p.run(vec![], CancellationToken::new()).await;
        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(history.len(), 1);
        let snapshot = history.snapshot_as_messages();
        assert!(snapshot[0].content.contains("Hello there."));
        assert!(snapshot[0].content.contains("Bye now."));

        let mut segment_done_count = 0;
        let mut saw_turn_done = false;
        while let Ok(msg) = out_rx.try_recv() {
            match msg {
                OutboundMessage::SegmentDone { .. } => segment_done_count += 1,
                OutboundMessage::TurnDone {} => saw_turn_done = true,
                _ => {}
            }
        }
        assert_eq!(segment_done_count, 2);
        assert!(saw_turn_done);
    }

    #[tokio::test]
    async fn cancellation_leaves_history_untouched() {
        let (p, _out_rx, _audio_rx) = pipeline(vec!["this never finishes"]);
        let history = p.history.clone();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = p.run(vec![], cancel).await;
        assert_eq!(outcome, TurnOutcome::Cancelled);
        assert!(history.is_empty());
    }
}
