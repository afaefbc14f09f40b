//! Per-connection orchestration (spec §4.1, §4.2, §4.4).
//!
//! One [`SessionOrchestrator`] per `/ws/agent` connection. It owns the ASR
//! stream for the session's whole lifetime, dispatches one
//! [`crate::turn::TurnPipeline`] at a time, and is the only thing allowed to
//! cancel a live turn (barge-in) or tear the session down. Grounded on the
//! teacher's `nodes/ws.rs::handle_socket` for the single-writer-over-outbound
//! discipline and on `runtime::session_lock::SessionLockMap` for why a live
//! turn's slot is a single guarded `Option`, simplified here to
//! `tokio::sync::Mutex<Option<TurnSlot>>` since barge-in always preempts
//! rather than queuing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use voiceagent_domain::persona::Persona;
use voiceagent_domain::stream::{AsrEvent, UtterancePhase};
use voiceagent_domain::tool::{Message, Role};
use voiceagent_domain::wire::{OutboundMessage, StatusMessage, UtterancePhaseWire, VadWire};
use voiceagent_providers::traits::{AsrProvider, LlmProvider, TtsProvider};

use crate::cancel::SessionCancel;
use crate::history::HistoryStore;
use crate::mic_queue::MicQueue;
use crate::turn::{TurnOutcome, TurnPipeline, TurnState, TurnStateCell};

/// How long a session is kept alive after the hangup sentinel before
/// tearing down unconditionally (spec §4.2).
const HANGUP_TIMEOUT: Duration = Duration::from_secs(6);

struct TurnSlot {
    turn_id: u64,
    cancel: CancellationToken,
    state: TurnStateCell,
}

pub struct SessionOrchestrator {
    session_id: String,
    asr: Arc<dyn AsrProvider>,
    llm: Arc<dyn LlmProvider>,
    tts: Arc<dyn TtsProvider>,
    history: Arc<HistoryStore>,
    cancel: SessionCancel,
    outbound: mpsc::Sender<OutboundMessage>,
    audio_out: mpsc::Sender<Vec<u8>>,
    mic_queue: MicQueue,
    current_turn: Mutex<Option<TurnSlot>>,
    hangup_guard: Mutex<Option<CancellationToken>>,
    next_turn_id: AtomicU64,
    persona: Mutex<Option<Persona>>,
    started: AtomicBool,
    hangup_requested: AtomicBool,
}

impl SessionOrchestrator {
    pub fn new(
        session_id: String,
        asr: Arc<dyn AsrProvider>,
        llm: Arc<dyn LlmProvider>,
        tts: Arc<dyn TtsProvider>,
        outbound: mpsc::Sender<OutboundMessage>,
        audio_out: mpsc::Sender<Vec<u8>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session_id,
            asr,
            llm,
            tts,
            history: Arc::new(HistoryStore::new()),
            cancel: SessionCancel::new(),
            outbound,
            audio_out,
            mic_queue: MicQueue::new(),
            current_turn: Mutex::new(None),
            hangup_guard: Mutex::new(None),
            next_turn_id: AtomicU64::new(1),
            persona: Mutex::new(None),
            started: AtomicBool::new(false),
            hangup_requested: AtomicBool::new(false),
        })
    }

    /// Handles the client's `start` message: opens the ASR stream and spawns
    /// the event-dispatch loop. `Start` is idempotent-by-rejection (spec
    /// §4.1): a second call is a no-op.
    pub async fn start(self: &Arc<Self>, persona: Persona) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!(session_id = %self.session_id, "duplicate start ignored");
            return;
        }

        *self.persona.lock().await = Some(persona);

        voiceagent_domain::trace::TraceEvent::SessionStarted {
            session_id: self.session_id.clone(),
            persona: persona.to_string(),
        }
        .emit();

        let _ = self
            .outbound
            .send(OutboundMessage::Status {
                message: StatusMessage::Connected,
            })
            .await;
        let _ = self
            .outbound
            .send(OutboundMessage::Status {
                message: StatusMessage::Initializing,
            })
            .await;

        let handle = match self.asr.open(self.cancel.new_turn()).await {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(session_id = %self.session_id, error = %e, "asr open failed");
                let _ = self
                    .outbound
                    .send(OutboundMessage::Status {
                        message: StatusMessage::Error,
                    })
                    .await;
                return;
            }
        };

        let this = self.clone();
        let asr_audio_in = handle.audio_in;
        let root_cancel = self.cancel.root_token();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = root_cancel.cancelled() => break,
                    frame = this.mic_queue.recv() => {
                        if asr_audio_in.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let _ = self
            .outbound
            .send(OutboundMessage::Status {
                message: StatusMessage::Ready,
            })
            .await;

        let this = self.clone();
        tokio::spawn(async move {
            this.drain_asr_events(handle.events).await;
        });
    }

    /// Pushes one microphone frame onto the drop-oldest ingest queue (spec
    /// §3: capacity 6, oldest frame discarded on overflow). Silently dropped
    /// outright once the hangup sentinel has been seen (spec §4.1 "Hangup
    /// initiation").
    pub async fn on_inbound_binary(&self, frame: Vec<u8>) {
        if self.hangup_requested.load(Ordering::SeqCst) {
            return;
        }
        if self.mic_queue.push(frame) {
            voiceagent_domain::trace::TraceEvent::BackpressureDrop {
                session_id: self.session_id.clone(),
                queue: "mic_ingest",
            }
            .emit();
        }
    }

    /// Client requested a clean stop. Tears the session down regardless of
    /// any turn or hangup timer in flight.
    pub async fn stop(self: &Arc<Self>) {
        self.teardown("client_stop").await;
    }

    /// Client finished playing back the final audio; if a hangup timer is
    /// pending, this ends the session immediately instead of waiting out the
    /// remainder of the timeout.
    pub async fn on_final_audio_complete(self: &Arc<Self>) {
        if self.hangup_guard.lock().await.is_some() {
            self.teardown("final_audio_complete").await;
        }
    }

    async fn drain_asr_events(self: &Arc<Self>, mut events: mpsc::Receiver<AsrEvent>) {
        while let Some(event) = events.recv().await {
            if self.cancel.is_torn_down() {
                break;
            }
            match event {
                AsrEvent::Final { text } => self.on_final_transcript(text).await,
                AsrEvent::Vad { state, prob } => {
                    let _ = self
                        .outbound
                        .send(OutboundMessage::Vad {
                            state: VadWire::from(state),
                            prob,
                        })
                        .await;
                }
                AsrEvent::Utterance { phase } => {
                    // Barge-in trigger (b): an utterance-begin event only
                    // cancels the live turn while it's in PLAYBACK_DRAINING
                    // (spec §4.1) — generic VAD speech mid-LLM/mid-TTS is not
                    // a barge-in trigger.
                    if phase == UtterancePhase::Begin && self.current_turn_is_draining().await {
                        self.barge_in().await;
                    }
                    let _ = self
                        .outbound
                        .send(OutboundMessage::Utterance {
                            phase: UtterancePhaseWire::from(phase),
                        })
                        .await;
                }
                AsrEvent::Partial { .. } => {}
            }
        }
    }

    async fn current_turn_is_draining(&self) -> bool {
        self.current_turn
            .lock()
            .await
            .as_ref()
            .map(|s| s.state.get() == TurnState::PlaybackDraining)
            .unwrap_or(false)
    }

    /// A final transcript always starts a new turn, cancelling whatever turn
    /// (if any) is still in flight first — barge-in is unconditional on a new
    /// final transcript, not only on the PLAYBACK_DRAINING-gated utterance
    /// trigger (spec §4.2, trigger (a)). Rejected outright once the hangup
    /// sentinel has been seen (spec §4.1 "Hangup initiation").
    async fn on_final_transcript(self: &Arc<Self>, text: String) {
        if self.hangup_requested.load(Ordering::SeqCst) {
            return;
        }
        if text.trim().is_empty() {
            return;
        }
        self.cancel_current_turn().await;

        let _ = self
            .outbound
            .send(OutboundMessage::AsrFinal { text: text.clone() })
            .await;
        self.history.append(Role::User, text);

        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst);
        let turn_cancel = self.cancel.new_turn();
        voiceagent_domain::trace::TraceEvent::TurnStarted {
            session_id: self.session_id.clone(),
            turn_id,
        }
        .emit();

        let turn_state = TurnStateCell::new();
        *self.current_turn.lock().await = Some(TurnSlot {
            turn_id,
            cancel: turn_cancel.clone(),
            state: turn_state.clone(),
        });

        let pipeline = TurnPipeline::new(
            turn_id,
            self.llm.clone(),
            self.tts.clone(),
            self.history.clone(),
            self.outbound.clone(),
            self.audio_out.clone(),
            turn_state,
        );

        let persona = self.persona.lock().await;
        let mut messages = Vec::new();
        if let Some(persona) = *persona {
            messages.push(Message::system(persona.system_prompt()));
        }
        drop(persona);
        messages.extend(self.history.snapshot_as_messages());

        let this = self.clone();
        tokio::spawn(async move {
            let outcome = pipeline.run(messages, turn_cancel).await;
            this.on_turn_finished(turn_id, outcome).await;
        });
    }

    async fn on_turn_finished(self: &Arc<Self>, turn_id: u64, outcome: TurnOutcome) {
        let mut slot = self.current_turn.lock().await;
        if matches!(slot.as_ref(), Some(s) if s.turn_id == turn_id) {
            *slot = None;
        }
        drop(slot);

        if let TurnOutcome::Hangup = outcome {
            self.hangup_requested.store(true, Ordering::SeqCst);
            voiceagent_domain::trace::TraceEvent::HangupRequested {
                session_id: self.session_id.clone(),
                turn_id,
            }
            .emit();
            self.begin_hangup_timer().await;
        }
    }

    async fn barge_in(self: &Arc<Self>) {
        let had_turn = self.current_turn.lock().await.is_some();
        if had_turn {
            if let Some(turn_id) = self.current_turn.lock().await.as_ref().map(|s| s.turn_id) {
                voiceagent_domain::trace::TraceEvent::BargeIn {
                    session_id: self.session_id.clone(),
                    cancelled_turn_id: turn_id,
                }
                .emit();
            }
            self.cancel_current_turn().await;
        }
    }

    async fn cancel_current_turn(&self) {
        if let Some(slot) = self.current_turn.lock().await.take() {
            slot.cancel.cancel();
        }
    }

    async fn begin_hangup_timer(self: &Arc<Self>) {
        let guard = CancellationToken::new();
        *self.hangup_guard.lock().await = Some(guard.clone());
        let this = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => {}
                _ = tokio::time::sleep(HANGUP_TIMEOUT) => {
                    this.teardown("hangup_timeout").await;
                }
            }
        });
    }

    async fn teardown(self: &Arc<Self>, reason: &'static str) {
        if self.cancel.is_torn_down() {
            return;
        }
        self.cancel_current_turn().await;
        if let Some(guard) = self.hangup_guard.lock().await.take() {
            guard.cancel();
        }
        self.cancel.teardown();
        let _ = self.outbound.send(OutboundMessage::Done {}).await;
        voiceagent_domain::trace::TraceEvent::SessionTorndown {
            session_id: self.session_id.clone(),
            reason,
        }
        .emit();
    }
}
