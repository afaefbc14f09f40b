//! Shared application state handed to every axum handler.
//!
//! Grounded on the teacher's `state.rs`: a small `Clone` struct of `Arc`
//! fields, one per concern, rather than a singleton `Mutex<Everything>`.

use std::sync::Arc;

use voiceagent_domain::config::Config;
use voiceagent_providers::{HttpTts, OpenAiCompatLlm, WsAsr};

#[derive(Clone)]
pub struct AppState {
    #[allow(dead_code)]
    pub config: Arc<Config>,
    pub asr: Arc<WsAsr>,
    pub llm: Arc<OpenAiCompatLlm>,
    pub tts: Arc<HttpTts>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let asr = Arc::new(WsAsr::new(&config.asr));
        let llm = Arc::new(OpenAiCompatLlm::new(&config.llm, config.llm_model.clone()));
        let tts = Arc::new(HttpTts::new(&config.tts, config.tts_voice.clone()));
        Self {
            config: Arc::new(config),
            asr,
            llm,
            tts,
        }
    }
}
