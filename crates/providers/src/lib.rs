pub mod asr;
pub mod llm;
mod sse;
pub mod traits;
pub mod tts;

pub use asr::WsAsr;
pub use llm::OpenAiCompatLlm;
pub use traits::{AsrHandle, AsrProvider, LlmProvider, TtsProvider};
pub use tts::HttpTts;
