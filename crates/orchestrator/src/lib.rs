pub mod cancel;
pub mod history;
pub mod mic_queue;
pub mod segment;
pub mod session;
pub mod turn;

pub use cancel::SessionCancel;
pub use history::HistoryStore;
pub use mic_queue::MicQueue;
pub use segment::{Segment, SegmentExtractor};
pub use session::SessionOrchestrator;
pub use turn::{TurnOutcome, TurnPipeline, TurnState};
