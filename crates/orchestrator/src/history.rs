//! In-memory bounded conversation history (spec §3, §4.6).
//!
//! Single-writer discipline: only the turn dispatcher in
//! [`crate::session::SessionOrchestrator`] appends. Streaming callbacks never
//! touch this directly — they post to the turn pipeline, which commits once
//! at `DONE` (spec §4.2). Grounded on the teacher's `SessionStore`
//! (`parking_lot::RwLock`-guarded state, snapshot reads) minus its on-disk
//! persistence, which spec §1's Non-goals rule out for this system.

use std::collections::VecDeque;

use parking_lot::Mutex;

use voiceagent_domain::tool::{Message, Role};

/// Oldest entries are dropped once the history exceeds this length
/// (spec §3 invariant ii).
const MAX_HISTORY: usize = 64;

pub struct HistoryStore {
    entries: Mutex<VecDeque<(Role, String)>>,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Append one entry, truncating from the front if the bound is
    /// exceeded. Called only by the orchestrator's turn dispatcher.
    pub fn append(&self, role: Role, content: String) {
        debug_assert!(!content.is_empty(), "HistoryStore never stores empty content");
        let mut entries = self.entries.lock();
        entries.push_back((role, content));
        while entries.len() > MAX_HISTORY {
            entries.pop_front();
        }
    }

    /// A stable snapshot of the history as LLM messages, for prompt
    /// construction. Never observes a partially-appended turn because
    /// `append` holds the lock for the whole push+truncate.
    pub fn snapshot_as_messages(&self) -> Vec<Message> {
        self.entries
            .lock()
            .iter()
            .map(|(role, content)| Message {
                role: *role,
                content: content.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
