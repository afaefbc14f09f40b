//! Two-level cancellation hierarchy (spec §5): one root token per session,
//! one child token per turn. Tearing down the session cascades to whatever
//! turn is live; cancelling a turn's token (barge-in) never reaches back up
//! to the session root.
//!
//! Grounded on the teacher's `runtime::cancel::CancelMap`, simplified: this
//! system never runs more than one live turn per session, so the map
//! collapses to a single child-token slot owned by
//! [`crate::session::SessionOrchestrator`] rather than a keyed map.

use tokio_util::sync::CancellationToken;

pub struct SessionCancel {
    root: CancellationToken,
}

impl Default for SessionCancel {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCancel {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
        }
    }

    /// A fresh token for one turn, cancelled automatically when the session
    /// tears down even if nobody cancels it directly.
    pub fn new_turn(&self) -> CancellationToken {
        self.root.child_token()
    }

    pub fn teardown(&self) {
        self.root.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// The session's root token, for tasks (e.g. the mic-ingest forwarder)
    /// that need to stop as soon as the session tears down but aren't
    /// themselves scoped to a turn.
    pub fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teardown_cascades_to_live_turn() {
        let session = SessionCancel::new();
        let turn = session.new_turn();
        assert!(!turn.is_cancelled());
        session.teardown();
        assert!(turn.is_cancelled());
    }

    #[test]
    fn cancelling_a_turn_does_not_tear_down_the_session() {
        let session = SessionCancel::new();
        let turn = session.new_turn();
        turn.cancel();
        assert!(!session.is_torn_down());
    }

    #[test]
    fn each_turn_gets_an_independent_token() {
        let session = SessionCancel::new();
        let first = session.new_turn();
        let second = session.new_turn();
        first.cancel();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }
}
