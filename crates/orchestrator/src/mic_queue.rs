//! Mic-ingest backpressure queue (spec §3, §5, §8): capacity 6, drop-oldest
//! on overflow. A plain bounded `mpsc` channel backpressures its sender
//! instead, which would stall the gateway's single inbound WebSocket reader
//! loop (shared with JSON control frames like `stop`) whenever ASR falls
//! behind the mic by even one frame. `push` is therefore never blocking.
//!
//! Grounded on the teacher's `parking_lot::Mutex`-guarded in-memory state
//! (`gateway::state`, `HistoryStore`) for the lock choice, with a
//! `tokio::sync::Notify` added so the async forwarder can wait for new
//! frames instead of polling.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

const CAPACITY: usize = 6;

struct Inner {
    frames: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

/// A bounded, drop-oldest queue of microphone frames awaiting forwarding to
/// the ASR adapter.
#[derive(Clone)]
pub struct MicQueue(Arc<Inner>);

impl MicQueue {
    pub fn new() -> Self {
        Self(Arc::new(Inner {
            frames: Mutex::new(VecDeque::with_capacity(CAPACITY)),
            notify: Notify::new(),
        }))
    }

    /// Enqueue one frame. Never blocks. Returns `true` if an older frame was
    /// dropped to make room (the caller should emit `BackpressureDrop`).
    pub fn push(&self, frame: Vec<u8>) -> bool {
        let mut dropped = false;
        {
            let mut frames = self.0.frames.lock();
            if frames.len() >= CAPACITY {
                frames.pop_front();
                dropped = true;
            }
            frames.push_back(frame);
        }
        self.0.notify.notify_one();
        dropped
    }

    /// Wait for and remove the oldest queued frame.
    pub async fn recv(&self) -> Vec<u8> {
        loop {
            if let Some(frame) = self.0.frames.lock().pop_front() {
                return frame;
            }
            self.0.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.0.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MicQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_drops_oldest_not_newest() {
        let q = MicQueue::new();
        for i in 0..CAPACITY {
            assert!(!q.push(vec![i as u8]));
        }
        assert!(q.push(vec![99]));

        let mut seen = Vec::new();
        while let Some(frame) = q.0.frames.lock().pop_front() {
            seen.push(frame);
        }
        assert_eq!(seen.len(), CAPACITY);
        assert_eq!(seen[0], vec![1]);
        assert_eq!(*seen.last().unwrap(), vec![99]);
    }

    #[tokio::test]
    async fn recv_waits_for_a_push() {
        let q = MicQueue::new();
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.recv().await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        q.push(vec![7]);
        let frame = handle.await.unwrap();
        assert_eq!(frame, vec![7]);
    }
}
