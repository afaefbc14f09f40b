//! Splits the LLM token stream into TTS-ready segments and detects the
//! hangup sentinel (spec §4.3).
//!
//! Grounded on the teacher's `providers::sse::drain_data_lines` shape: a
//! rolling buffer scanned in place, returning completed chunks and leaving
//! a partial remainder for the next append. Unlike that buffer, this one is
//! never physically drained — cursors (`consumed`, `forwarded`) advance
//! through a buffer that lives for one turn, so byte offsets stay stable
//! across a push even once earlier text has been turned into segments.

const SENTINEL: &str = "[HANGUP]";
const MAX_SEGMENT_CHARS: usize = 250;
const SENTENCE_PUNCT: [char; 4] = ['.', '!', '?', '…'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub is_final: bool,
}

#[derive(Default)]
pub struct SegmentExtractor {
    buffer: String,
    /// Everything before this offset has already become a `Segment` (or, for
    /// the sentinel match itself, been discarded).
    consumed: usize,
    /// Everything before this offset has already been handed back as
    /// `llm_token`-safe text. Never passes a held-back partial sentinel
    /// prefix, and never includes the sentinel itself (spec §8 boundary:
    /// "no llm_token for the sentinel's characters is forwarded").
    forwarded: usize,
    done: bool,
}

impl SegmentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one LLM token. Returns the text (if any) now safe to forward to
    /// the client as a raw token, and zero or more segments ready to
    /// synthesize.
    pub fn push_token(&mut self, token: &str) -> (String, Vec<Segment>) {
        if self.done {
            return (String::new(), Vec::new());
        }
        self.buffer.push_str(token);

        if let Some(rel) = find_sentinel(&self.buffer[self.consumed..]) {
            let p = self.consumed + rel;
            let forwardable = self.buffer[self.forwarded..p].to_string();
            let closing = self.buffer[self.consumed..p].trim_end().to_string();
            self.forwarded = self.buffer.len();
            self.consumed = self.buffer.len();
            self.done = true;
            return (
                forwardable,
                vec![Segment {
                    text: closing,
                    is_final: true,
                }],
            );
        }

        let segments = self.drain_segments();

        let held = partial_sentinel_suffix_len(&self.buffer[self.consumed..]);
        let safe_end = self.buffer.len() - held;
        let forwardable = self.buffer[self.forwarded..safe_end].to_string();
        self.forwarded = safe_end;

        (forwardable, segments)
    }

    /// Flush any non-empty residual on LLM stream close (spec §4.2
    /// end-of-turn; resolves the Open Question in favor of synthesizing a
    /// sub-threshold residual rather than dropping it). Also releases
    /// whatever text was held back waiting for a sentinel that never
    /// completed, since the stream is now known to be over.
    pub fn flush_on_close(&mut self) -> (String, Vec<Segment>) {
        if self.done || self.consumed >= self.buffer.len() {
            let trailing = if self.forwarded < self.buffer.len() && !self.done {
                let t = self.buffer[self.forwarded..].to_string();
                self.forwarded = self.buffer.len();
                t
            } else {
                String::new()
            };
            return (trailing, Vec::new());
        }
        let text = self.buffer[self.consumed..].to_string();
        let forwardable = self.buffer[self.forwarded..].to_string();
        self.consumed = self.buffer.len();
        self.forwarded = self.buffer.len();
        (
            forwardable,
            vec![Segment {
                text,
                is_final: false,
            }],
        )
    }

    fn drain_segments(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();

        loop {
            let held = partial_sentinel_suffix_len(&self.buffer[self.consumed..]);
            let usable_len = self.buffer.len() - held - self.consumed;
            if usable_len == 0 {
                break;
            }
            let usable = &self.buffer[self.consumed..self.consumed + usable_len];

            if let Some(end) = rightmost_punct_end(usable, MAX_SEGMENT_CHARS) {
                let absolute_end = self.consumed + end;
                let text = self.buffer[self.consumed..absolute_end].to_string();
                self.consumed = absolute_end;
                out.push(Segment {
                    text,
                    is_final: false,
                });
                continue;
            }

            if char_count(usable) >= MAX_SEGMENT_CHARS {
                let absolute_end = self.consumed + byte_offset_at_char_count(usable, MAX_SEGMENT_CHARS);
                let text = self.buffer[self.consumed..absolute_end].to_string();
                self.consumed = absolute_end;
                out.push(Segment {
                    text,
                    is_final: false,
                });
                continue;
            }

            break;
        }

        out
    }
}

fn char_count(s: &str) -> usize {
    s.chars().count()
}

fn byte_offset_at_char_count(s: &str, n: usize) -> usize {
    s.char_indices()
        .nth(n)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Byte index one-past the rightmost sentence-ending punctuation character
/// within the first `max_chars` characters of `s`, or `None`.
fn rightmost_punct_end(s: &str, max_chars: usize) -> Option<usize> {
    let window_end = byte_offset_at_char_count(s, max_chars);
    s[..window_end]
        .char_indices()
        .rfind(|(_, c)| SENTENCE_PUNCT.contains(c))
        .map(|(i, c)| i + c.len_utf8())
}

/// Case-insensitive search for the literal `[HANGUP]` sentinel (ASCII-only,
/// so byte-wise comparison after lowercasing is safe).
fn find_sentinel(s: &str) -> Option<usize> {
    let hay = s.as_bytes();
    let needle = SENTINEL.as_bytes();
    if hay.len() < needle.len() {
        return None;
    }
    (0..=hay.len() - needle.len()).find(|&i| {
        hay[i..i + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    })
}

/// Length (in bytes) of the longest suffix of `s` that is a case-insensitive
/// prefix of the sentinel (spec §4.3 "partial sentinel prefixes ... held
/// back from segmentation").
fn partial_sentinel_suffix_len(s: &str) -> usize {
    let max_check = SENTINEL.len().min(s.len());
    for len in (1..=max_check).rev() {
        let suffix = &s[s.len() - len..];
        if suffix
            .as_bytes()
            .iter()
            .zip(SENTINEL.as_bytes())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
        {
            return len;
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_on_sentence_punctuation() {
        let mut ext = SegmentExtractor::new();
        let (_fwd, segs) = ext.push_token("Hello there. More text");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "Hello there.");
        assert!(!segs[0].is_final);
    }

    #[test]
    fn ellipsis_counts_as_sentence_ending() {
        let mut ext = SegmentExtractor::new();
        let (_fwd, segs) = ext.push_token("Wait… really? ok");
        assert_eq!(segs[0].text, "Wait… really?");
    }

    #[test]
    fn budget_cut_at_exactly_250_with_no_punctuation() {
        let mut ext = SegmentExtractor::new();
        let text: String = "a".repeat(260);
        let (_fwd, segs) = ext.push_token(&text);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text.chars().count(), 250);
    }

    #[test]
    fn sentinel_split_across_two_tokens_is_detected() {
        let mut ext = SegmentExtractor::new();
        let (fwd1, first) = ext.push_token("Not interested, bye [HAN");
        assert!(first.is_empty(), "partial sentinel must not leak a segment");
        assert_eq!(fwd1, "Not interested, bye ");
        let (fwd2, second) = ext.push_token("GUP]");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].text, "Not interested, bye");
        assert!(second[0].is_final);
        assert!(
            fwd2.is_empty(),
            "no llm_token text may be forwarded for the sentinel's characters"
        );
    }

    #[test]
    fn sentinel_as_entire_output_emits_empty_final_segment_and_nothing_forwarded() {
        let mut ext = SegmentExtractor::new();
        let (fwd, segs) = ext.push_token("[HANGUP]");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "");
        assert!(segs[0].is_final);
        assert!(fwd.is_empty());
    }

    #[test]
    fn sentinel_matched_case_insensitively() {
        let mut ext = SegmentExtractor::new();
        let (_fwd, segs) = ext.push_token("bye [hangup]");
        assert_eq!(segs[0].text, "bye");
        assert!(segs[0].is_final);
    }

    #[test]
    fn nothing_after_hangup_is_ever_emitted() {
        let mut ext = SegmentExtractor::new();
        ext.push_token("bye [HANGUP] ignored trailing text.");
        let (fwd, more) = ext.push_token(" even more.");
        assert!(more.is_empty());
        assert!(fwd.is_empty());
    }

    #[test]
    fn residual_below_threshold_flushed_on_close() {
        let mut ext = SegmentExtractor::new();
        ext.push_token("no terminator here");
        let (_fwd, flushed) = ext.flush_on_close();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].text, "no terminator here");
        assert!(!flushed[0].is_final);
    }

    #[test]
    fn close_with_empty_buffer_flushes_nothing() {
        let mut ext = SegmentExtractor::new();
        ext.push_token("Complete sentence.");
        let (_fwd, flushed) = ext.flush_on_close();
        assert!(flushed.is_empty());
    }

    #[test]
    fn short_multi_sentence_text_packs_into_one_segment() {
        // Segments fill up to the budget before cutting, so several short
        // sentences that together stay under 250 chars collapse into one.
        let mut ext = SegmentExtractor::new();
        let (_fwd, segs) = ext.push_token("One. Two! Three?");
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].text, "One. Two! Three?");
    }

    #[test]
    fn sentences_exceeding_budget_split_at_rightmost_punctuation_in_window() {
        let mut ext = SegmentExtractor::new();
        let sentence = "This is one sentence of moderate length. "; // 42 chars
        let text = sentence.repeat(8); // 336 chars, over budget
        let (_fwd, segs) = ext.push_token(&text);
        assert!(segs.len() >= 2);
        for seg in &segs {
            assert!(seg.text.chars().count() <= MAX_SEGMENT_CHARS);
            assert!(SENTENCE_PUNCT.iter().any(|c| seg.text.ends_with(*c)));
        }
        let reconstructed: String = segs.iter().map(|s| s.text.as_str()).collect();
        assert!(text.starts_with(&reconstructed));
    }

    #[test]
    fn forwardable_text_accumulates_across_pushes() {
        let mut ext = SegmentExtractor::new();
        let (fwd1, _) = ext.push_token("Hello");
        let (fwd2, _) = ext.push_token(" world.");
        assert_eq!(fwd1, "Hello");
        assert_eq!(fwd2, " world.");
    }
}
