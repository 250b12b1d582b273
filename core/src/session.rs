//! Composing session management.
//!
//! `ComposingSession` is the authoritative model of the word currently being
//! typed: its display buffer, derived linguistic state, where it sits in the
//! host text, and the monotonic `sequence` counter that every asynchronous
//! result is checked against before it may touch the session.
//!
//! The session is owned by the engine's main sequencing context and is never
//! shared with worker tasks; workers get a [`SessionSnapshot`] instead.

use std::ops::Range;

use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::bridge::TextFieldBridge;
use crate::candidate::Suggestion;
use crate::confirmation::SpellConfirmation;
use crate::host::TextFieldPeer;
use crate::utils;

/// Linguistic state derived from the buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WordState {
    /// NFC, lowercased form used for dictionary lookups.
    pub normalized_buffer: String,
    pub grapheme_count: usize,
    /// Suggestions currently shown for this word, already cased.
    pub suggestions: Vec<Suggestion>,
    pub is_from_swipe: bool,
    pub requires_spell_check: bool,
    pub has_content: bool,
    /// Validity of `normalized_buffer`, once the pipeline has computed it.
    pub validity: Option<bool>,
}

impl WordState {
    fn derive(buffer: &str, is_from_swipe: bool) -> Self {
        let normalized_buffer = utils::normalize(buffer).to_lowercase();
        let has_content = !buffer.is_empty();
        Self {
            grapheme_count: buffer.graphemes(true).count(),
            requires_spell_check: has_content
                && !is_from_swipe
                && buffer.chars().any(char::is_alphabetic),
            normalized_buffer,
            suggestions: Vec::new(),
            is_from_swipe,
            has_content,
            validity: None,
        }
    }
}

/// What a backspace inside the session removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletedExtent {
    /// One grapheme cluster was removed from the buffer.
    Removed {
        /// Logical cursor offset after the deletion, in chars.
        cursor: usize,
        text: String,
    },
    /// The logical cursor is at the start of the word; the deletion belongs
    /// to committed text before it.
    DeferToHost,
}

/// `(sequence, buffer)` captured when asynchronous work is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub sequence: u64,
    pub buffer: String,
}

/// The live model of the word being composed.
#[derive(Debug, Clone, Default)]
pub struct ComposingSession {
    buffer: String,
    word_state: WordState,
    region_start: Option<usize>,
    sequence: u64,
    actively_editing: bool,
    suspended: bool,
    confirmation: SpellConfirmation,
    at_sentence_start: bool,
    manual_shifted: bool,
}

impl ComposingSession {
    /// Create a new empty session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn word_state(&self) -> &WordState {
        &self.word_state
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Length of the buffer in chars.
    pub fn len(&self) -> usize {
        self.buffer.chars().count()
    }

    pub fn region_start(&self) -> Option<usize> {
        self.region_start
    }

    /// Absolute span the buffer occupies in the host text.
    pub fn region(&self) -> Option<Range<usize>> {
        self.region_start.map(|s| s..s + self.len())
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Invalidate every outstanding snapshot.
    pub fn bump_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            sequence: self.sequence,
            buffer: self.buffer.clone(),
        }
    }

    /// Whether a result computed against `snapshot` may still be applied.
    pub fn accepts(&self, snapshot: &SessionSnapshot) -> bool {
        self.sequence == snapshot.sequence && self.buffer == snapshot.buffer
    }

    pub fn is_actively_editing(&self) -> bool {
        self.actively_editing
    }

    pub fn set_actively_editing(&mut self, editing: bool) {
        self.actively_editing = editing;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Keep the word but stop editing it (an external selection range).
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn confirmation(&self) -> &SpellConfirmation {
        &self.confirmation
    }

    pub fn confirmation_mut(&mut self) -> &mut SpellConfirmation {
        &mut self.confirmation
    }

    pub fn is_at_sentence_start(&self) -> bool {
        self.at_sentence_start
    }

    pub fn is_manual_shifted(&self) -> bool {
        self.manual_shifted
    }

    /// Record the casing intent captured at word start.
    pub fn set_casing(&mut self, at_sentence_start: bool, manual_shifted: bool) {
        self.at_sentence_start = at_sentence_start;
        self.manual_shifted = manual_shifted;
    }

    /// Logical cursor inside the buffer for a host caret position, clamped
    /// to `[0, len]`. Unanchored sessions edit at the end.
    pub fn logical_cursor(&self, host_cursor: usize) -> usize {
        match self.region_start {
            Some(start) => host_cursor.saturating_sub(start).min(self.len()),
            None => self.len(),
        }
    }

    /// Insert `text` at the logical cursor derived from `host_cursor`.
    ///
    /// The first insertion anchors the session at `host_cursor`. Returns the
    /// logical cursor after the insertion.
    pub fn insert_at_cursor(&mut self, text: &str, host_cursor: usize) -> usize {
        if self.buffer.is_empty() {
            self.region_start = Some(host_cursor);
        }
        let offset = self.logical_cursor(host_cursor);
        let byte = utils::char_to_byte(&self.buffer, offset);
        self.buffer.insert_str(byte, text);
        self.word_state.is_from_swipe = false;
        self.refresh();
        offset + text.chars().count()
    }

    /// Remove the grapheme cluster ending at the logical cursor.
    pub fn delete_before_cursor(&mut self, host_cursor: usize) -> DeletedExtent {
        let offset = self.logical_cursor(host_cursor);
        if offset == 0 {
            return DeletedExtent::DeferToHost;
        }
        let end = utils::char_to_byte(&self.buffer, offset);
        let Some((start, grapheme)) = self.buffer[..end].grapheme_indices(true).next_back() else {
            return DeletedExtent::DeferToHost;
        };
        let text = grapheme.to_string();
        self.buffer.replace_range(start..end, "");
        self.word_state.is_from_swipe = false;
        self.refresh();
        DeletedExtent::Removed {
            cursor: offset - text.chars().count(),
            text,
        }
    }

    /// Start a session over an existing word (recomposition or a gesture).
    pub fn start_word(&mut self, word: &str, region_start: usize, is_from_swipe: bool) {
        self.reset();
        self.buffer = word.to_string();
        self.region_start = Some(region_start);
        self.word_state = WordState::derive(&self.buffer, is_from_swipe);
    }

    /// Replace the buffer with a re-cased form of the same word.
    pub fn replace_buffer(&mut self, text: &str) {
        if self.buffer != text {
            self.buffer = text.to_string();
            self.refresh();
        }
    }

    /// Store pipeline output for the current buffer.
    pub fn set_suggestions(&mut self, suggestions: Vec<Suggestion>, validity: Option<bool>) {
        self.word_state.suggestions = suggestions;
        self.word_state.validity = validity;
    }

    /// Clear the word, its anchor and all per-word flags.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.word_state = WordState::default();
        self.region_start = None;
        self.suspended = false;
        self.confirmation.reset();
        self.at_sentence_start = false;
        self.manual_shifted = false;
        self.bump_sequence();
    }

    /// Check the session against the host text and reset on mismatch.
    ///
    /// Returns `true` when the buffer is still exactly what the host shows
    /// at the composing region (trivially true for an empty session).
    pub fn ensure_synced<P: TextFieldPeer>(&mut self, bridge: &TextFieldBridge<P>) -> bool {
        if self.buffer.is_empty() {
            return true;
        }
        let in_sync = match self.region_start {
            Some(start) => bridge.span_matches(start, &self.buffer),
            None => false,
        };
        if !in_sync {
            debug!(buffer = %self.buffer, region = ?self.region(), "composing region desynchronized");
            self.reset();
        }
        in_sync
    }

    fn refresh(&mut self) {
        let is_from_swipe = self.word_state.is_from_swipe;
        self.word_state = WordState::derive(&self.buffer, is_from_swipe);
        if self.buffer.is_empty() {
            self.region_start = None;
        }
        self.bump_sequence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_field::MemoryTextField;

    #[test]
    fn test_first_insert_anchors_region() {
        let mut session = ComposingSession::new();
        assert_eq!(session.insert_at_cursor("h", 7), 1);
        assert_eq!(session.region_start(), Some(7));
        assert_eq!(session.insert_at_cursor("i", 8), 2);
        assert_eq!(session.buffer(), "hi");
        assert_eq!(session.region(), Some(7..9));
    }

    #[test]
    fn test_insert_in_middle() {
        let mut session = ComposingSession::new();
        session.insert_at_cursor("hllo", 0);
        assert_eq!(session.insert_at_cursor("e", 1), 2);
        assert_eq!(session.buffer(), "hello");
    }

    #[test]
    fn test_logical_cursor_is_clamped() {
        let mut session = ComposingSession::new();
        session.insert_at_cursor("abc", 10);
        assert_eq!(session.logical_cursor(2), 0);
        assert_eq!(session.logical_cursor(11), 1);
        assert_eq!(session.logical_cursor(99), 3);
    }

    #[test]
    fn test_delete_removes_grapheme_cluster() {
        let mut session = ComposingSession::new();
        session.insert_at_cursor("cafe\u{301}", 0);
        let deleted = session.delete_before_cursor(5);
        assert_eq!(
            deleted,
            DeletedExtent::Removed {
                cursor: 3,
                text: "e\u{301}".to_string()
            }
        );
        assert_eq!(session.buffer(), "caf");
    }

    #[test]
    fn test_delete_at_word_start_defers() {
        let mut session = ComposingSession::new();
        session.insert_at_cursor("word", 4);
        assert_eq!(session.delete_before_cursor(4), DeletedExtent::DeferToHost);
        assert_eq!(session.buffer(), "word");
    }

    #[test]
    fn test_deleting_last_char_unanchors() {
        let mut session = ComposingSession::new();
        session.insert_at_cursor("a", 3);
        session.delete_before_cursor(4);
        assert!(session.is_empty());
        assert_eq!(session.region(), None);
    }

    #[test]
    fn test_every_mutation_bumps_sequence() {
        let mut session = ComposingSession::new();
        let mut last = session.sequence();
        session.insert_at_cursor("a", 0);
        assert!(session.sequence() > last);
        last = session.sequence();
        session.delete_before_cursor(1);
        assert!(session.sequence() > last);
        last = session.sequence();
        session.reset();
        assert!(session.sequence() > last);
        last = session.sequence();
        session.start_word("word", 0, false);
        assert!(session.sequence() > last);
    }

    #[test]
    fn test_snapshot_acceptance() {
        let mut session = ComposingSession::new();
        session.insert_at_cursor("hel", 0);
        let snapshot = session.snapshot();
        assert!(session.accepts(&snapshot));

        session.insert_at_cursor("l", 3);
        assert!(!session.accepts(&snapshot));
    }

    #[test]
    fn test_word_state_derivation() {
        let mut session = ComposingSession::new();
        session.insert_at_cursor("Cafe\u{301}", 0);
        let state = session.word_state();
        assert_eq!(state.normalized_buffer, "caf\u{e9}");
        assert_eq!(state.grapheme_count, 4);
        assert!(state.requires_spell_check);
        assert!(state.has_content);

        session.start_word("swiped", 0, true);
        assert!(session.word_state().is_from_swipe);
        assert!(!session.word_state().requires_spell_check);
    }

    #[test]
    fn test_ensure_synced_resets_on_mismatch() {
        let mut field = MemoryTextField::new();
        field.set_composing_text("hel", 1).unwrap();
        let mut bridge = TextFieldBridge::new(field);

        let mut session = ComposingSession::new();
        session.insert_at_cursor("hel", 0);
        assert!(session.ensure_synced(&bridge));

        bridge.peer_mut().external_replace(0..3, "xyz");
        let before = session.sequence();
        assert!(!session.ensure_synced(&bridge));
        assert!(session.is_empty());
        assert_eq!(session.region(), None);
        assert!(session.sequence() > before);
    }
}
