//! Text-Field Bridge.
//!
//! The only component that talks to the host text field. Reads are bounded
//! and absorb failures (an unreadable field looks empty, which the session's
//! read-back check then treats as a desync). Mutations return
//! `Result<_, HostError>` so the engine can take its fail-safe path, and
//! multi-step mutations run inside [`TextFieldBridge::batch`] so the host
//! never observes a half-applied edit.
//!
//! The bridge also implements recomposition: recovering the word around a
//! bare caret from committed text and re-marking it as composing.

use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::error::HostError;
use crate::host::{EditorAction, Selection, TextFieldPeer};
use crate::utils::{is_word_char, is_word_connector};

/// How much text is read when looking for the grapheme before the caret.
const GRAPHEME_LOOKBEHIND: usize = 16;

/// A word recovered from committed text around the caret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordSpan {
    /// Absolute offset where the word starts.
    pub start: usize,
    pub text: String,
    /// Caret offset inside the word.
    pub cursor: usize,
}

impl WordSpan {
    pub fn end(&self) -> usize {
        self.start + self.text.chars().count()
    }
}

/// Defensive wrapper around a [`TextFieldPeer`].
#[derive(Debug)]
pub struct TextFieldBridge<P> {
    peer: P,
}

impl<P: TextFieldPeer> TextFieldBridge<P> {
    pub fn new(peer: P) -> Self {
        Self { peer }
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    // ========== Reads ==========

    /// Up to `n` chars before the cursor; empty on failure.
    pub fn text_before_cursor(&self, n: usize) -> String {
        self.peer.text_before_cursor(n).unwrap_or_else(|e| {
            warn!(error = %e, "text_before_cursor failed");
            String::new()
        })
    }

    /// Up to `n` chars after the cursor; empty on failure.
    pub fn text_after_cursor(&self, n: usize) -> String {
        self.peer.text_after_cursor(n).unwrap_or_else(|e| {
            warn!(error = %e, "text_after_cursor failed");
            String::new()
        })
    }

    pub fn selected_text(&self) -> Option<String> {
        self.peer.selected_text().unwrap_or_else(|e| {
            warn!(error = %e, "selected_text failed");
            None
        })
    }

    pub fn selection(&self) -> Option<Selection> {
        match self.peer.selection() {
            Ok(sel) => Some(sel),
            Err(e) => {
                warn!(error = %e, "selection query failed");
                None
            }
        }
    }

    /// Read `[start, start + len)` from the host, or `None` if any part of
    /// the span could not be read in full.
    pub fn read_span(&self, start: usize, len: usize) -> Option<String> {
        let sel = self.selection()?;
        let end = start + len;
        let mut out = String::with_capacity(len);

        if start < sel.start {
            let want = sel.start - start;
            let before = self.text_before_cursor(want);
            if before.chars().count() != want {
                return None;
            }
            out.extend(before.chars().take(end.min(sel.start) - start));
        }

        // A caret contributes nothing; the reads on either side cover the span
        if !sel.is_caret() && end > sel.start && start < sel.end {
            let selected = self.selected_text()?;
            let from = start.max(sel.start) - sel.start;
            let to = end.min(sel.end) - sel.start;
            out.extend(selected.chars().skip(from).take(to - from));
        }

        if end > sel.end {
            let want = end - sel.end;
            let after = self.text_after_cursor(want);
            if after.chars().count() != want {
                return None;
            }
            out.extend(after.chars().skip(start.saturating_sub(sel.end)));
        }

        Some(out)
    }

    /// Whether the host text at `start` matches `expected` exactly.
    pub fn span_matches(&self, start: usize, expected: &str) -> bool {
        let len = expected.chars().count();
        match self.read_span(start, len) {
            Some(actual) => actual == expected,
            None => false,
        }
    }

    // ========== Mutations ==========

    /// Run `f` inside a host batch edit. The batch is closed even when `f`
    /// fails; the first error wins.
    pub fn batch<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, HostError>,
    ) -> Result<R, HostError> {
        self.peer.begin_batch_edit()?;
        let result = f(self);
        let closed = self.peer.end_batch_edit();
        let value = result?;
        closed?;
        Ok(value)
    }

    pub fn set_composing_text(&mut self, text: &str, cursor_hint: i32) -> Result<(), HostError> {
        self.peer.set_composing_text(text, cursor_hint)
    }

    pub fn set_composing_region(&mut self, start: usize, end: usize) -> Result<(), HostError> {
        self.peer.set_composing_region(start, end)
    }

    pub fn finish_composing_text(&mut self) -> Result<(), HostError> {
        self.peer.finish_composing_text()
    }

    pub fn commit_text(&mut self, text: &str, cursor_hint: i32) -> Result<(), HostError> {
        self.peer.commit_text(text, cursor_hint)
    }

    pub fn delete_surrounding_text(&mut self, before: usize, after: usize) -> Result<(), HostError> {
        self.peer.delete_surrounding_text(before, after)
    }

    pub fn set_selection(&mut self, start: usize, end: usize) -> Result<(), HostError> {
        self.peer.set_selection(start, end)
    }

    pub fn perform_editor_action(&mut self, action: EditorAction) -> Result<(), HostError> {
        self.peer.perform_editor_action(action)
    }

    /// Delete committed text before the caret: the selected range if there
    /// is one, else one grapheme cluster. Returns the number of chars removed.
    pub fn delete_before_cursor(&mut self) -> Result<usize, HostError> {
        if let Some(selected) = self.selected_text() {
            let n = selected.chars().count();
            self.peer.commit_text("", 1)?;
            return Ok(n);
        }

        let before = self.text_before_cursor(GRAPHEME_LOOKBEHIND);
        let n = before
            .graphemes(true)
            .next_back()
            .map(|g| g.chars().count())
            .unwrap_or(0);
        if n > 0 {
            self.peer.delete_surrounding_text(n, 0)?;
        }
        Ok(n)
    }

    // ========== Recomposition ==========

    /// Find the word touching the caret, scanning at most `limit` chars in
    /// each direction. Connectors (apostrophe, hyphen) only count inside a
    /// word.
    pub fn word_around_cursor(&self, limit: usize) -> Option<WordSpan> {
        let sel = self.selection()?;
        if !sel.is_caret() {
            return None;
        }

        let before: Vec<char> = self.text_before_cursor(limit).chars().collect();
        let after: Vec<char> = self.text_after_cursor(limit).chars().collect();

        let back = before
            .iter()
            .rev()
            .take_while(|c| is_word_char(**c))
            .count();
        let forward = after.iter().take_while(|c| is_word_char(**c)).count();

        let mut word: Vec<char> = before[before.len() - back..]
            .iter()
            .chain(after[..forward].iter())
            .copied()
            .collect();
        let mut start = sel.start - back;
        let mut cursor = back;

        // Connectors at either edge belong to the surrounding text
        let lead = word.iter().take_while(|c| is_word_connector(**c)).count();
        if lead > cursor {
            return None;
        }
        word.drain(..lead);
        start += lead;
        cursor -= lead;
        let trail = word.iter().rev().take_while(|c| is_word_connector(**c)).count();
        word.truncate(word.len() - trail);
        if cursor > word.len() || !word.iter().any(|c| c.is_alphanumeric()) {
            return None;
        }

        Some(WordSpan {
            start,
            text: word.into_iter().collect(),
            cursor,
        })
    }

    /// Re-anchor a composing region over the word around the caret.
    ///
    /// Returns `Ok(None)` when the caret does not touch a word.
    pub fn recompose(&mut self, limit: usize) -> Result<Option<WordSpan>, HostError> {
        let Some(span) = self.word_around_cursor(limit) else {
            return Ok(None);
        };
        debug!(word = %span.text, start = span.start, "recomposing word at caret");
        let end = span.end();
        self.peer.set_composing_region(span.start, end)?;
        Ok(Some(span))
    }
}
