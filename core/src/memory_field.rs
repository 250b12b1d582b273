//! In-memory host text field.
//!
//! `MemoryTextField` implements [`TextFieldPeer`] over a plain `String` and
//! behaves the way a host editor does from the keyboard's point of view:
//! a composing span, a selection, nested batch edits that publish a single
//! selection notification when the outermost batch closes, and a
//! disconnection switch to exercise failure paths.
//!
//! Notifications are queued rather than delivered; the driver (a test or the
//! simulator) takes them with [`MemoryTextField::take_selection_updates`] and
//! feeds them to the engine, which mirrors how the real notification arrives
//! later on the main context.

use std::ops::Range;

use crate::error::HostError;
use crate::host::{EditorAction, Selection, SelectionChange, TextFieldPeer};

/// Host-side text buffer with selection and composing tracking.
#[derive(Debug, Clone, Default)]
pub struct MemoryTextField {
    chars: Vec<char>,
    selection: Selection,
    composing: Option<Range<usize>>,
    batch_depth: usize,
    // State published by the last notification
    published: Selection,
    published_composing: Option<Range<usize>>,
    pending: Vec<SelectionChange>,
    actions: Vec<EditorAction>,
    connected: bool,
}

impl MemoryTextField {
    /// Create an empty connected field.
    pub fn new() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    /// Create a field holding `text` with the caret at the end.
    pub fn with_text(text: &str) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let caret = Selection::caret(chars.len());
        Self {
            chars,
            selection: caret,
            published: caret,
            connected: true,
            ..Self::default()
        }
    }

    /// The whole host text.
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn cursor(&self) -> Selection {
        self.selection
    }

    pub fn composing_region(&self) -> Option<Range<usize>> {
        self.composing.clone()
    }

    /// Text currently marked as composing.
    pub fn composing_text(&self) -> Option<String> {
        self.composing
            .as_ref()
            .map(|r| self.chars[r.clone()].iter().collect())
    }

    /// Editor actions performed so far.
    pub fn actions(&self) -> &[EditorAction] {
        &self.actions
    }

    /// Simulate the connection being torn down (or restored).
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Drain queued selection notifications, oldest first.
    pub fn take_selection_updates(&mut self) -> Vec<SelectionChange> {
        std::mem::take(&mut self.pending)
    }

    /// Edit made by someone other than the keyboard (another app,
    /// autocomplete, a programmatic change). Replaces `range` with `text`,
    /// drops the composing mark, and moves the caret to the end of the
    /// insertion.
    pub fn external_replace(&mut self, range: Range<usize>, text: &str) {
        let end = range.end.min(self.chars.len());
        let start = range.start.min(end);
        let inserted: Vec<char> = text.chars().collect();
        let caret = start + inserted.len();
        self.chars.splice(start..end, inserted);
        self.composing = None;
        self.selection = Selection::caret(caret);
        self.publish();
    }

    /// The user moved the selection (tap, drag, arrow keys).
    pub fn user_select(&mut self, start: usize, end: usize) {
        let len = self.chars.len();
        self.selection = Selection::new(start.min(len), end.min(len));
        self.publish();
    }

    fn check(&self) -> Result<(), HostError> {
        if self.connected {
            Ok(())
        } else {
            Err(HostError::Disconnected)
        }
    }

    fn check_range(&self, start: usize, end: usize) -> Result<(), HostError> {
        if start > end || end > self.chars.len() {
            return Err(HostError::InvalidRange {
                start,
                end,
                len: self.chars.len(),
            });
        }
        Ok(())
    }

    /// Span an insertion replaces: the composing span, else the selection.
    fn replacement_target(&self) -> Range<usize> {
        match &self.composing {
            Some(r) => r.clone(),
            None => self.selection.start..self.selection.end,
        }
    }

    fn replace(&mut self, text: &str, cursor_hint: i32, composing: bool) {
        let target = self.replacement_target();
        let inserted: Vec<char> = text.chars().collect();
        let start = target.start;
        let new_end = start + inserted.len();
        self.chars.splice(target, inserted);

        self.composing = if composing && start != new_end {
            Some(start..new_end)
        } else {
            None
        };

        let caret = if cursor_hint > 0 {
            new_end + (cursor_hint as usize - 1)
        } else {
            start.saturating_sub(cursor_hint.unsigned_abs() as usize)
        };
        self.selection = Selection::caret(caret.min(self.chars.len()));
    }

    fn publish(&mut self) {
        if self.batch_depth > 0 {
            return;
        }
        if self.selection != self.published || self.composing != self.published_composing {
            self.pending.push(SelectionChange::new(
                self.published,
                self.selection,
                self.composing.clone(),
            ));
            self.published = self.selection;
            self.published_composing = self.composing.clone();
        }
    }
}

impl TextFieldPeer for MemoryTextField {
    fn text_before_cursor(&self, n: usize) -> Result<String, HostError> {
        self.check()?;
        let end = self.selection.start;
        let start = end.saturating_sub(n);
        Ok(self.chars[start..end].iter().collect())
    }

    fn text_after_cursor(&self, n: usize) -> Result<String, HostError> {
        self.check()?;
        let start = self.selection.end;
        let end = (start + n).min(self.chars.len());
        Ok(self.chars[start..end].iter().collect())
    }

    fn selected_text(&self) -> Result<Option<String>, HostError> {
        self.check()?;
        if self.selection.is_caret() {
            return Ok(None);
        }
        Ok(Some(
            self.chars[self.selection.start..self.selection.end]
                .iter()
                .collect(),
        ))
    }

    fn selection(&self) -> Result<Selection, HostError> {
        self.check()?;
        Ok(self.selection)
    }

    fn set_composing_text(&mut self, text: &str, cursor_hint: i32) -> Result<(), HostError> {
        self.check()?;
        self.replace(text, cursor_hint, true);
        self.publish();
        Ok(())
    }

    fn set_composing_region(&mut self, start: usize, end: usize) -> Result<(), HostError> {
        self.check()?;
        self.check_range(start, end)?;
        self.composing = if start == end { None } else { Some(start..end) };
        self.publish();
        Ok(())
    }

    fn finish_composing_text(&mut self) -> Result<(), HostError> {
        self.check()?;
        self.composing = None;
        self.publish();
        Ok(())
    }

    fn commit_text(&mut self, text: &str, cursor_hint: i32) -> Result<(), HostError> {
        self.check()?;
        self.replace(text, cursor_hint, false);
        self.publish();
        Ok(())
    }

    fn delete_surrounding_text(&mut self, before: usize, after: usize) -> Result<(), HostError> {
        self.check()?;
        let sel = self.selection;
        let after_end = (sel.end + after).min(self.chars.len());
        let before_start = sel.start.saturating_sub(before);
        self.chars.drain(sel.end..after_end);
        self.chars.drain(before_start..sel.start);
        let removed_before = sel.start - before_start;
        self.selection = Selection::new(sel.start - removed_before, sel.end - removed_before);
        if let Some(r) = self.composing.take() {
            // A composing span touched by the deletion is dropped
            if r.end <= before_start {
                self.composing = Some(r);
            } else if r.start >= after_end {
                let shift = removed_before + (after_end - sel.end);
                self.composing = Some(r.start - shift..r.end - shift);
            }
        }
        self.publish();
        Ok(())
    }

    fn set_selection(&mut self, start: usize, end: usize) -> Result<(), HostError> {
        self.check()?;
        let (lo, hi) = (start.min(end), start.max(end));
        self.check_range(lo, hi)?;
        self.selection = Selection::new(lo, hi);
        self.publish();
        Ok(())
    }

    fn perform_editor_action(&mut self, action: EditorAction) -> Result<(), HostError> {
        self.check()?;
        self.actions.push(action);
        Ok(())
    }

    fn begin_batch_edit(&mut self) -> Result<(), HostError> {
        self.check()?;
        self.batch_depth += 1;
        Ok(())
    }

    fn end_batch_edit(&mut self) -> Result<(), HostError> {
        self.check()?;
        self.batch_depth = self.batch_depth.saturating_sub(1);
        self.publish();
        Ok(())
    }
}
