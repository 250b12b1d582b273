//! Host text-field interface.
//!
//! The keyboard never owns the text it edits. Everything it knows about the
//! host buffer comes through [`TextFieldPeer`], a narrow command/query API
//! whose calls can fail at any time, plus the asynchronous
//! [`SelectionChange`] notification the host sends after the selection or
//! composing span moves.
//!
//! All offsets are absolute positions in the host text, counted in `char`s.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Kind of text field being edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldKind {
    /// Free-form text input (default)
    #[default]
    Text,
    /// Email address
    Email,
    /// URL
    Url,
    /// Password (no composing, no suggestions, no learning)
    Password,
    /// Number input
    Number,
    /// Phone number
    Phone,
}

impl FieldKind {
    /// Fields where every keystroke is committed directly, without a
    /// composing session.
    pub fn is_direct_commit(self) -> bool {
        matches!(self, FieldKind::Password | FieldKind::Number | FieldKind::Phone)
    }
}

/// Action the host attaches to the Enter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorAction {
    Go,
    Search,
    Send,
    Next,
    Done,
}

/// Description of the field an input episode targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldInfo {
    pub kind: FieldKind,
    pub multiline: bool,
    pub action: Option<EditorAction>,
}

impl FieldInfo {
    pub fn text() -> Self {
        Self::default()
    }

    pub fn with_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }
}

/// A selection in the host text. `start == end` is a caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    pub start: usize,
    pub end: usize,
}

impl Selection {
    pub fn caret(pos: usize) -> Self {
        Self { start: pos, end: pos }
    }

    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn is_caret(&self) -> bool {
        self.start == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// The host's inbound selection notification.
///
/// Delivered asynchronously, after the edit that caused it, and possibly
/// after further edits have already been issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    pub old: Selection,
    pub new: Selection,
    /// Composing span as the host currently sees it.
    pub composing: Option<Range<usize>>,
}

impl SelectionChange {
    pub fn new(old: Selection, new: Selection, composing: Option<Range<usize>>) -> Self {
        Self { old, new, composing }
    }
}

/// Command/query interface to the host text field.
///
/// Every call may fail with [`HostError`]; callers go through
/// [`crate::bridge::TextFieldBridge`], which decides how failures are absorbed.
pub trait TextFieldPeer {
    /// Up to `n` chars immediately before the selection start.
    fn text_before_cursor(&self, n: usize) -> Result<String, HostError>;

    /// Up to `n` chars immediately after the selection end.
    fn text_after_cursor(&self, n: usize) -> Result<String, HostError>;

    /// The selected text, `None` when the selection is a caret.
    fn selected_text(&self) -> Result<Option<String>, HostError>;

    /// Current selection in absolute offsets.
    fn selection(&self) -> Result<Selection, HostError>;

    /// Replace the composing span (or the selection when nothing is
    /// composing) with `text` and mark it as composing.
    ///
    /// `cursor_hint > 0` places the caret `cursor_hint - 1` chars after the
    /// new text; `cursor_hint <= 0` places it `-cursor_hint` chars before it.
    fn set_composing_text(&mut self, text: &str, cursor_hint: i32) -> Result<(), HostError>;

    /// Mark existing text `[start, end)` as the composing span.
    fn set_composing_region(&mut self, start: usize, end: usize) -> Result<(), HostError>;

    /// Drop the composing mark, keeping the text.
    fn finish_composing_text(&mut self) -> Result<(), HostError>;

    /// Replace the composing span (or the selection) with `text` as plain
    /// committed text. Same `cursor_hint` convention as
    /// [`set_composing_text`](Self::set_composing_text).
    fn commit_text(&mut self, text: &str, cursor_hint: i32) -> Result<(), HostError>;

    /// Delete `before` chars before the selection and `after` chars after it.
    fn delete_surrounding_text(&mut self, before: usize, after: usize) -> Result<(), HostError>;

    fn set_selection(&mut self, start: usize, end: usize) -> Result<(), HostError>;

    fn perform_editor_action(&mut self, action: EditorAction) -> Result<(), HostError>;

    fn begin_batch_edit(&mut self) -> Result<(), HostError>;

    fn end_batch_edit(&mut self) -> Result<(), HostError>;
}
