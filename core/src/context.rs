//! Keyboard UI context.
//!
//! The `ImeContext` struct is a simple data container with public fields the
//! keyboard UI reads after every event handled by the engine: the suggestion
//! strip, whether the composing word is flagged as misspelled, and the shift
//! state the key caps should show.
//!
//! Design philosophy: just data transfer. The engine writes, the UI reads.

use serde::Serialize;

use crate::casing::ShiftState;
use crate::host::FieldKind;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImeContext {
    /// Word currently being composed (mirrors the host's composing span)
    pub composing_text: String,

    /// Suggestion strip, best first
    pub candidates: Vec<String>,

    /// The strip holds next-word predictions rather than word suggestions
    pub showing_predictions: bool,

    /// Composing word failed validation and awaits confirmation
    pub highlight_misspelled: bool,

    /// Validity of the composing word, once known
    pub validity: Option<bool>,

    pub shift: ShiftState,

    /// Kind of field being edited (`None` outside an input episode)
    pub field_kind: Option<FieldKind>,
}

impl ImeContext {
    pub fn new() -> Self {
        Self::default()
    }
}
