//! Selection Consistency Tracker.
//!
//! Host selection notifications arrive asynchronously and can trail the
//! edits the keyboard itself issued. The tracker remembers where the
//! keyboard expects the caret to land after each of its own edits and
//! classifies every notification as one of:
//!
//! - `LocalEcho`: a position the keyboard just produced
//! - `Sequential`: a small move consistent with typing inside the word
//! - `NonSequentialJump`: the caret went somewhere else
//! - `ExternalExtension`: a range selection the keyboard did not make

use std::collections::VecDeque;
use std::ops::Range;

use tracing::debug;

use crate::host::{Selection, SelectionChange};

/// Echoes older than this are assumed lost.
const MAX_PENDING_ECHOES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionClass {
    LocalEcho,
    Sequential,
    NonSequentialJump,
    ExternalExtension,
}

impl SelectionClass {
    /// Whether the notification requires no action.
    pub fn is_benign(self) -> bool {
        matches!(self, SelectionClass::LocalEcho | SelectionClass::Sequential)
    }
}

#[derive(Debug, Clone)]
pub struct SelectionTracker {
    expected: VecDeque<Selection>,
    last_known_cursor: usize,
    drift_threshold: usize,
}

impl Default for SelectionTracker {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SelectionTracker {
    pub fn new(drift_threshold: usize) -> Self {
        Self {
            expected: VecDeque::new(),
            last_known_cursor: 0,
            drift_threshold,
        }
    }

    pub fn last_known_cursor(&self) -> usize {
        self.last_known_cursor
    }

    /// Oldest echo still awaited.
    pub fn expected_position(&self) -> Option<Selection> {
        self.expected.front().copied()
    }

    pub fn pending_echoes(&self) -> usize {
        self.expected.len()
    }

    /// Record the selection a just-issued edit should produce.
    pub fn expect(&mut self, selection: Selection) {
        if self.expected.back() == Some(&selection) {
            return;
        }
        if self.expected.len() == MAX_PENDING_ECHOES {
            self.expected.pop_front();
        }
        self.expected.push_back(selection);
    }

    /// Forget pending echoes and re-seed the known caret.
    pub fn reset(&mut self, cursor: usize) {
        self.expected.clear();
        self.last_known_cursor = cursor;
    }

    /// Classify a notification.
    ///
    /// `region` is the live composing region (if any) and `actively_editing`
    /// is set while the engine is inside one of its own edits.
    pub fn classify(
        &mut self,
        change: &SelectionChange,
        region: Option<Range<usize>>,
        actively_editing: bool,
    ) -> SelectionClass {
        let new = change.new;
        let previous = self.last_known_cursor;
        self.last_known_cursor = new.end;

        if actively_editing {
            return SelectionClass::LocalEcho;
        }

        if let Some(idx) = self.expected.iter().position(|e| *e == new) {
            // Echoes are delivered in order; anything before the match was coalesced
            self.expected.drain(..=idx);
            return SelectionClass::LocalEcho;
        }

        if !new.is_caret() {
            debug!(?new, "selection extended externally");
            return SelectionClass::ExternalExtension;
        }

        let caret = new.start;
        let drift = caret.abs_diff(previous);
        let inside = region
            .as_ref()
            .map_or(true, |r| caret >= r.start && caret <= r.end);

        let class = if drift == 0 || (drift <= self.drift_threshold && inside) {
            SelectionClass::Sequential
        } else {
            self.expected.clear();
            SelectionClass::NonSequentialJump
        };
        debug!(caret, previous, drift, ?region, ?class, "classified selection update");
        class
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moved(from: usize, to: usize) -> SelectionChange {
        SelectionChange::new(Selection::caret(from), Selection::caret(to), None)
    }

    #[test]
    fn test_expected_positions_are_echoes() {
        let mut tracker = SelectionTracker::new(1);
        tracker.expect(Selection::caret(1));
        tracker.expect(Selection::caret(2));
        assert_eq!(
            tracker.classify(&moved(0, 1), Some(0..1), false),
            SelectionClass::LocalEcho
        );
        assert_eq!(tracker.pending_echoes(), 1);
        assert_eq!(
            tracker.classify(&moved(1, 2), Some(0..2), false),
            SelectionClass::LocalEcho
        );
        assert_eq!(tracker.expected_position(), None);
    }

    #[test]
    fn test_coalesced_echo_drains_older_entries() {
        let mut tracker = SelectionTracker::new(1);
        for pos in 1..=4 {
            tracker.expect(Selection::caret(pos));
        }
        // Host only reported the last position
        assert_eq!(
            tracker.classify(&moved(0, 4), Some(0..4), false),
            SelectionClass::LocalEcho
        );
        assert_eq!(tracker.pending_echoes(), 0);
    }

    #[test]
    fn test_actively_editing_is_echo() {
        let mut tracker = SelectionTracker::new(1);
        assert_eq!(
            tracker.classify(&moved(0, 30), None, true),
            SelectionClass::LocalEcho
        );
        assert_eq!(tracker.last_known_cursor(), 30);
    }

    #[test]
    fn test_small_move_inside_region_is_sequential() {
        let mut tracker = SelectionTracker::new(1);
        tracker.reset(5);
        assert_eq!(
            tracker.classify(&moved(5, 4), Some(2..6), false),
            SelectionClass::Sequential
        );
    }

    #[test]
    fn test_jump_beyond_threshold() {
        let mut tracker = SelectionTracker::new(1);
        tracker.reset(5);
        tracker.expect(Selection::caret(6));
        assert_eq!(
            tracker.classify(&moved(5, 12), Some(2..6), false),
            SelectionClass::NonSequentialJump
        );
        // Stale echoes are dropped
        assert_eq!(tracker.pending_echoes(), 0);
    }

    #[test]
    fn test_small_move_outside_region_is_jump() {
        let mut tracker = SelectionTracker::new(1);
        tracker.reset(2);
        assert_eq!(
            tracker.classify(&moved(2, 1), Some(2..6), false),
            SelectionClass::NonSequentialJump
        );
    }

    #[test]
    fn test_range_is_external_extension() {
        let mut tracker = SelectionTracker::new(1);
        tracker.reset(4);
        let change = SelectionChange::new(Selection::caret(4), Selection::new(1, 4), Some(0..4));
        assert_eq!(
            tracker.classify(&change, Some(0..4), false),
            SelectionClass::ExternalExtension
        );
        assert!(!SelectionClass::ExternalExtension.is_benign());
    }

    #[test]
    fn test_echo_queue_is_bounded() {
        let mut tracker = SelectionTracker::new(1);
        for pos in 0..20 {
            tracker.expect(Selection::caret(pos));
        }
        assert_eq!(tracker.pending_echoes(), MAX_PENDING_ECHOES);
        assert_eq!(tracker.expected_position(), Some(Selection::caret(12)));
    }
}
