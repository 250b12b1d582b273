//! Suggestion types.
//!
//! This module provides:
//! - `Suggestion`: a single entry in the suggestion strip
//! - `SuggestionStrip`: the ordered, size-capped list the UI shows

use serde::{Deserialize, Serialize};

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuggestionKind {
    /// The word exactly as typed.
    Typed,
    /// A spelling alternative for the typed word.
    Correction,
    /// A bigram continuation shown after a commit.
    Prediction,
}

/// A single suggestion with an associated rank score.
///
/// Scores are on a relative scale; higher is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub score: f32,
    pub kind: SuggestionKind,
}

impl Suggestion {
    pub fn new<T: Into<String>>(text: T, score: f32, kind: SuggestionKind) -> Self {
        Suggestion {
            text: text.into(),
            score,
            kind,
        }
    }

    pub fn typed<T: Into<String>>(text: T) -> Self {
        Self::new(text, f32::MAX, SuggestionKind::Typed)
    }

    /// Build suggestions from a ranked list, best first.
    pub fn ranked(words: Vec<String>, kind: SuggestionKind) -> Vec<Suggestion> {
        let n = words.len() as f32;
        words
            .into_iter()
            .enumerate()
            .map(|(i, w)| Suggestion::new(w, n - i as f32, kind))
            .collect()
    }
}

/// Suggestions as displayed, capped at the configured count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionStrip {
    entries: Vec<Suggestion>,
    capacity: usize,
}

impl SuggestionStrip {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Replace the entries, dropping duplicates (first wins) and anything
    /// past capacity.
    pub fn set(&mut self, suggestions: Vec<Suggestion>) {
        self.entries.clear();
        for s in suggestions {
            if self.entries.len() >= self.capacity {
                break;
            }
            if !self.entries.iter().any(|e| e.text == s.text) {
                self.entries.push(s);
            }
        }
    }

    pub fn entries(&self) -> &[Suggestion] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Suggestion> {
        self.entries.get(index)
    }

    pub fn texts(&self) -> Vec<String> {
        self.entries.iter().map(|s| s.text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the strip currently shows next-word predictions.
    pub fn is_prediction(&self) -> bool {
        self.entries
            .first()
            .is_some_and(|s| s.kind == SuggestionKind::Prediction)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranked_scores_descend() {
        let ranked = Suggestion::ranked(
            vec!["is".into(), "and".into(), "nap".into()],
            SuggestionKind::Prediction,
        );
        assert_eq!(ranked.len(), 3);
        assert!(ranked[0].score > ranked[1].score);
        assert!(ranked[1].score > ranked[2].score);
    }

    #[test]
    fn test_strip_caps_and_dedups() {
        let mut strip = SuggestionStrip::with_capacity(3);
        strip.set(vec![
            Suggestion::typed("teh"),
            Suggestion::new("the", 2.0, SuggestionKind::Correction),
            Suggestion::new("teh", 1.5, SuggestionKind::Correction),
            Suggestion::new("ten", 1.0, SuggestionKind::Correction),
            Suggestion::new("tea", 0.5, SuggestionKind::Correction),
        ]);
        assert_eq!(strip.texts(), vec!["teh", "the", "ten"]);
        assert_eq!(strip.get(0).map(|s| s.kind), Some(SuggestionKind::Typed));
        assert!(!strip.is_prediction());
    }

    #[test]
    fn test_clear() {
        let mut strip = SuggestionStrip::with_capacity(3);
        strip.set(Suggestion::ranked(vec!["a".into()], SuggestionKind::Prediction));
        assert!(strip.is_prediction());
        strip.clear();
        assert!(strip.is_empty());
    }
}
