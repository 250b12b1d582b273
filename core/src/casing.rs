//! Capitalization rules.
//!
//! Casing intent is captured when a word starts (sentence start, manual
//! shift) and reapplied to the buffer and to raw suggestions whenever the
//! capitalization context changes while the word is still composing.

use serde::{Deserialize, Serialize};

/// Shift key state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShiftState {
    #[default]
    Off,
    /// Released after the next character.
    OneShot,
    Locked,
}

impl ShiftState {
    pub fn is_active(self) -> bool {
        self != ShiftState::Off
    }
}

/// How a word should be cased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum CasingMode {
    #[default]
    AsTyped,
    Capitalized,
    AllCaps,
}

/// Casing implied by the word-start flags and the current shift state.
pub fn casing_mode(at_sentence_start: bool, manual_shifted: bool, shift: ShiftState) -> CasingMode {
    if shift == ShiftState::Locked {
        CasingMode::AllCaps
    } else if manual_shifted || at_sentence_start {
        CasingMode::Capitalized
    } else {
        CasingMode::AsTyped
    }
}

/// Casing the user expressed in the buffer itself.
pub fn infer_from_buffer(buffer: &str) -> CasingMode {
    let letters: Vec<char> = buffer.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        CasingMode::AllCaps
    } else if letters.first().is_some_and(|c| c.is_uppercase()) {
        CasingMode::Capitalized
    } else {
        CasingMode::AsTyped
    }
}

pub fn capitalize_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn lowercase_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Apply `mode` to a raw (dictionary-cased) word.
pub fn apply(word: &str, mode: CasingMode) -> String {
    match mode {
        CasingMode::AsTyped => word.to_string(),
        CasingMode::Capitalized => capitalize_first(word),
        CasingMode::AllCaps => word.to_uppercase(),
    }
}

/// Case a single typed character.
pub fn apply_to_char(ch: char, mode: CasingMode, is_first: bool) -> String {
    match mode {
        CasingMode::AllCaps => ch.to_uppercase().collect(),
        CasingMode::Capitalized if is_first => ch.to_uppercase().collect(),
        _ => ch.to_string(),
    }
}

/// Re-case a composing buffer after the casing context moved from
/// `previous` to `next`.
pub fn recase_buffer(buffer: &str, previous: CasingMode, next: CasingMode) -> String {
    if previous == next {
        return buffer.to_string();
    }
    match next {
        CasingMode::AllCaps => buffer.to_uppercase(),
        CasingMode::Capitalized if previous == CasingMode::AllCaps => {
            capitalize_first(&buffer.to_lowercase())
        }
        CasingMode::Capitalized => capitalize_first(buffer),
        CasingMode::AsTyped if previous == CasingMode::AllCaps => buffer.to_lowercase(),
        CasingMode::AsTyped => lowercase_first(buffer),
    }
}

/// Whether a word starting after `text_before` starts a sentence.
///
/// `text_before` is the host text immediately before the word.
pub fn is_sentence_start(text_before: &str) -> bool {
    let Some(last) = text_before.chars().last() else {
        return true;
    };
    if last == '\n' {
        return true;
    }
    if !last.is_whitespace() {
        return false;
    }
    match text_before.trim_end().chars().last() {
        None => true,
        Some(c) => matches!(c, '.' | '!' | '?'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casing_mode() {
        assert_eq!(casing_mode(false, false, ShiftState::Off), CasingMode::AsTyped);
        assert_eq!(casing_mode(true, false, ShiftState::Off), CasingMode::Capitalized);
        assert_eq!(casing_mode(false, true, ShiftState::Off), CasingMode::Capitalized);
        assert_eq!(casing_mode(false, false, ShiftState::Locked), CasingMode::AllCaps);
    }

    #[test]
    fn test_infer_from_buffer() {
        assert_eq!(infer_from_buffer("hello"), CasingMode::AsTyped);
        assert_eq!(infer_from_buffer("Hello"), CasingMode::Capitalized);
        assert_eq!(infer_from_buffer("HELLO"), CasingMode::AllCaps);
        // A single capital letter is not all-caps
        assert_eq!(infer_from_buffer("I"), CasingMode::Capitalized);
    }

    #[test]
    fn test_apply() {
        assert_eq!(apply("the", CasingMode::Capitalized), "The");
        assert_eq!(apply("the", CasingMode::AllCaps), "THE");
        assert_eq!(apply("iPhone", CasingMode::AsTyped), "iPhone");
    }

    #[test]
    fn test_recase_buffer() {
        assert_eq!(
            recase_buffer("hel", CasingMode::AsTyped, CasingMode::Capitalized),
            "Hel"
        );
        assert_eq!(
            recase_buffer("Hel", CasingMode::Capitalized, CasingMode::AsTyped),
            "hel"
        );
        assert_eq!(
            recase_buffer("HEL", CasingMode::AllCaps, CasingMode::Capitalized),
            "Hel"
        );
        assert_eq!(
            recase_buffer("hel", CasingMode::AsTyped, CasingMode::AllCaps),
            "HEL"
        );
    }

    #[test]
    fn test_sentence_start() {
        assert!(is_sentence_start(""));
        assert!(is_sentence_start("   "));
        assert!(is_sentence_start("Done. "));
        assert!(is_sentence_start("Really?  "));
        assert!(is_sentence_start("line\n"));
        assert!(!is_sentence_start("so "));
        assert!(!is_sentence_start("Done."));
        assert!(!is_sentence_start("word"));
    }
}
