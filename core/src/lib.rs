//! libsoftkey-core
//!
//! Input-processing core of a soft keyboard: the composing session, the
//! bridge to the host text field, selection-echo classification, and the
//! asynchronous suggestion/spell pipeline, driven by a single-threaded
//! engine that owns all session state.
//!
//! Public API:
//! - `ImeEngine` - Main sequencing context; routes host events
//! - `ComposingSession` - The word being composed and its staleness counter
//! - `TextFieldBridge` - Defensive wrapper over a `TextFieldPeer`
//! - `SelectionTracker` - Echo vs. jump classification of selection updates
//! - `SuggestionPipeline` - Debounced, cancellable suggestion computation
//! - `SpellService` - Validation, suggestion, learning and bigram collaborator
//! - `Settings` - Options snapshot and tuning constants
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{HostError, LearningError, SettingsError};

pub mod host;
pub use host::{EditorAction, FieldInfo, FieldKind, Selection, SelectionChange, TextFieldPeer};

pub mod memory_field;
pub use memory_field::MemoryTextField;

pub mod bridge;
pub use bridge::{TextFieldBridge, WordSpan};

pub mod selection;
pub use selection::{SelectionClass, SelectionTracker};

pub mod session;
pub use session::{ComposingSession, DeletedExtent, SessionSnapshot, WordState};

pub mod casing;
pub use casing::{CasingMode, ShiftState};

pub mod confirmation;
pub use confirmation::{ConfirmationState, Resolution, SpellConfirmation};

pub mod candidate;
pub use candidate::{Suggestion, SuggestionKind, SuggestionStrip};

pub mod spell;
pub use spell::{InMemorySpellService, LearnSource, SpellService};

pub mod learning;
pub use learning::{LearnOutcome, LearningQueue};

pub mod pipeline;
pub use pipeline::{PipelineMessage, SuggestionPipeline, SuggestionResult};

pub mod context;
pub use context::ImeContext;

pub mod ime_engine;
pub use ime_engine::{ImeEngine, KeyEvent, KeyResult, MessageOutcome};

/// Options snapshot read by the engine.
///
/// The first group mirrors the keyboard's user-facing settings; the second
/// holds tuning constants.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Queue committed words for learning
    pub word_learning_enabled: bool,
    /// Show suggestions and next-word predictions
    pub show_suggestions: bool,
    /// Two spaces after a word become ". "
    pub double_space_period: bool,
    /// Capitalize the first word of a sentence
    pub auto_capitalization_enabled: bool,
    /// Hold misspelled words for confirmation on space
    pub spell_check_enabled: bool,
    /// Delay before a suggestion computation starts
    pub suggestion_debounce_ms: u32,
    /// Number of entries in the suggestion strip
    pub effective_suggestion_count: u8,

    /// Caret movement (in chars) beyond which a selection update is a jump
    pub cursor_drift_threshold: usize,
    /// How far recomposition scans on each side of the caret
    pub recomposition_scan_limit: usize,
    /// Entries kept in the raw suggestion cache
    pub raw_suggestion_cache_size: usize,
    /// Language passed to bigram lookups
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            word_learning_enabled: true,
            show_suggestions: true,
            double_space_period: true,
            auto_capitalization_enabled: true,
            spell_check_enabled: true,
            suggestion_debounce_ms: 75,
            effective_suggestion_count: 3,
            cursor_drift_threshold: 1,
            recomposition_scan_limit: 48,
            raw_suggestion_cache_size: 16,
            language: "en".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Save settings to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load settings from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize settings to TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(u64::from(self.suggestion_debounce_ms))
    }

    pub fn suggestion_count(&self) -> usize {
        usize::from(self.effective_suggestion_count.max(1))
    }
}

/// Utility helpers.
pub mod utils {
    /// Normalize input strings (NFC) and trim whitespace.
    pub fn normalize(s: &str) -> String {
        use unicode_normalization::UnicodeNormalization;
        s.nfc().collect::<String>().trim().to_string()
    }

    /// Apostrophe and hyphen: part of a word only between word characters.
    pub fn is_word_connector(ch: char) -> bool {
        matches!(ch, '\'' | '-' | '\u{2019}')
    }

    /// Characters that extend a composing word.
    pub fn is_word_char(ch: char) -> bool {
        ch.is_alphanumeric() || is_word_connector(ch)
    }

    /// Byte index of the `offset`-th char of `s` (clamped to `s.len()`).
    pub fn char_to_byte(s: &str, offset: usize) -> usize {
        s.char_indices()
            .nth(offset)
            .map(|(i, _)| i)
            .unwrap_or(s.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert!(settings.word_learning_enabled);
        assert_eq!(settings.suggestion_debounce_ms, 75);
        assert_eq!(settings.suggestion_count(), 3);
        assert_eq!(settings.language, "en");
    }

    #[test]
    fn test_settings_partial_toml() {
        let settings = Settings::from_toml_str(
            r#"
            spell_check_enabled = false
            suggestion_debounce_ms = 10
            "#,
        )
        .unwrap();
        assert!(!settings.spell_check_enabled);
        assert_eq!(settings.debounce(), std::time::Duration::from_millis(10));
        // Unspecified fields keep their defaults
        assert!(settings.show_suggestions);
        assert_eq!(settings.cursor_drift_threshold, 1);
    }

    #[test]
    fn test_settings_toml_roundtrip_through_file() {
        let path = std::env::temp_dir().join(format!(
            "softkey-settings-{}.toml",
            std::process::id()
        ));
        let mut settings = Settings::default();
        settings.language = "de".to_string();
        settings.save_toml(&path).unwrap();
        let loaded = Settings::load_toml(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = Settings::load_toml("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, SettingsError::Io(_)));
    }

    #[test]
    fn test_utils() {
        assert_eq!(utils::normalize(" cafe\u{301} "), "caf\u{e9}");
        assert!(utils::is_word_char('a'));
        assert!(utils::is_word_char('\''));
        assert!(!utils::is_word_char(','));
        assert_eq!(utils::char_to_byte("h\u{e9}llo", 2), 3);
        assert_eq!(utils::char_to_byte("abc", 9), 3);
    }
}
