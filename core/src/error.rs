//! Error types for the composing core.
//!
//! Nothing in here is fatal to an input session. Host errors are handled by
//! the engine's fail-safe path, learning errors are logged and dropped, and
//! stale asynchronous results are not errors at all (see
//! [`crate::ime_engine::MessageOutcome`]).

use thiserror::Error;

/// A call into the host text field failed.
///
/// Typically the peer connection was torn down mid-edit, or the host refused
/// an edit it considered out of range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("text field connection is not available")]
    Disconnected,
    #[error("range {start}..{end} is outside the field (length {len})")]
    InvalidRange { start: usize, end: usize, len: usize },
    #[error("host rejected the edit: {0}")]
    Rejected(String),
}

/// Persisting a learned word failed. Learning is always best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LearningError {
    #[error("user dictionary storage failed: {0}")]
    Storage(String),
    #[error("word rejected for learning: {0}")]
    Rejected(String),
}

/// Loading or saving [`crate::Settings`] failed.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}
