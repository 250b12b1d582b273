//! Spell-confirmation state machine.
//!
//! When a word fails validation as it is completed by whitespace, it is not
//! committed right away: the session waits for the user to either repeat the
//! completion (commit as typed, and learn it), pick a suggestion (commit the
//! suggestion, no learning), or keep typing (abandon the confirmation).
//!
//! The awaited word is carried inside the state, so "awaiting confirmation"
//! without a pending word is unrepresentable.

/// Current confirmation state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfirmationState {
    #[default]
    Normal,
    AwaitingConfirmation {
        /// Word to queue for learning if the user commits it as typed.
        pending_word: String,
    },
}

/// How an awaited confirmation was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Second completion action: commit the word unchanged and learn it.
    CommitAsIs { word: String },
    /// A suggestion replaced the word; nothing is learned.
    AcceptSuggestion { suggestion: String },
    /// The user resumed typing.
    Abandoned,
}

#[derive(Debug, Clone, Default)]
pub struct SpellConfirmation {
    state: ConfirmationState,
}

impl SpellConfirmation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConfirmationState {
        &self.state
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, ConfirmationState::AwaitingConfirmation { .. })
    }

    pub fn pending_word(&self) -> Option<&str> {
        match &self.state {
            ConfirmationState::AwaitingConfirmation { pending_word } => Some(pending_word),
            ConfirmationState::Normal => None,
        }
    }

    /// `NORMAL -> AWAITING_CONFIRMATION` for a word that failed validation.
    ///
    /// Returns `false` (and changes nothing) if a confirmation is already
    /// pending.
    pub fn begin(&mut self, word: &str) -> bool {
        if self.is_awaiting() {
            return false;
        }
        self.state = ConfirmationState::AwaitingConfirmation {
            pending_word: word.to_string(),
        };
        true
    }

    /// Second completion action.
    pub fn commit_as_is(&mut self) -> Option<Resolution> {
        match std::mem::take(&mut self.state) {
            ConfirmationState::AwaitingConfirmation { pending_word } => {
                Some(Resolution::CommitAsIs { word: pending_word })
            }
            ConfirmationState::Normal => None,
        }
    }

    /// A suggestion was picked while awaiting.
    pub fn accept_suggestion(&mut self, suggestion: &str) -> Option<Resolution> {
        match std::mem::take(&mut self.state) {
            ConfirmationState::AwaitingConfirmation { .. } => Some(Resolution::AcceptSuggestion {
                suggestion: suggestion.to_string(),
            }),
            ConfirmationState::Normal => None,
        }
    }

    /// Typing resumed while awaiting.
    pub fn abandon(&mut self) -> Option<Resolution> {
        match std::mem::take(&mut self.state) {
            ConfirmationState::AwaitingConfirmation { .. } => Some(Resolution::Abandoned),
            ConfirmationState::Normal => None,
        }
    }

    /// Keep the awaited word in step with a re-cased buffer.
    pub fn recase(&mut self, word: &str) {
        if let ConfirmationState::AwaitingConfirmation { pending_word } = &mut self.state {
            *pending_word = word.to_string();
        }
    }

    pub fn reset(&mut self) {
        self.state = ConfirmationState::Normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_normal() {
        let confirmation = SpellConfirmation::new();
        assert_eq!(confirmation.state(), &ConfirmationState::Normal);
        assert_eq!(confirmation.pending_word(), None);
    }

    #[test]
    fn test_commit_as_is() {
        let mut confirmation = SpellConfirmation::new();
        assert!(confirmation.begin("teh"));
        assert_eq!(confirmation.pending_word(), Some("teh"));
        assert_eq!(
            confirmation.commit_as_is(),
            Some(Resolution::CommitAsIs {
                word: "teh".to_string()
            })
        );
        assert!(!confirmation.is_awaiting());
    }

    #[test]
    fn test_accept_suggestion() {
        let mut confirmation = SpellConfirmation::new();
        confirmation.begin("teh");
        assert_eq!(
            confirmation.accept_suggestion("the"),
            Some(Resolution::AcceptSuggestion {
                suggestion: "the".to_string()
            })
        );
        assert_eq!(confirmation.state(), &ConfirmationState::Normal);
    }

    #[test]
    fn test_abandon() {
        let mut confirmation = SpellConfirmation::new();
        confirmation.begin("teh");
        assert_eq!(confirmation.abandon(), Some(Resolution::Abandoned));
        assert_eq!(confirmation.abandon(), None);
    }

    #[test]
    fn test_transitions_from_normal_are_noops() {
        let mut confirmation = SpellConfirmation::new();
        assert_eq!(confirmation.commit_as_is(), None);
        assert_eq!(confirmation.accept_suggestion("x"), None);
        assert_eq!(confirmation.state(), &ConfirmationState::Normal);
    }

    #[test]
    fn test_recase_updates_awaited_word_only() {
        let mut confirmation = SpellConfirmation::new();
        confirmation.recase("TEH");
        assert_eq!(confirmation.state(), &ConfirmationState::Normal);

        confirmation.begin("teh");
        confirmation.recase("TEH");
        assert_eq!(
            confirmation.commit_as_is(),
            Some(Resolution::CommitAsIs {
                word: "TEH".to_string()
            })
        );
    }

    #[test]
    fn test_begin_twice_keeps_first_word() {
        let mut confirmation = SpellConfirmation::new();
        assert!(confirmation.begin("teh"));
        assert!(!confirmation.begin("other"));
        assert_eq!(confirmation.pending_word(), Some("teh"));
    }
}
