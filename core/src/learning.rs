//! Best-effort word learning.
//!
//! Learning runs on the worker pool and never blocks typing. The queue on the
//! main context only remembers which words are in flight, so a word committed
//! twice before its first learning request completes is learned once.

use ahash::AHashSet;
use tracing::warn;

use crate::error::LearningError;
use crate::spell::{LearnSource, SpellService};

/// Result of one learning request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnOutcome {
    Learned,
    /// Already a dictionary entry; nothing stored.
    AlreadyKnown,
    Failed(LearningError),
}

/// In-flight learning requests.
#[derive(Debug, Default)]
pub struct LearningQueue {
    in_flight: AHashSet<String>,
}

impl LearningQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `word` for learning. Returns `false` if it is already queued.
    pub fn begin(&mut self, word: &str) -> bool {
        self.in_flight.insert(word.to_lowercase())
    }

    pub fn finish(&mut self, word: &str) {
        self.in_flight.remove(&word.to_lowercase());
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

/// Learn `word` through `service`. Runs on a worker thread.
///
/// Dictionary words are skipped. After a successful write the service's
/// cached state for the word is invalidated and the word is removed from
/// the blacklist, so the next validation sees it.
pub fn learn_blocking(service: &dyn SpellService, word: &str, source: LearnSource) -> LearnOutcome {
    if service.is_in_dictionary(word) {
        return LearnOutcome::AlreadyKnown;
    }
    match service.learn_word(word, source) {
        Ok(()) => {
            service.remove_from_blacklist(word);
            service.invalidate_word(word);
            LearnOutcome::Learned
        }
        Err(e) => {
            warn!(word, error = %e, "learning failed");
            LearnOutcome::Failed(e)
        }
    }
}
