//! Suggestion/Spell Pipeline.
//!
//! Validation, suggestion ranking, bigram lookups and learning run on the
//! tokio blocking pool. Nothing here touches the composing session: every
//! result is posted back as a [`PipelineMessage`] and the engine decides, on
//! its own context, whether the result still applies.
//!
//! A new suggestion request aborts the previous debounce task. Aborting is
//! only an optimization; a computation that already finished may still have
//! posted its message, which is why every suggestion result carries the
//! [`SessionSnapshot`] it was computed for.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::learning::{self, LearnOutcome};
use crate::session::SessionSnapshot;
use crate::spell::{LearnSource, SpellService};

/// How the word being looked up was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMethod {
    Typing,
    /// Gesture words come from the decoder's own vocabulary and skip validation.
    Gesture,
}

/// Raw (dictionary-cased) output for one normalized word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionResult {
    pub valid: bool,
    pub corrections: Vec<String>,
}

/// Messages posted back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineMessage {
    /// `result` is `None` when the computation failed.
    Suggestions {
        snapshot: SessionSnapshot,
        key: String,
        result: Option<SuggestionResult>,
    },
    Predictions {
        sequence: u64,
        prev_word: String,
        words: Vec<String>,
    },
    Learned {
        word: String,
        outcome: LearnOutcome,
    },
}

pub struct SuggestionPipeline {
    runtime: Handle,
    service: Arc<dyn SpellService>,
    tx: UnboundedSender<PipelineMessage>,
    rx: UnboundedReceiver<PipelineMessage>,
    debounce: Duration,
    max_corrections: usize,
    language: String,
    pending: Option<JoinHandle<()>>,
    prediction: Option<JoinHandle<()>>,
    raw_cache: LruCache<String, SuggestionResult>,
}

impl std::fmt::Debug for SuggestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionPipeline")
            .field("debounce", &self.debounce)
            .field("language", &self.language)
            .field("cached", &self.raw_cache.len())
            .finish()
    }
}

impl SuggestionPipeline {
    pub fn new(
        runtime: Handle,
        service: Arc<dyn SpellService>,
        debounce: Duration,
        max_corrections: usize,
        cache_size: usize,
        language: &str,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            runtime,
            service,
            tx,
            rx,
            debounce,
            max_corrections,
            language: language.to_string(),
            pending: None,
            prediction: None,
            raw_cache: LruCache::new(NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    // ========== Suggestions ==========

    /// Schedule validation and ranking for `key` (the normalized buffer).
    ///
    /// Supersedes any debounce still waiting. A cache hit is posted
    /// immediately, still tagged with `snapshot`.
    pub fn request_suggestions(&mut self, snapshot: SessionSnapshot, key: String, method: InputMethod) {
        self.cancel_suggestions();

        if let Some(cached) = self.raw_cache.get(&key) {
            debug!(key = %key, sequence = snapshot.sequence, "raw suggestion cache hit");
            let message = PipelineMessage::Suggestions {
                snapshot,
                key,
                result: Some(cached.clone()),
            };
            let _ = self.tx.send(message);
            return;
        }

        let tx = self.tx.clone();
        let service = Arc::clone(&self.service);
        let debounce = self.debounce;
        let limit = self.max_corrections;
        self.pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            let word = key.clone();
            let computed = tokio::task::spawn_blocking(move || {
                compute_suggestions(service.as_ref(), &word, method, limit)
            })
            .await;
            let result = match computed {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(error = %e, "suggestion computation failed");
                    None
                }
            };
            let _ = tx.send(PipelineMessage::Suggestions {
                snapshot,
                key,
                result,
            });
        }));
    }

    pub fn cancel_suggestions(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    /// Raw result previously computed for `key`.
    pub fn cached(&mut self, key: &str) -> Option<SuggestionResult> {
        self.raw_cache.get(key).cloned()
    }

    pub fn remember(&mut self, key: &str, result: &SuggestionResult) {
        self.raw_cache.put(key.to_string(), result.clone());
    }

    /// Drop the cached result for `key` (after learning changed its validity).
    pub fn forget(&mut self, key: &str) {
        self.raw_cache.pop(key);
    }

    /// Read-through validity check on the calling context.
    pub fn validate_now(&self, word: &str) -> bool {
        self.service.validate_word(word)
    }

    // ========== Predictions ==========

    /// Fetch bigram continuations of `prev_word`, tagged with `sequence`.
    pub fn request_predictions(&mut self, sequence: u64, prev_word: &str, count: usize) {
        self.cancel_predictions();
        let tx = self.tx.clone();
        let service = Arc::clone(&self.service);
        let language = self.language.clone();
        let prev_word = prev_word.to_string();
        self.prediction = Some(self.runtime.spawn(async move {
            let word = prev_word.clone();
            let fetched = tokio::task::spawn_blocking(move || {
                service.get_bigram_predictions(&word, &language, count)
            })
            .await;
            let words = fetched.unwrap_or_else(|e| {
                warn!(error = %e, "bigram lookup failed");
                Vec::new()
            });
            let _ = tx.send(PipelineMessage::Predictions {
                sequence,
                prev_word,
                words,
            });
        }));
    }

    pub fn cancel_predictions(&mut self) {
        if let Some(handle) = self.prediction.take() {
            handle.abort();
        }
    }

    // ========== Learning ==========

    /// Queue `word` for learning on the worker pool.
    pub fn learn(&self, word: &str, source: LearnSource) {
        let tx = self.tx.clone();
        let service = Arc::clone(&self.service);
        let word = word.to_string();
        self.runtime.spawn(async move {
            let target = word.clone();
            let learned = tokio::task::spawn_blocking(move || {
                learning::learn_blocking(service.as_ref(), &target, source)
            })
            .await;
            let outcome = learned.unwrap_or_else(|e| {
                LearnOutcome::Failed(crate::error::LearningError::Storage(e.to_string()))
            });
            let _ = tx.send(PipelineMessage::Learned { word, outcome });
        });
    }

    // ========== Delivery ==========

    pub fn cancel_all(&mut self) {
        self.cancel_suggestions();
        self.cancel_predictions();
    }

    /// Next message, if one is ready.
    pub fn try_recv(&mut self) -> Option<PipelineMessage> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next message.
    pub async fn recv(&mut self) -> Option<PipelineMessage> {
        self.rx.recv().await
    }
}

impl Drop for SuggestionPipeline {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Validation plus ranking for one word. Runs on the blocking pool.
pub fn compute_suggestions(
    service: &dyn SpellService,
    word: &str,
    method: InputMethod,
    limit: usize,
) -> SuggestionResult {
    let valid = match method {
        InputMethod::Gesture => true,
        InputMethod::Typing => service.validate_word(word),
    };
    let mut corrections = service.get_suggestions(word);
    corrections.retain(|c| c != word);
    corrections.truncate(limit);
    SuggestionResult { valid, corrections }
}
