// core/tests/common/mod.rs
//
// Shared fixtures for the engine integration tests: a spell service that
// records learning calls, an engine over `MemoryTextField`, and helpers to
// type text and drain worker messages.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use libsoftkey_core::{
    FieldInfo, ImeEngine, InMemorySpellService, KeyEvent, LearnSource, LearningError,
    MemoryTextField, MessageOutcome, Settings, SpellService,
};

/// Wraps `InMemorySpellService` and records every `learn_word` call.
pub struct RecordingService {
    inner: InMemorySpellService,
    learned: Mutex<Vec<(String, LearnSource)>>,
    fail_learning: bool,
}

impl RecordingService {
    pub fn new(fail_learning: bool) -> Self {
        let inner = InMemorySpellService::with_words(
            "en",
            [
                ("hello", 300),
                ("hell", 40),
                ("the", 500),
                ("ten", 50),
                ("tea", 40),
                ("cat", 120),
                ("world", 200),
                ("foo", 10),
                ("bar", 10),
            ],
        );
        inner.add_bigram("en", "cat", "is", 30);
        inner.add_bigram("en", "cat", "and", 20);
        inner.add_bigram("en", "cat", "nap", 10);
        inner.add_bigram("en", "is", "cute", 5);
        Self {
            inner,
            learned: Mutex::new(Vec::new()),
            fail_learning,
        }
    }

    pub fn learned(&self) -> Vec<(String, LearnSource)> {
        self.learned.lock().unwrap().clone()
    }
}

impl SpellService for RecordingService {
    fn validate_word(&self, word: &str) -> bool {
        self.inner.validate_word(word)
    }

    fn get_suggestions(&self, word: &str) -> Vec<String> {
        self.inner.get_suggestions(word)
    }

    fn learn_word(&self, word: &str, source: LearnSource) -> Result<(), LearningError> {
        self.learned.lock().unwrap().push((word.to_string(), source));
        if self.fail_learning {
            return Err(LearningError::Storage("disk full".into()));
        }
        self.inner.learn_word(word, source)
    }

    fn invalidate_word(&self, word: &str) {
        self.inner.invalidate_word(word)
    }

    fn remove_from_blacklist(&self, word: &str) {
        self.inner.remove_from_blacklist(word)
    }

    fn is_in_dictionary(&self, word: &str) -> bool {
        self.inner.is_in_dictionary(word)
    }

    fn get_bigram_predictions(&self, prev_word: &str, lang: &str, count: usize) -> Vec<String> {
        self.inner.get_bigram_predictions(prev_word, lang, count)
    }
}

pub fn test_settings() -> Settings {
    Settings {
        auto_capitalization_enabled: false,
        suggestion_debounce_ms: 5,
        ..Settings::default()
    }
}

pub fn engine_with(
    text: &str,
    settings: Settings,
    service: Arc<RecordingService>,
) -> ImeEngine<MemoryTextField> {
    let mut engine = ImeEngine::new(
        MemoryTextField::with_text(text),
        service,
        settings,
        tokio::runtime::Handle::current(),
    );
    engine.start_input(FieldInfo::text());
    engine
}

pub fn engine(text: &str) -> (ImeEngine<MemoryTextField>, Arc<RecordingService>) {
    let service = Arc::new(RecordingService::new(false));
    (engine_with(text, test_settings(), Arc::clone(&service)), service)
}

pub fn type_str(engine: &mut ImeEngine<MemoryTextField>, text: &str) {
    for ch in text.chars() {
        let key = match ch {
            ' ' => KeyEvent::Space,
            '\n' => KeyEvent::Enter,
            _ => KeyEvent::Char(ch),
        };
        engine.process_key(key);
    }
}

/// Apply worker messages until none arrives within `quiet`.
pub async fn drain(engine: &mut ImeEngine<MemoryTextField>, quiet: Duration) -> Vec<MessageOutcome> {
    let mut outcomes = Vec::new();
    while let Ok(Some(outcome)) = tokio::time::timeout(quiet, engine.next_message()).await {
        outcomes.push(outcome);
    }
    outcomes
}

pub async fn settle(engine: &mut ImeEngine<MemoryTextField>) -> Vec<MessageOutcome> {
    drain(engine, Duration::from_millis(150)).await
}
