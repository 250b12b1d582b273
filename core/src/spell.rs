//! Spell/learning collaborator.
//!
//! The dictionary engine itself is outside the composing core; the core only
//! consumes [`SpellService`]. Implementations own their storage and must be
//! internally synchronized: the pipeline calls them from worker threads.
//!
//! `InMemorySpellService` is a small thread-safe implementation (word
//! frequencies, learned words, a blacklist, a bigram table and an
//! edit-distance suggester) used by tests and the simulator.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Mutex, RwLock};

use ahash::{AHashMap, AHashSet};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::error::LearningError;

/// Why a word is being learned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearnSource {
    /// Committed as typed.
    Typed,
    /// Committed as typed after failing validation and being confirmed.
    ConfirmedSpelling,
    /// Produced by a swipe gesture.
    Gesture,
}

/// Validation, ranking, learning and prediction services.
pub trait SpellService: Send + Sync {
    /// Whether `word` is acceptable (dictionary or learned, not blacklisted).
    fn validate_word(&self, word: &str) -> bool;

    /// Spelling alternatives for `word`, best first.
    fn get_suggestions(&self, word: &str) -> Vec<String>;

    fn learn_word(&self, word: &str, source: LearnSource) -> Result<(), LearningError>;

    /// Drop any cached state about `word` so the next lookup sees updates.
    fn invalidate_word(&self, word: &str);

    fn remove_from_blacklist(&self, word: &str);

    /// Whether `word` is in the static dictionary (learned words excluded).
    fn is_in_dictionary(&self, word: &str) -> bool;

    /// Likely next words after `prev_word`, best first.
    fn get_bigram_predictions(&self, prev_word: &str, lang: &str, count: usize) -> Vec<String>;
}

/// Entry in a word's bigram distribution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigramEntry {
    pub prev: String,
    pub next: String,
    pub count: u32,
}

/// TOML word list accepted by [`InMemorySpellService::from_toml_str`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WordList {
    pub language: String,
    pub words: HashMap<String, u64>,
    pub bigrams: Vec<BigramEntry>,
    pub blacklist: Vec<String>,
}

const VALIDITY_CACHE_SIZE: usize = 256;
const MAX_EDIT_DISTANCE: usize = 2;

/// A thread-safe in-memory spell service.
#[derive(Debug)]
pub struct InMemorySpellService {
    language: String,
    dictionary: RwLock<AHashMap<String, u64>>,
    learned: RwLock<AHashMap<String, u64>>,
    blacklist: RwLock<AHashSet<String>>,
    // (language, previous word) -> continuations
    bigrams: RwLock<AHashMap<(String, String), Vec<(String, u32)>>>,
    validity: Mutex<LruCache<String, bool>>,
}

impl Default for InMemorySpellService {
    fn default() -> Self {
        Self::new("en")
    }
}

impl InMemorySpellService {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            dictionary: RwLock::new(AHashMap::new()),
            learned: RwLock::new(AHashMap::new()),
            blacklist: RwLock::new(AHashSet::new()),
            bigrams: RwLock::new(AHashMap::new()),
            validity: Mutex::new(LruCache::new(
                NonZeroUsize::new(VALIDITY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Build a service from `(word, frequency)` pairs.
    pub fn with_words<'a>(language: &str, words: impl IntoIterator<Item = (&'a str, u64)>) -> Self {
        let service = Self::new(language);
        for (word, freq) in words {
            service.add_word(word, freq);
        }
        service
    }

    /// Load a word list from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let list: WordList = toml::from_str(content)?;
        let language = if list.language.is_empty() {
            "en"
        } else {
            list.language.as_str()
        };
        let service = Self::new(language);
        for (word, freq) in &list.words {
            service.add_word(word, *freq);
        }
        for entry in &list.bigrams {
            service.add_bigram(language, &entry.prev, &entry.next, entry.count);
        }
        for word in &list.blacklist {
            service.blacklist_word(word);
        }
        Ok(service)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn add_word(&self, word: &str, frequency: u64) {
        if let Ok(mut dict) = self.dictionary.write() {
            dict.insert(word.to_lowercase(), frequency);
        }
        self.invalidate_word(word);
    }

    pub fn add_bigram(&self, lang: &str, prev: &str, next: &str, count: u32) {
        if let Ok(mut bigrams) = self.bigrams.write() {
            let entries = bigrams
                .entry((lang.to_string(), prev.to_lowercase()))
                .or_default();
            match entries.iter_mut().find(|(w, _)| w == next) {
                Some((_, c)) => *c = c.saturating_add(count),
                None => entries.push((next.to_string(), count)),
            }
        }
    }

    pub fn blacklist_word(&self, word: &str) {
        if let Ok(mut blacklist) = self.blacklist.write() {
            blacklist.insert(word.to_lowercase());
        }
        self.invalidate_word(word);
    }

    /// Learned frequency for a word (0 if never learned).
    pub fn learned_frequency(&self, word: &str) -> u64 {
        self.learned
            .read()
            .ok()
            .and_then(|m| m.get(&word.to_lowercase()).copied())
            .unwrap_or(0)
    }

    fn frequency(&self, key: &str) -> Option<u64> {
        let dict = self.dictionary.read().ok()?.get(key).copied();
        let learned = self.learned.read().ok()?.get(key).copied();
        match (dict, learned) {
            (None, None) => None,
            (d, l) => Some(d.unwrap_or(0).saturating_add(l.unwrap_or(0))),
        }
    }

    fn is_blacklisted(&self, key: &str) -> bool {
        self.blacklist
            .read()
            .map(|b| b.contains(key))
            .unwrap_or(false)
    }
}

impl SpellService for InMemorySpellService {
    fn validate_word(&self, word: &str) -> bool {
        let key = word.to_lowercase();
        if let Ok(mut cache) = self.validity.lock() {
            if let Some(valid) = cache.get(&key) {
                return *valid;
            }
        }
        let valid = !self.is_blacklisted(&key) && self.frequency(&key).is_some();
        if let Ok(mut cache) = self.validity.lock() {
            cache.put(key, valid);
        }
        valid
    }

    fn get_suggestions(&self, word: &str) -> Vec<String> {
        let key = word.to_lowercase();
        let mut scored: AHashMap<String, (usize, u64)> = AHashMap::new();
        for source in [&self.dictionary, &self.learned] {
            let Ok(map) = source.read() else { continue };
            for (candidate, freq) in map.iter() {
                if *candidate == key || self.is_blacklisted(candidate) {
                    continue;
                }
                let distance = edit_distance(&key, candidate);
                if distance <= MAX_EDIT_DISTANCE {
                    let entry = scored.entry(candidate.clone()).or_insert((distance, 0));
                    entry.1 = entry.1.saturating_add(*freq);
                }
            }
        }
        let mut ranked: Vec<(String, (usize, u64))> = scored.into_iter().collect();
        ranked.sort_by(|(wa, (da, fa)), (wb, (db, fb))| {
            da.cmp(db).then(fb.cmp(fa)).then(wa.cmp(wb))
        });
        ranked.into_iter().map(|(w, _)| w).collect()
    }

    fn learn_word(&self, word: &str, _source: LearnSource) -> Result<(), LearningError> {
        if word.is_empty() || word.chars().any(char::is_whitespace) {
            return Err(LearningError::Rejected(word.to_string()));
        }
        let mut learned = self
            .learned
            .write()
            .map_err(|e| LearningError::Storage(e.to_string()))?;
        let entry = learned.entry(word.to_lowercase()).or_insert(0);
        *entry = entry.saturating_add(1);
        Ok(())
    }

    fn invalidate_word(&self, word: &str) {
        if let Ok(mut cache) = self.validity.lock() {
            cache.pop(&word.to_lowercase());
        }
    }

    fn remove_from_blacklist(&self, word: &str) {
        if let Ok(mut blacklist) = self.blacklist.write() {
            blacklist.remove(&word.to_lowercase());
        }
    }

    fn is_in_dictionary(&self, word: &str) -> bool {
        self.dictionary
            .read()
            .map(|d| d.contains_key(&word.to_lowercase()))
            .unwrap_or(false)
    }

    fn get_bigram_predictions(&self, prev_word: &str, lang: &str, count: usize) -> Vec<String> {
        let Ok(bigrams) = self.bigrams.read() else {
            return Vec::new();
        };
        let Some(entries) = bigrams.get(&(lang.to_string(), prev_word.to_lowercase())) else {
            return Vec::new();
        };
        let mut entries = entries.clone();
        // Stable sort keeps insertion order among equal counts
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.into_iter().take(count).map(|(w, _)| w).collect()
    }
}

/// Optimal string alignment distance (adjacent transpositions count as one).
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let width = b.len() + 1;
    let mut d = vec![0usize; (a.len() + 1) * width];
    for i in 0..=a.len() {
        d[i * width] = i;
    }
    for j in 0..=b.len() {
        d[j] = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (d[(i - 1) * width + j] + 1)
                .min(d[i * width + j - 1] + 1)
                .min(d[(i - 1) * width + j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(d[(i - 2) * width + j - 2] + 1);
            }
            d[i * width + j] = best;
        }
    }
    d[a.len() * width + b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> InMemorySpellService {
        InMemorySpellService::with_words(
            "en",
            [("the", 1000), ("ten", 50), ("tea", 40), ("hello", 300), ("hell", 20)],
        )
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("teh", "the"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn test_validate_and_dictionary() {
        let s = service();
        assert!(s.validate_word("the"));
        assert!(s.validate_word("The"));
        assert!(!s.validate_word("teh"));
        assert!(s.is_in_dictionary("hello"));
        assert!(!s.is_in_dictionary("teh"));
    }

    #[test]
    fn test_suggestions_rank_by_distance_then_frequency() {
        let s = service();
        let suggestions = s.get_suggestions("teh");
        assert_eq!(suggestions.first().map(String::as_str), Some("the"));
        assert!(suggestions.contains(&"ten".to_string()));
        assert!(!suggestions.contains(&"teh".to_string()));
    }

    #[test]
    fn test_learning_makes_word_valid_after_invalidation() {
        let s = service();
        assert!(!s.validate_word("teh"));
        s.learn_word("teh", LearnSource::ConfirmedSpelling).unwrap();
        // Cached verdict survives until invalidated
        assert!(!s.validate_word("teh"));
        s.invalidate_word("teh");
        assert!(s.validate_word("teh"));
        assert!(!s.is_in_dictionary("teh"));
        assert_eq!(s.learned_frequency("teh"), 1);
    }

    #[test]
    fn test_learning_rejects_phrases() {
        let s = service();
        assert!(matches!(
            s.learn_word("two words", LearnSource::Typed),
            Err(LearningError::Rejected(_))
        ));
    }

    #[test]
    fn test_blacklist() {
        let s = service();
        s.blacklist_word("hell");
        assert!(!s.validate_word("hell"));
        s.remove_from_blacklist("hell");
        s.invalidate_word("hell");
        assert!(s.validate_word("hell"));
    }

    #[test]
    fn test_bigram_predictions() {
        let s = service();
        s.add_bigram("en", "cat", "is", 30);
        s.add_bigram("en", "cat", "and", 20);
        s.add_bigram("en", "cat", "nap", 10);
        s.add_bigram("fr", "cat", "est", 99);
        assert_eq!(s.get_bigram_predictions("cat", "en", 3), vec!["is", "and", "nap"]);
        assert_eq!(s.get_bigram_predictions("Cat", "en", 1), vec!["is"]);
        assert!(s.get_bigram_predictions("dog", "en", 3).is_empty());
    }

    #[test]
    fn test_from_toml_str() {
        let s = InMemorySpellService::from_toml_str(
            r#"
            language = "en"
            blacklist = ["darn"]

            [words]
            cat = 100
            darn = 5

            [[bigrams]]
            prev = "cat"
            next = "is"
            count = 3
            "#,
        )
        .unwrap();
        assert!(s.validate_word("cat"));
        assert!(!s.validate_word("darn"));
        assert_eq!(s.get_bigram_predictions("cat", "en", 3), vec!["is"]);
    }
}
