//! IME engine: the main sequencing context.
//!
//! `ImeEngine` owns the composing session, the bridge to the host field, the
//! selection tracker and the suggestion pipeline. Host callbacks (keys,
//! gestures, suggestion picks, selection notifications, lifecycle) are
//! handled strictly in call order on whatever thread owns the engine.
//! Worker results come back as [`PipelineMessage`]s and are applied through
//! [`ImeEngine::handle_message`], which discards anything computed against a
//! session state that no longer exists.
//!
//! A failing host call never escapes: the engine finishes composing on a
//! best-effort basis, resets the session and keeps accepting input.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::bridge::TextFieldBridge;
use crate::candidate::{Suggestion, SuggestionKind, SuggestionStrip};
use crate::casing::{self, CasingMode, ShiftState};
use crate::confirmation::Resolution;
use crate::context::ImeContext;
use crate::error::HostError;
use crate::host::{FieldInfo, Selection, SelectionChange, TextFieldPeer};
use crate::learning::{LearnOutcome, LearningQueue};
use crate::memory_field::MemoryTextField;
use crate::pipeline::{InputMethod, PipelineMessage, SuggestionPipeline, SuggestionResult};
use crate::selection::{SelectionClass, SelectionTracker};
use crate::session::{ComposingSession, DeletedExtent};
use crate::spell::{LearnSource, SpellService};
use crate::utils::{self, is_word_char, is_word_connector};
use crate::Settings;

/// How much host text is read to decide sentence starts.
const SENTENCE_LOOKBEHIND: usize = 8;

/// Key event types the engine processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    /// Character key (letters, digits, punctuation)
    Char(char),
    Space,
    Backspace,
    /// Enter/Return key
    Enter,
    /// Shift key state changed
    Shift(ShiftState),
}

/// Result of processing a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResult {
    /// Key was handled by the keyboard
    Handled,
    /// Key was not handled (no input episode, or nothing to act on)
    NotHandled,
}

/// What happened to a pipeline message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    SuggestionsApplied,
    PredictionsApplied,
    /// Computed for a session state that no longer exists.
    Discarded,
    Learned { word: String, outcome: LearnOutcome },
}

pub struct ImeEngine<P: TextFieldPeer> {
    bridge: TextFieldBridge<P>,
    session: ComposingSession,
    tracker: SelectionTracker,
    pipeline: SuggestionPipeline,
    learning: LearningQueue,
    strip: SuggestionStrip,
    context: ImeContext,
    settings: Settings,
    field: Option<FieldInfo>,
    shift: ShiftState,
    /// Casing applied to the word being composed
    casing: CasingMode,
    /// Last key committed a word followed by a space
    space_after_word: bool,
}

impl<P: TextFieldPeer> ImeEngine<P> {
    /// Create an engine over `peer`. Worker tasks are spawned on `runtime`.
    pub fn new(
        peer: P,
        service: Arc<dyn SpellService>,
        settings: Settings,
        runtime: Handle,
    ) -> Self {
        let pipeline = SuggestionPipeline::new(
            runtime,
            service,
            settings.debounce(),
            settings.suggestion_count(),
            settings.raw_suggestion_cache_size,
            &settings.language,
        );
        Self {
            bridge: TextFieldBridge::new(peer),
            session: ComposingSession::new(),
            tracker: SelectionTracker::new(settings.cursor_drift_threshold),
            pipeline,
            learning: LearningQueue::new(),
            strip: SuggestionStrip::with_capacity(settings.suggestion_count()),
            context: ImeContext::new(),
            settings,
            field: None,
            shift: ShiftState::Off,
            casing: CasingMode::AsTyped,
            space_after_word: false,
        }
    }

    pub fn context(&self) -> &ImeContext {
        &self.context
    }

    pub fn session(&self) -> &ComposingSession {
        &self.session
    }

    pub fn bridge(&self) -> &TextFieldBridge<P> {
        &self.bridge
    }

    /// Direct access to the host field, for drivers that simulate the host.
    pub fn bridge_mut(&mut self) -> &mut TextFieldBridge<P> {
        &mut self.bridge
    }

    pub fn tracker(&self) -> &SelectionTracker {
        &self.tracker
    }

    pub fn strip(&self) -> &SuggestionStrip {
        &self.strip
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn field(&self) -> Option<FieldInfo> {
        self.field
    }

    pub fn shift(&self) -> ShiftState {
        self.shift
    }

    /// Words whose learning request has not completed yet.
    pub fn learning_in_flight(&self) -> usize {
        self.learning.len()
    }

    // ========== Lifecycle ==========

    /// Begin an input episode on `field`.
    pub fn start_input(&mut self, field: FieldInfo) {
        info!(kind = ?field.kind, multiline = field.multiline, "input started");
        // A previous episode may have left a composing mark behind
        if let Err(e) = self.bridge.finish_composing_text() {
            warn!(error = %e, "could not clear composing span at input start");
        }
        self.field = Some(field);
        self.reset_state();
        let caret = self.bridge.selection().map_or(0, |s| s.end);
        self.tracker.reset(caret);
        self.sync_context();
    }

    /// End the input episode; the composing word stays as plain text.
    pub fn finish_input(&mut self) {
        info!("input finished");
        if !self.session.is_empty() {
            if let Err(e) = self.bridge.finish_composing_text() {
                warn!(error = %e, "could not finish composing at input end");
            }
        }
        self.reset_state();
        self.field = None;
        self.tracker.reset(0);
        self.sync_context();
    }

    fn reset_state(&mut self) {
        self.pipeline.cancel_all();
        self.session.reset();
        self.strip.clear();
        self.casing = CasingMode::AsTyped;
        self.space_after_word = false;
    }

    // ========== Key handling ==========

    /// Process a key event and update the context.
    pub fn process_key(&mut self, key: KeyEvent) -> KeyResult {
        if self.field.is_none() {
            return KeyResult::NotHandled;
        }
        let double_space_armed = std::mem::take(&mut self.space_after_word);
        let result = match key {
            KeyEvent::Char(ch) => self.handle_char(ch),
            KeyEvent::Space => self.handle_space(double_space_armed),
            KeyEvent::Backspace => self.handle_backspace(),
            KeyEvent::Enter => self.handle_enter(),
            KeyEvent::Shift(state) => {
                self.space_after_word = double_space_armed;
                self.set_shift(state)
            }
        };
        self.finish_event(result);
        KeyResult::Handled
    }

    /// Commit a word produced by the gesture decoder.
    pub fn commit_gesture(&mut self, word: &str) -> KeyResult {
        if self.field.is_none() || word.is_empty() {
            return KeyResult::NotHandled;
        }
        self.space_after_word = false;
        let result = self.handle_gesture(word);
        self.finish_event(result);
        KeyResult::Handled
    }

    /// Pick entry `index` of the suggestion strip.
    ///
    /// An empty or shorter strip makes this a no-op, which is what makes a
    /// repeated pick harmless: the first one already cleared the strip.
    pub fn pick_suggestion(&mut self, index: usize) -> KeyResult {
        if self.field.is_none() {
            return KeyResult::NotHandled;
        }
        let Some(picked) = self.strip.get(index).cloned() else {
            return KeyResult::NotHandled;
        };
        self.space_after_word = false;
        let result = if picked.kind == SuggestionKind::Prediction || self.session.is_empty() {
            self.pick_prediction(&picked.text)
        } else {
            self.pick_word(&picked)
        };
        self.finish_event(result);
        KeyResult::Handled
    }

    fn finish_event(&mut self, result: Result<(), HostError>) {
        if let Err(e) = result {
            self.fail_safe(e);
        }
        self.sync_context();
    }

    fn handle_char(&mut self, ch: char) -> Result<(), HostError> {
        if self.is_direct_commit() {
            return self.commit_direct(&ch.to_string());
        }
        let starts_word = self.session.is_empty();
        if !is_word_char(ch) || (is_word_connector(ch) && starts_word) {
            return self.handle_separator(ch);
        }
        self.type_word_char(ch)
    }

    fn type_word_char(&mut self, ch: char) -> Result<(), HostError> {
        if self.session.confirmation_mut().abandon().is_some() {
            debug!("confirmation abandoned, editing resumes");
        }
        self.sync_or_reset()?;
        let sel = self.current_selection()?;

        if self.session.is_suspended() || !sel.is_caret() {
            // Typing over an external selection replaces it with a new word
            if !self.session.is_empty() {
                self.edit(|b| b.finish_composing_text())?;
            }
            self.session.reset();
        }

        let starting = self.session.is_empty();
        if starting {
            self.begin_word();
        }

        let text = casing::apply_to_char(ch, self.casing, starting);
        let cursor = self.session.insert_at_cursor(&text, sel.start);
        if self.shift == ShiftState::OneShot {
            self.shift = ShiftState::Off;
        }
        self.render_composing(cursor)?;
        self.request_suggestions();
        Ok(())
    }

    /// Capture casing intent for a word about to start and drop any
    /// predictions still on the strip.
    fn begin_word(&mut self) {
        self.pipeline.cancel_predictions();
        self.strip.clear();
        let before = self.bridge.text_before_cursor(SENTENCE_LOOKBEHIND);
        let sentence_start =
            self.settings.auto_capitalization_enabled && casing::is_sentence_start(&before);
        let manual = self.shift.is_active();
        self.session.set_casing(sentence_start, manual);
        self.casing = casing::casing_mode(sentence_start, manual, self.shift);
    }

    fn handle_separator(&mut self, ch: char) -> Result<(), HostError> {
        let trailing = ch.to_string();
        if !self.session.is_empty() {
            self.sync_or_reset()?;
        }
        if self.session.is_empty() {
            self.pipeline.cancel_predictions();
            self.strip.clear();
            return self.commit_direct(&trailing);
        }
        let confirmed = self.session.confirmation_mut().commit_as_is().is_some();
        let word = self.session.buffer().to_string();
        let source = self.learn_source(confirmed);
        self.commit_word(&word, &trailing)?;
        self.queue_learning(&word, source);
        Ok(())
    }

    fn handle_space(&mut self, double_space_armed: bool) -> Result<(), HostError> {
        if self.is_direct_commit() {
            return self.commit_direct(" ");
        }
        if !self.session.is_empty() {
            self.sync_or_reset()?;
        }
        if self.session.is_empty() {
            return self.space_without_word(double_space_armed);
        }

        if let Some(Resolution::CommitAsIs { word }) =
            self.session.confirmation_mut().commit_as_is()
        {
            debug!(word = %word, "misspelled word confirmed");
            self.complete_word(&word, LearnSource::ConfirmedSpelling)?;
            return Ok(());
        }

        if self.needs_confirmation() {
            let word = self.session.buffer().to_string();
            self.session.confirmation_mut().begin(&word);
            debug!(word = %word, "word failed validation, awaiting confirmation");
            self.request_suggestions();
            return Ok(());
        }

        let word = self.session.buffer().to_string();
        let source = self.learn_source(false);
        self.complete_word(&word, source)
    }

    /// Commit `word` with a trailing space, learn it, and ask for predictions.
    fn complete_word(&mut self, word: &str, source: LearnSource) -> Result<(), HostError> {
        self.commit_word(word, " ")?;
        self.queue_learning(word, source);
        self.space_after_word = true;
        self.request_predictions(word);
        Ok(())
    }

    fn space_without_word(&mut self, double_space_armed: bool) -> Result<(), HostError> {
        if double_space_armed && self.settings.double_space_period {
            let before: Vec<char> = self.bridge.text_before_cursor(2).chars().collect();
            if before.len() == 2 && before[1] == ' ' && before[0].is_alphanumeric() {
                let caret = self.current_selection()?.start;
                self.edit(|b| {
                    b.delete_surrounding_text(1, 0)?;
                    b.commit_text(". ", 1)
                })?;
                self.tracker.expect(Selection::caret(caret + 1));
                self.pipeline.cancel_predictions();
                self.session.bump_sequence();
                self.strip.clear();
                return Ok(());
            }
        }
        self.commit_direct(" ")
    }

    fn handle_enter(&mut self) -> Result<(), HostError> {
        if !self.session.is_empty() {
            self.sync_or_reset()?;
        }
        if !self.session.is_empty() {
            let confirmed = self.session.confirmation_mut().commit_as_is().is_some();
            let word = self.session.buffer().to_string();
            let source = self.learn_source(confirmed);
            self.commit_word(&word, "")?;
            self.queue_learning(&word, source);
        }
        self.pipeline.cancel_predictions();
        self.strip.clear();

        let field = self.field.unwrap_or_default();
        match field.action {
            Some(action) if !field.multiline => {
                debug!(?action, "performing editor action");
                self.edit(|b| b.perform_editor_action(action))
            }
            _ => self.commit_direct("\n"),
        }
    }

    fn handle_backspace(&mut self) -> Result<(), HostError> {
        if !self.session.is_empty() {
            self.sync_or_reset()?;
        }
        let sel = self.current_selection()?;

        if self.session.is_empty() || self.is_direct_commit() {
            self.pipeline.cancel_predictions();
            self.strip.clear();
            self.session.bump_sequence();
            let removed = self.delete_committed(sel)?;
            if removed > 0 {
                self.try_recompose()?;
            }
            return Ok(());
        }

        if self.session.confirmation_mut().abandon().is_some() {
            debug!("confirmation abandoned by backspace");
        }

        if self.session.is_suspended() || !sel.is_caret() {
            self.edit(|b| b.finish_composing_text())?;
            self.session.reset();
            self.strip.clear();
            self.delete_committed(sel)?;
            return Ok(());
        }

        let region_start = self.session.region_start();
        match self.session.delete_before_cursor(sel.start) {
            DeletedExtent::Removed { cursor, .. } => {
                if self.session.is_empty() {
                    self.edit(|b| b.commit_text("", 1))?;
                    if let Some(start) = region_start {
                        self.tracker.expect(Selection::caret(start));
                    }
                    self.session.reset();
                    self.strip.clear();
                } else {
                    self.render_composing(cursor)?;
                    self.request_suggestions();
                }
            }
            DeletedExtent::DeferToHost => {
                self.edit(|b| b.finish_composing_text())?;
                self.session.reset();
                self.strip.clear();
                let removed = self.delete_committed(sel)?;
                if removed > 0 {
                    self.try_recompose()?;
                }
            }
        }
        Ok(())
    }

    /// Delete committed text before the caret (or the selected range).
    fn delete_committed(&mut self, sel: Selection) -> Result<usize, HostError> {
        let removed = self.edit(|b| b.delete_before_cursor())?;
        let caret = if sel.is_caret() {
            sel.start.saturating_sub(removed)
        } else {
            sel.start
        };
        self.tracker.expect(Selection::caret(caret));
        Ok(removed)
    }

    fn handle_gesture(&mut self, word: &str) -> Result<(), HostError> {
        if self.is_direct_commit() {
            return self.commit_direct(word);
        }
        if !self.session.is_empty() {
            self.sync_or_reset()?;
        }
        if !self.session.is_empty() {
            let confirmed = self.session.confirmation_mut().commit_as_is().is_some();
            let previous = self.session.buffer().to_string();
            let source = self.learn_source(confirmed);
            self.commit_word(&previous, " ")?;
            self.queue_learning(&previous, source);
        }

        let before = self.bridge.text_before_cursor(1);
        if before.chars().last().is_some_and(is_word_char) {
            self.commit_direct(" ")?;
        }

        self.begin_word();
        let cased = casing::apply(word, self.casing);
        let sel = self.current_selection()?;
        let sentence_start = self.session.is_at_sentence_start();
        let manual = self.session.is_manual_shifted();
        self.session.start_word(&cased, sel.start, true);
        self.session.set_casing(sentence_start, manual);
        if self.shift == ShiftState::OneShot {
            self.shift = ShiftState::Off;
        }
        let len = self.session.len();
        self.render_composing(len)?;
        self.request_suggestions();
        Ok(())
    }

    fn pick_word(&mut self, picked: &Suggestion) -> Result<(), HostError> {
        self.sync_or_reset()?;
        if self.session.is_empty() {
            return Ok(());
        }
        let learn = if picked.kind == SuggestionKind::Typed {
            let confirmed = self.session.confirmation_mut().commit_as_is().is_some();
            Some(self.learn_source(confirmed))
        } else {
            // Suggestions are already known words
            if let Some(Resolution::AcceptSuggestion { suggestion }) =
                self.session.confirmation_mut().accept_suggestion(&picked.text)
            {
                debug!(suggestion = %suggestion, "suggestion replaced misspelled word");
            }
            None
        };
        self.commit_word(&picked.text, " ")?;
        if let Some(source) = learn {
            self.queue_learning(&picked.text, source);
        }
        self.space_after_word = true;
        self.request_predictions(&picked.text);
        Ok(())
    }

    fn pick_prediction(&mut self, word: &str) -> Result<(), HostError> {
        self.strip.clear();
        self.commit_direct(&format!("{word} "))?;
        self.space_after_word = true;
        self.request_predictions(word);
        Ok(())
    }

    // ========== Shift and casing ==========

    /// Change the shift state. Mid-word, the buffer and its suggestions are
    /// re-cased without recomputing them.
    fn set_shift(&mut self, shift: ShiftState) -> Result<(), HostError> {
        self.shift = shift;
        if self.session.is_empty() || self.is_direct_commit() {
            return Ok(());
        }
        self.sync_or_reset()?;
        if self.session.is_empty() {
            return Ok(());
        }
        let sentence_start = self.session.is_at_sentence_start();
        let manual = shift.is_active();
        let next = casing::casing_mode(sentence_start, manual, shift);
        if next == self.casing {
            return Ok(());
        }

        let recased = casing::recase_buffer(self.session.buffer(), self.casing, next);
        self.casing = next;
        self.session.set_casing(sentence_start, manual);
        let Some(sel) = self.bridge.selection() else {
            return Err(HostError::Disconnected);
        };
        let cursor = self.session.logical_cursor(sel.start);
        self.session.replace_buffer(&recased);
        self.session.confirmation_mut().recase(&recased);
        self.render_composing(cursor)?;

        let key = self.session.word_state().normalized_buffer.clone();
        match self.pipeline.cached(&key) {
            Some(raw) => self.show_word_suggestions(&raw),
            None => self.request_suggestions(),
        }
        Ok(())
    }

    fn render_mode(&self) -> CasingMode {
        self.casing
            .max(casing::infer_from_buffer(self.session.buffer()))
    }

    // ========== Selection notifications ==========

    /// Handle the host's selection-change notification.
    pub fn on_selection_changed(&mut self, change: SelectionChange) -> SelectionClass {
        let region = self.session.region();
        let class = self
            .tracker
            .classify(&change, region.clone(), self.session.is_actively_editing());
        let inside = region
            .as_ref()
            .is_some_and(|r| change.new.is_caret() && change.new.start >= r.start && change.new.start <= r.end);

        match class {
            SelectionClass::LocalEcho => {}
            SelectionClass::Sequential => {
                if self.session.is_suspended() && inside {
                    self.session.resume();
                }
            }
            SelectionClass::ExternalExtension => {
                self.space_after_word = false;
                if !self.session.is_empty() {
                    debug!(selection = ?change.new, "external selection, session suspended");
                    self.session.suspend();
                }
            }
            SelectionClass::NonSequentialJump => {
                self.space_after_word = false;
                if self.session.is_suspended() && inside {
                    debug!("selection collapsed back into the word, session resumed");
                    self.session.resume();
                } else {
                    let result = self.handle_jump(change.new);
                    if let Err(e) = result {
                        self.fail_safe(e);
                    }
                }
            }
        }
        self.sync_context();
        class
    }

    fn handle_jump(&mut self, new: Selection) -> Result<(), HostError> {
        let had_session = !self.session.is_empty();
        // Invalidate first so nothing in flight can land on the old word
        self.session.reset();
        self.pipeline.cancel_all();
        self.strip.clear();
        debug!(had_session, ?new, "cursor jump, session cleared");
        if had_session {
            self.edit(|b| b.finish_composing_text())?;
        }
        if new.is_caret() {
            self.try_recompose()?;
        }
        Ok(())
    }

    /// Recover the word at a bare caret into a new session.
    fn try_recompose(&mut self) -> Result<bool, HostError> {
        if self.is_direct_commit() {
            return Ok(false);
        }
        let limit = self.settings.recomposition_scan_limit;
        let Some(span) = self.edit(|b| b.recompose(limit))? else {
            return Ok(false);
        };
        self.session.start_word(&span.text, span.start, false);
        self.casing = casing::infer_from_buffer(&span.text);
        self.request_suggestions();
        Ok(true)
    }

    // ========== Pipeline ==========

    fn request_suggestions(&mut self) {
        if self.session.is_empty() || self.is_direct_commit() {
            return;
        }
        self.session.bump_sequence();
        let snapshot = self.session.snapshot();
        let state = self.session.word_state();
        let key = state.normalized_buffer.clone();
        let method = if state.is_from_swipe {
            InputMethod::Gesture
        } else {
            InputMethod::Typing
        };
        self.pipeline.request_suggestions(snapshot, key, method);
    }

    fn request_predictions(&mut self, word: &str) {
        if !self.settings.show_suggestions || !self.session.is_empty() {
            return;
        }
        let sequence = self.session.bump_sequence();
        let count = self.settings.suggestion_count();
        self.pipeline.request_predictions(sequence, word, count);
    }

    /// Apply a worker result if it still matches the live session.
    pub fn handle_message(&mut self, message: PipelineMessage) -> MessageOutcome {
        let outcome = match message {
            PipelineMessage::Suggestions {
                snapshot,
                key,
                result,
            } => {
                if let Some(result) = &result {
                    self.pipeline.remember(&key, result);
                }
                if !self.session.accepts(&snapshot) {
                    debug!(
                        stale = %snapshot.buffer,
                        sequence = snapshot.sequence,
                        live = self.session.sequence(),
                        "discarding stale suggestions"
                    );
                    return MessageOutcome::Discarded;
                }
                match result {
                    Some(result) => self.show_word_suggestions(&result),
                    None => {
                        self.session.set_suggestions(Vec::new(), None);
                        self.strip.clear();
                    }
                }
                MessageOutcome::SuggestionsApplied
            }
            PipelineMessage::Predictions {
                sequence,
                prev_word,
                words,
            } => {
                if !self.session.is_empty()
                    || self.session.sequence() != sequence
                    || !self.settings.show_suggestions
                {
                    debug!(prev_word = %prev_word, sequence, "discarding stale predictions");
                    return MessageOutcome::Discarded;
                }
                self.strip
                    .set(Suggestion::ranked(words, SuggestionKind::Prediction));
                MessageOutcome::PredictionsApplied
            }
            PipelineMessage::Learned { word, outcome } => {
                self.learning.finish(&word);
                self.pipeline.forget(&utils::normalize(&word).to_lowercase());
                if let LearnOutcome::Failed(e) = &outcome {
                    debug!(word = %word, error = %e, "learning dropped");
                }
                MessageOutcome::Learned { word, outcome }
            }
        };
        self.sync_context();
        outcome
    }

    /// Apply every message already waiting.
    pub fn pump(&mut self) -> Vec<MessageOutcome> {
        let mut outcomes = Vec::new();
        while let Some(message) = self.pipeline.try_recv() {
            outcomes.push(self.handle_message(message));
        }
        outcomes
    }

    /// Wait for the next worker message and apply it.
    pub async fn next_message(&mut self) -> Option<MessageOutcome> {
        let message = self.pipeline.recv().await?;
        Some(self.handle_message(message))
    }

    fn show_word_suggestions(&mut self, raw: &SuggestionResult) {
        let mode = self.render_mode();
        let mut suggestions = vec![Suggestion::typed(self.session.buffer())];
        let corrections = raw
            .corrections
            .iter()
            .map(|w| casing::apply(w, mode))
            .collect();
        suggestions.extend(Suggestion::ranked(corrections, SuggestionKind::Correction));
        self.session.set_suggestions(suggestions.clone(), Some(raw.valid));
        if self.settings.show_suggestions || self.session.confirmation().is_awaiting() {
            self.strip.set(suggestions);
        }
    }

    fn queue_learning(&mut self, word: &str, source: LearnSource) {
        if !self.settings.word_learning_enabled || self.is_direct_commit() {
            return;
        }
        if !word.chars().any(char::is_alphabetic) {
            return;
        }
        if !self.learning.begin(word) {
            debug!(word, "learning already queued");
            return;
        }
        self.pipeline.learn(word, source);
    }

    fn learn_source(&self, confirmed: bool) -> LearnSource {
        if confirmed {
            LearnSource::ConfirmedSpelling
        } else if self.session.word_state().is_from_swipe {
            LearnSource::Gesture
        } else {
            LearnSource::Typed
        }
    }

    fn needs_confirmation(&self) -> bool {
        let state = self.session.word_state();
        if !self.settings.spell_check_enabled || !state.requires_spell_check {
            return false;
        }
        let valid = state
            .validity
            .unwrap_or_else(|| self.pipeline.validate_now(&state.normalized_buffer));
        !valid
    }

    // ========== Host edits ==========

    fn is_direct_commit(&self) -> bool {
        self.field.is_some_and(|f| f.kind.is_direct_commit())
    }

    fn current_selection(&self) -> Result<Selection, HostError> {
        self.bridge.selection().ok_or(HostError::Disconnected)
    }

    /// Run a host edit inside a batch, flagged as self-issued.
    fn edit<R>(
        &mut self,
        f: impl FnOnce(&mut TextFieldBridge<P>) -> Result<R, HostError>,
    ) -> Result<R, HostError> {
        self.session.set_actively_editing(true);
        let result = self.bridge.batch(f);
        self.session.set_actively_editing(false);
        result
    }

    /// Show the buffer as the host's composing text with the caret at
    /// `cursor` inside it.
    fn render_composing(&mut self, cursor: usize) -> Result<(), HostError> {
        let Some(start) = self.session.region_start() else {
            return Ok(());
        };
        let buffer = self.session.buffer().to_string();
        let len = self.session.len();
        let caret = start + cursor.min(len);
        self.edit(|b| {
            b.set_composing_text(&buffer, 1)?;
            if caret != start + len {
                b.set_selection(caret, caret)?;
            }
            Ok(())
        })?;
        self.tracker.expect(Selection::caret(caret));
        Ok(())
    }

    /// Replace the composing word with `text` + `trailing` and end the session.
    fn commit_word(&mut self, text: &str, trailing: &str) -> Result<(), HostError> {
        let start = self.session.region_start();
        let committed = format!("{text}{trailing}");
        self.pipeline.cancel_suggestions();
        self.edit(|b| b.commit_text(&committed, 1))?;
        if let Some(start) = start {
            self.tracker
                .expect(Selection::caret(start + committed.chars().count()));
        }
        debug!(word = %text, "word committed");
        self.session.reset();
        self.strip.clear();
        self.casing = CasingMode::AsTyped;
        Ok(())
    }

    /// Commit `text` at the caret with no composing involved.
    fn commit_direct(&mut self, text: &str) -> Result<(), HostError> {
        let sel = self.current_selection()?;
        self.edit(|b| b.commit_text(text, 1))?;
        self.tracker
            .expect(Selection::caret(sel.start + text.chars().count()));
        Ok(())
    }

    /// Re-read the composing span; on mismatch the session has already been
    /// reset and the host's composing mark is dropped.
    fn sync_or_reset(&mut self) -> Result<(), HostError> {
        if self.session.ensure_synced(&self.bridge) {
            return Ok(());
        }
        self.pipeline.cancel_suggestions();
        self.strip.clear();
        self.edit(|b| b.finish_composing_text())
    }

    /// Fail-safe path for a failed host call: keep whatever the host shows as
    /// plain text and start over.
    fn fail_safe(&mut self, error: HostError) {
        warn!(error = %error, "host edit failed, composing state reset");
        if let Err(e) = self.bridge.finish_composing_text() {
            debug!(error = %e, "finish_composing_text failed during recovery");
        }
        self.pipeline.cancel_all();
        self.session.reset();
        self.strip.clear();
        self.casing = CasingMode::AsTyped;
        self.space_after_word = false;
        let caret = self.bridge.selection().map_or(0, |s| s.end);
        self.tracker.reset(caret);
    }

    fn sync_context(&mut self) {
        let state = self.session.word_state();
        self.context.composing_text = self.session.buffer().to_string();
        self.context.candidates = self.strip.texts();
        self.context.showing_predictions = self.strip.is_prediction();
        self.context.highlight_misspelled = self.session.confirmation().is_awaiting();
        self.context.validity = state.validity;
        self.context.shift = self.shift;
        self.context.field_kind = self.field.map(|f| f.kind);
    }
}

impl ImeEngine<MemoryTextField> {
    /// Deliver every queued host notification, oldest first.
    pub fn deliver_selection_updates(&mut self) -> Vec<SelectionClass> {
        let updates = self.bridge.peer_mut().take_selection_updates();
        updates
            .into_iter()
            .map(|change| self.on_selection_changed(change))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FieldKind;
    use crate::spell::InMemorySpellService;

    fn engine_with(text: &str, settings: Settings) -> ImeEngine<MemoryTextField> {
        let service = InMemorySpellService::with_words(
            "en",
            [("hello", 100), ("hell", 20), ("the", 500), ("world", 80), ("don't", 40)],
        );
        let mut engine = ImeEngine::new(
            MemoryTextField::with_text(text),
            Arc::new(service),
            settings,
            Handle::current(),
        );
        engine.start_input(FieldInfo::text());
        engine
    }

    fn engine(text: &str) -> ImeEngine<MemoryTextField> {
        let settings = Settings {
            auto_capitalization_enabled: false,
            suggestion_debounce_ms: 1,
            ..Settings::default()
        };
        engine_with(text, settings)
    }

    fn type_str(engine: &mut ImeEngine<MemoryTextField>, text: &str) {
        for ch in text.chars() {
            let key = if ch == ' ' {
                KeyEvent::Space
            } else {
                KeyEvent::Char(ch)
            };
            engine.process_key(key);
        }
    }

    #[tokio::test]
    async fn test_keys_ignored_outside_episode() {
        let mut engine = engine("");
        engine.finish_input();
        assert_eq!(engine.process_key(KeyEvent::Char('a')), KeyResult::NotHandled);
        assert_eq!(engine.bridge().peer().text(), "");
    }

    #[tokio::test]
    async fn test_typing_composes_in_host() {
        let mut engine = engine("");
        type_str(&mut engine, "hel");
        let field = engine.bridge().peer();
        assert_eq!(field.composing_text().as_deref(), Some("hel"));
        assert_eq!(engine.session().region(), Some(0..3));
        assert_eq!(engine.context().composing_text, "hel");
    }

    #[tokio::test]
    async fn test_punctuation_commits_word() {
        let mut engine = engine("");
        type_str(&mut engine, "hello,");
        assert_eq!(engine.bridge().peer().text(), "hello,");
        assert!(engine.session().is_empty());
        assert_eq!(engine.bridge().peer().composing_region(), None);
    }

    #[tokio::test]
    async fn test_apostrophe_inside_word() {
        let mut engine = engine("");
        type_str(&mut engine, "don't");
        assert_eq!(engine.session().buffer(), "don't");
        type_str(&mut engine, " 'x");
        assert_eq!(engine.bridge().peer().text(), "don't 'x");
        assert_eq!(engine.session().buffer(), "x");
    }

    #[tokio::test]
    async fn test_auto_capitalization_at_sentence_start() {
        let settings = Settings {
            suggestion_debounce_ms: 1,
            ..Settings::default()
        };
        let mut engine = engine_with("", settings);
        type_str(&mut engine, "hello world");
        assert_eq!(engine.bridge().peer().text(), "Hello world");
    }

    #[tokio::test]
    async fn test_double_space_period() {
        let mut engine = engine("");
        type_str(&mut engine, "hello  ");
        assert_eq!(engine.bridge().peer().text(), "hello. ");

        // Not armed after a plain space
        let mut engine = self::engine("a, ");
        engine.process_key(KeyEvent::Space);
        assert_eq!(engine.bridge().peer().text(), "a,  ");
    }

    #[tokio::test]
    async fn test_shift_locked_and_one_shot() {
        let mut engine = engine("");
        engine.process_key(KeyEvent::Shift(ShiftState::OneShot));
        type_str(&mut engine, "he");
        assert_eq!(engine.session().buffer(), "He");
        assert_eq!(engine.shift(), ShiftState::Off);

        engine.process_key(KeyEvent::Shift(ShiftState::Locked));
        assert_eq!(engine.session().buffer(), "HE");
        type_str(&mut engine, "l");
        assert_eq!(engine.session().buffer(), "HEL");
        assert_eq!(engine.bridge().peer().composing_text().as_deref(), Some("HEL"));

        engine.process_key(KeyEvent::Shift(ShiftState::Off));
        assert_eq!(engine.session().buffer(), "hel");
    }

    #[tokio::test]
    async fn test_enter_performs_action_in_single_line_field() {
        let mut engine = engine("");
        engine.start_input(FieldInfo {
            kind: FieldKind::Text,
            multiline: false,
            action: Some(crate::host::EditorAction::Send),
        });
        type_str(&mut engine, "hello");
        engine.process_key(KeyEvent::Enter);
        let field = engine.bridge().peer();
        assert_eq!(field.text(), "hello");
        assert_eq!(field.actions(), &[crate::host::EditorAction::Send]);
    }

    #[tokio::test]
    async fn test_enter_commits_newline_in_multiline_field() {
        let mut engine = engine("");
        engine.start_input(FieldInfo {
            kind: FieldKind::Text,
            multiline: true,
            action: Some(crate::host::EditorAction::Send),
        });
        type_str(&mut engine, "hi");
        engine.process_key(KeyEvent::Enter);
        assert_eq!(engine.bridge().peer().text(), "hi\n");
        assert!(engine.bridge().peer().actions().is_empty());
    }

    #[tokio::test]
    async fn test_password_field_commits_directly() {
        let mut engine = engine("");
        engine.start_input(FieldInfo::with_kind(FieldKind::Password));
        type_str(&mut engine, "pw d");
        assert!(engine.session().is_empty());
        assert_eq!(engine.bridge().peer().text(), "pw d");
        assert_eq!(engine.bridge().peer().composing_region(), None);
        assert_eq!(engine.learning_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_gesture_auto_space() {
        let mut engine = engine("say");
        engine.commit_gesture("hello");
        assert_eq!(engine.bridge().peer().text(), "say hello");
        assert!(engine.session().word_state().is_from_swipe);
        assert_eq!(engine.session().region(), Some(4..9));

        engine.commit_gesture("world");
        assert_eq!(engine.bridge().peer().text(), "say hello world");
        assert_eq!(engine.session().buffer(), "world");
    }

    #[tokio::test]
    async fn test_backspace_without_session_recomposes() {
        let mut engine = engine("hello ");
        engine.process_key(KeyEvent::Backspace);
        assert_eq!(engine.bridge().peer().text(), "hello");
        assert_eq!(engine.session().buffer(), "hello");
        assert_eq!(engine.bridge().peer().composing_region(), Some(0..5));

        engine.process_key(KeyEvent::Backspace);
        assert_eq!(engine.bridge().peer().text(), "hell");
        assert_eq!(engine.session().buffer(), "hell");
    }

    #[tokio::test]
    async fn test_host_failure_resets_session() {
        let mut engine = engine("");
        type_str(&mut engine, "hel");
        engine.bridge_mut().peer_mut().set_connected(false);
        assert_eq!(engine.process_key(KeyEvent::Char('l')), KeyResult::Handled);
        assert!(engine.session().is_empty());
        assert!(engine.context().candidates.is_empty());

        engine.bridge_mut().peer_mut().set_connected(true);
        engine.start_input(FieldInfo::text());
        type_str(&mut engine, " ok");
        assert_eq!(engine.bridge().peer().text(), "hel ok");
    }
}
