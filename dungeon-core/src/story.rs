//! The story session.
//!
//! A [`Story`] owns the context (standing premise), the player's memory
//! entries, the transcript of `(action, result)` turns and the character
//! sheet. Every mutating operation takes `&mut self`, so a session can only
//! ever be idle or running one generation.

use crate::character::CharacterSheet;
use crate::config::{ConfigError, SamplingParams, Settings};
use crate::generator::{Generator, Overrides};
use crate::persist::{sanitize_save_name, save_path, PersistError, SavedStory};
use crate::text::{capitalize, detect_acquisitions, format_input, format_result, similarity};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

const SUGGESTION_PROMPT: &str = include_str!("prompts/suggestion.txt");
const SUMMARIZE_PROMPT: &str = include_str!("prompts/summarize.txt");

/// Token budget for a suggested action.
const SUGGESTION_TOKENS: u32 = 20;

/// Sampling for history summaries.
const SUMMARY_TEMPERATURE: f32 = 0.2;
const SUMMARY_TOKENS: u32 = 100;

lazy_static::lazy_static! {
    static ref LEADING_YOU: Regex = Regex::new(r"(?i)^you\s+").expect("leading you pattern");
    static ref LEADING_THAT: Regex = Regex::new(r"(?i)^that\s+").expect("leading that pattern");
}

/// Errors from story operations.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("There is no memory #{0}")]
    NoSuchMemory(usize),

    #[error("There is nothing to remember")]
    EmptyMemory,

    #[error("The summary is empty")]
    EmptySummary,

    #[error("There is nothing to revert")]
    NothingToRevert,

    #[error("The story has no turns yet")]
    EmptyTranscript,

    #[error("The AI is looping, the last turn was reverted")]
    Looping,

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Per-story tuning that is not part of the saved record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoryConfig {
    /// Compact once the transcript holds more turns than this.
    pub summarize_threshold: usize,
    /// Oldest turns folded into one summary.
    pub summarize_chunk: usize,
    pub loop_threshold: f64,
    pub action_temperature: f32,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for StoryConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            summarize_threshold: settings.summarize_threshold,
            summarize_chunk: settings.summarize_chunk,
            loop_threshold: settings.loop_threshold,
            action_temperature: settings.action_temp,
        }
    }
}

/// Outcome of one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// The formatted result text.
    pub text: String,
    /// Every generation attempt came back empty.
    pub degenerate: bool,
    /// Items newly added to the inventory this turn.
    pub acquired: Vec<String>,
}

/// Outcome of a history compaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compaction {
    /// The oldest `turns` turns were folded into the context.
    Compacted { turns: usize },
    /// The model returned an empty summary; nothing changed.
    Skipped,
    /// There were no turns to compact.
    NotNeeded,
}

/// Player actions are shown with a caret.
fn action_line(action: &str) -> String {
    if LEADING_YOU.is_match(action.trim_start()) {
        format!("> {action}")
    } else {
        action.to_string()
    }
}

/// First line of a generated suggestion, without a leading "You".
fn clean_suggestion(raw: &str) -> String {
    let line = raw.trim_start().lines().next().unwrap_or_default().trim();
    let line = line.trim_start_matches('>').trim_start();
    let line = LEADING_YOU.replace(line, "");
    line.trim().trim_matches('"').trim().to_string()
}

/// An interactive story session.
pub struct Story {
    generator: Arc<Generator>,
    context: String,
    memory: Vec<String>,
    actions: Vec<String>,
    results: Vec<String>,
    sheet: CharacterSheet,
    sampling: SamplingParams,
    config: StoryConfig,
    savefile: Option<String>,
}

impl Story {
    /// An empty story. Call [`Story::start`] to generate the opening.
    pub fn new(generator: Arc<Generator>, context: impl Into<String>, sampling: SamplingParams) -> Self {
        Self {
            generator,
            context: context.into().trim().to_string(),
            memory: Vec::new(),
            actions: Vec::new(),
            results: Vec::new(),
            sheet: CharacterSheet::new(),
            sampling,
            config: StoryConfig::default(),
            savefile: None,
        }
    }

    pub fn with_config(mut self, config: StoryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_memory(mut self, memory: Vec<String>) -> Self {
        self.memory = memory;
        self
    }

    /// Generate and record the opening turn from the first prompt.
    pub async fn start(&mut self, prompt: &str) -> TurnResult {
        assert!(self.actions.is_empty(), "story already started");
        info!(context_len = self.context.len(), "Starting story");
        self.act(prompt.trim(), true).await
    }

    /// Record an opening turn whose result is already known, without
    /// generating. Items the result mentions are picked up.
    ///
    /// # Panics
    ///
    /// Panics if the story already has turns.
    pub fn with_opening(mut self, prompt: &str, result: &str) -> Self {
        assert!(self.actions.is_empty(), "story already started");
        for item in detect_acquisitions(result) {
            self.sheet.add_item(&item);
        }
        self.actions.push(format_input(prompt.trim()));
        self.results.push(format_input(result));
        debug!(inventory = ?self.sheet.items().collect::<Vec<_>>(), "Opening recorded");
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn memory(&self) -> &[String] {
        &self.memory
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn results(&self) -> &[String] {
        &self.results
    }

    pub fn turns(&self) -> usize {
        self.actions.len()
    }

    pub fn last_result(&self) -> Option<&str> {
        self.results.last().map(String::as_str)
    }

    pub fn sheet(&self) -> &CharacterSheet {
        &self.sheet
    }

    pub fn sheet_mut(&mut self) -> &mut CharacterSheet {
        &mut self.sheet
    }

    pub fn sampling(&self) -> &SamplingParams {
        &self.sampling
    }

    /// Replace the sampling parameters for the turns that follow.
    pub fn set_sampling(&mut self, sampling: SamplingParams) -> Result<(), StoryError> {
        sampling.validate()?;
        info!(?sampling, "Sampling parameters changed");
        self.sampling = sampling;
        Ok(())
    }

    pub fn config(&self) -> &StoryConfig {
        &self.config
    }

    pub fn generator(&self) -> &Arc<Generator> {
        &self.generator
    }

    /// Name of the save this story was last saved to or loaded from.
    pub fn savefile(&self) -> Option<&str> {
        self.savefile.as_deref()
    }

    /// The transcript as prompt text, turns separated by blank lines.
    pub fn story_text(&self) -> String {
        self.actions
            .iter()
            .zip(&self.results)
            .flat_map(|(action, result)| [action_line(action), result.clone()])
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Run one turn.
    ///
    /// An action starting with `!` is inserted into the story verbatim and
    /// is scanned for acquisitions along with the result. With `record` the
    /// turn is appended to the transcript and history is compacted once it
    /// grows past the configured threshold.
    ///
    /// # Panics
    ///
    /// Panics if both the context and the action are blank.
    pub async fn act(&mut self, action: &str, record: bool) -> TurnResult {
        assert!(
            !self.context.trim().is_empty() || !action.trim().is_empty(),
            "a turn needs a context or an action"
        );

        let (action, inserted) = match action.trim_start().strip_prefix('!') {
            Some(rest) => (rest.trim(), true),
            None => (action, false),
        };

        let prompt = self.generator.build_prompt(
            &self.context,
            &self.memory,
            &self.story_text(),
            &action_line(action),
        );
        let result = self.generator.generate(&prompt, &self.sampling).await;
        let degenerate = result.is_empty();
        if degenerate {
            warn!(action, "Generation came back empty");
        }

        let mut found = if inserted {
            detect_acquisitions(action)
        } else {
            Vec::new()
        };
        for item in detect_acquisitions(&result) {
            if !found.contains(&item) {
                found.push(item);
            }
        }
        let acquired: Vec<String> = found
            .into_iter()
            .filter(|item| self.sheet.add_item(item))
            .collect();

        if record {
            self.actions.push(format_input(action));
            self.results.push(format_input(&result));
            debug!(turns = self.actions.len(), "Turn recorded");

            if self.actions.len() > self.config.summarize_threshold {
                self.summarize_chunk().await;
            }
        }

        TurnResult {
            text: format_result(&result),
            degenerate,
            acquired,
        }
    }

    /// Run and record a turn, undoing it if the story started looping.
    pub async fn play(&mut self, action: &str) -> Result<TurnResult, StoryError> {
        let turn = self.act(action, true).await;
        if self.is_looping(self.config.loop_threshold) {
            warn!("Story is looping, reverting the last turn");
            self.revert();
            return Err(StoryError::Looping);
        }
        Ok(turn)
    }

    /// Remove and return the last turn.
    pub fn revert(&mut self) -> Option<(String, String)> {
        let action = self.actions.pop()?;
        let result = self.results.pop()?;
        debug!(turns = self.actions.len(), "Turn reverted");
        Some((action, result))
    }

    /// Generate the last turn again from the same action.
    ///
    /// On a story with a single turn this regenerates the opening.
    pub async fn retry(&mut self) -> Result<TurnResult, StoryError> {
        let (action, _) = self.revert().ok_or(StoryError::NothingToRevert)?;
        info!(action = %action, "Retrying last action");
        let turn = self.act(&action, true).await;
        if self.is_looping(self.config.loop_threshold) {
            self.revert();
            return Err(StoryError::Looping);
        }
        Ok(turn)
    }

    /// Whether the two most recent results are near-identical. Empty
    /// results are degenerate turns, never a loop.
    pub fn is_looping(&self, threshold: f64) -> bool {
        match self.results.as_slice() {
            [.., previous, last] if !previous.is_empty() && !last.is_empty() => {
                similarity(previous, last) > threshold
            }
            _ => false,
        }
    }

    /// One turn as shown to the player. The opening turn includes the
    /// context.
    pub fn render_turn(&self, i: usize) -> Option<String> {
        let action = self.actions.get(i)?;
        let result = format_result(self.results.get(i)?);

        if i > 0 {
            let text = if action.is_empty() {
                result
            } else {
                format!("{}\n{result}", action_line(action))
            };
            return Some(text);
        }

        let context = format_result(&self.context);
        let opening = if action.is_empty() {
            context
        } else {
            format!("{context}\n{}", format_result(action))
        };
        // Join a result that carries on the opening sentence with a space
        let ends_sentence = opening.trim_end().ends_with(['.', '!', '?']);
        let continues = result
            .chars()
            .next()
            .is_some_and(|c| c.is_lowercase() || matches!(c, '.' | '!' | '?' | ',' | '"'));
        let separator = if !ends_sentence && continues { " " } else { "\n" };
        Some(format!("{opening}{separator}{result}").trim().to_string())
    }

    pub fn render_last(&self) -> Option<String> {
        self.render_turn(self.turns().checked_sub(1)?)
    }

    /// The whole story as shown to the player.
    pub fn render(&self) -> String {
        (0..self.turns())
            .filter_map(|i| self.render_turn(i))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Ask the model for one short action suggestion, avoiding `exclude`.
    /// Returns an empty string when the model produced nothing usable.
    pub async fn suggestion(&self, exclude: &[String]) -> String {
        let scene = self
            .generator
            .build_prompt(&self.context, &self.memory, &self.story_text(), "");
        let mut prompt = format!("{}\n\n{}", scene.trim_end(), SUGGESTION_PROMPT.trim());
        if !exclude.is_empty() {
            prompt.push_str(&format!(
                "\nDo not suggest any of the following: {}.",
                exclude.join("; ")
            ));
        }
        prompt.push_str("\n\n> You");

        let overrides = Overrides::default()
            .temperature(self.config.action_temperature)
            .repetition_penalty(1.0)
            .max_tokens(SUGGESTION_TOKENS)
            .stop("\n");
        let raw = self
            .generator
            .generate_raw(&prompt, &self.sampling, &overrides)
            .await;
        clean_suggestion(&raw)
    }

    /// Add a memory entry. "that the king is dead!" is stored as
    /// "The king is dead.".
    pub fn remember(&mut self, text: &str) -> Result<&str, StoryError> {
        let text = LEADING_THAT.replace(text.trim(), "");
        let text = text.trim().trim_end_matches(['.', '!', '?']).trim();
        if text.is_empty() {
            return Err(StoryError::EmptyMemory);
        }
        self.memory.push(format!("{}.", capitalize(text)));
        info!(entries = self.memory.len(), "Memory added");
        Ok(self.memory.last().map(String::as_str).unwrap_or_default())
    }

    /// Remove memory entry `i` and return it.
    pub fn forget(&mut self, i: usize) -> Result<String, StoryError> {
        if i >= self.memory.len() {
            return Err(StoryError::NoSuchMemory(i));
        }
        Ok(self.memory.remove(i))
    }

    pub fn swap_memories(&mut self, i: usize, j: usize) -> Result<(), StoryError> {
        for index in [i, j] {
            if index >= self.memory.len() {
                return Err(StoryError::NoSuchMemory(index));
            }
        }
        self.memory.swap(i, j);
        Ok(())
    }

    /// Replace memory entry `i`; blank text removes it.
    pub fn alter_memory(&mut self, i: usize, text: &str) -> Result<(), StoryError> {
        if i >= self.memory.len() {
            return Err(StoryError::NoSuchMemory(i));
        }
        let text = text.trim();
        if text.is_empty() {
            self.memory.remove(i);
        } else {
            self.memory[i] = text.to_string();
        }
        Ok(())
    }

    /// Replace the text of the last result.
    pub fn alter_last_result(&mut self, text: &str) -> Result<(), StoryError> {
        let last = self.results.last_mut().ok_or(StoryError::EmptyTranscript)?;
        *last = format_input(text);
        Ok(())
    }

    pub fn set_context(&mut self, text: &str) {
        self.context = text.trim().to_string();
    }

    /// Rewrite the last result as `prefix` followed by a fresh continuation.
    pub async fn regenerate_from(&mut self, prefix: &str) -> Result<String, StoryError> {
        let last = self
            .results
            .len()
            .checked_sub(1)
            .ok_or(StoryError::EmptyTranscript)?;
        self.results[last].clear();

        let continuation = self.act(prefix, false).await;
        let text = format_input(&format!("{} {}", prefix.trim(), continuation.text));
        self.results[last] = text.clone();
        Ok(text)
    }

    /// Restart from a player-written summary.
    ///
    /// The summary becomes the context and the transcript shrinks to a single
    /// turn holding the last result. Memory and inventory are kept; the story
    /// is detached from its save file.
    pub fn summarize_with(&mut self, summary: &str) -> Result<(), StoryError> {
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(StoryError::EmptySummary);
        }

        let last = self.results.pop();
        self.context = summary.to_string();
        self.actions.clear();
        self.results.clear();
        if let Some(last) = last.filter(|r| !r.is_empty()) {
            self.actions.push(String::new());
            self.results.push(last);
        }
        self.savefile = None;
        info!("Story restarted from summary");
        Ok(())
    }

    /// Fold the oldest turns into a summary prepended to the context.
    pub async fn summarize_chunk(&mut self) -> Compaction {
        let chunk = self.config.summarize_chunk.min(self.actions.len());
        if chunk == 0 {
            return Compaction::NotNeeded;
        }

        let passage = self.actions[..chunk]
            .iter()
            .zip(&self.results[..chunk])
            .flat_map(|(action, result)| {
                let action = (!action.is_empty()).then(|| format!("> {action}"));
                action.into_iter().chain(std::iter::once(result.clone()))
            })
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!("{}\n\n{passage}", SUMMARIZE_PROMPT.trim_end());

        let overrides = Overrides::default()
            .temperature(SUMMARY_TEMPERATURE)
            .max_tokens(SUMMARY_TOKENS);
        let summary = self
            .generator
            .generate_raw(&prompt, &self.sampling, &overrides)
            .await;
        let summary = format_input(&summary);
        if summary.is_empty() {
            warn!(chunk, "Empty summary, history left as is");
            return Compaction::Skipped;
        }

        let previously = format!("[Previously: {summary}]");
        self.context = if self.context.is_empty() {
            previously
        } else {
            format!("{previously}\n{}", self.context)
        };
        self.actions.drain(..chunk);
        self.results.drain(..chunk);

        info!(turns = chunk, remaining = self.actions.len(), "History compacted");
        Compaction::Compacted { turns: chunk }
    }

    /// Snapshot for saving.
    pub fn to_saved(&self) -> SavedStory {
        SavedStory {
            temp: self.sampling.temperature,
            top_p: self.sampling.top_p,
            top_k: self.sampling.top_k,
            rep_pen: self.sampling.repetition_penalty,
            rep_pen_range: self.sampling.repetition_penalty_range,
            rep_pen_slope: self.sampling.repetition_penalty_slope,
            context: self.context.clone(),
            memory: self.memory.clone(),
            actions: self.actions.clone(),
            results: self.results.clone(),
            character_sheet: self.sheet.clone(),
            model_name: Some(self.generator.model_name().to_string()),
            ollama_host: Some(self.generator.host().to_string()),
        }
    }

    /// Rebuild a story from a saved record, played through `generator`.
    ///
    /// The record's model and host are informational; they never select a
    /// backend.
    pub fn from_saved(saved: SavedStory, generator: Arc<Generator>) -> Result<Self, StoryError> {
        if saved.actions.len() != saved.results.len() {
            return Err(PersistError::InvalidFormat(format!(
                "{} actions but {} results",
                saved.actions.len(),
                saved.results.len()
            ))
            .into());
        }
        if let Some(model) = saved.model_name.as_deref() {
            if model != generator.model_name() {
                info!(saved = model, current = generator.model_name(), "Story was played with another model");
            }
        }

        Ok(Self {
            generator,
            context: saved.context,
            memory: saved.memory,
            actions: saved.actions,
            results: saved.results,
            sheet: saved.character_sheet,
            sampling: SamplingParams {
                temperature: saved.temp,
                top_p: saved.top_p,
                top_k: saved.top_k,
                repetition_penalty: saved.rep_pen,
                repetition_penalty_range: saved.rep_pen_range,
                repetition_penalty_slope: saved.rep_pen_slope,
            },
            config: StoryConfig::default(),
            savefile: None,
        })
    }

    /// Save into `dir` under `name`, or under the current save name.
    ///
    /// The save name is only updated once the file is written.
    pub async fn save(&mut self, dir: impl AsRef<Path>, name: Option<&str>) -> Result<PathBuf, StoryError> {
        let name = match name {
            Some(name) => sanitize_save_name(name)?,
            None => self
                .savefile
                .clone()
                .ok_or_else(|| PersistError::InvalidName(String::new()))?,
        };
        let path = save_path(dir, &name)?;
        self.to_saved().save_json(&path).await?;

        info!(path = %path.display(), "Story saved");
        self.savefile = Some(name);
        Ok(path)
    }

    /// Load a saved story from `path`.
    pub async fn load(path: impl AsRef<Path>, generator: Arc<Generator>) -> Result<Self, StoryError> {
        let path = path.as_ref();
        let saved = SavedStory::load_json(path).await?;
        let mut story = Self::from_saved(saved, generator)?;
        story.savefile = path.file_stem().map(|s| s.to_string_lossy().to_string());
        info!(path = %path.display(), turns = story.turns(), "Story loaded");
        Ok(story)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;

    fn story_with(scripted: &Arc<ScriptedCompletion>, context: &str) -> Story {
        let generator = Generator::new(scripted.clone(), "test-model", "http://test", 60, 4096);
        Story::new(Arc::new(generator), context, SamplingParams::default())
    }

    #[tokio::test]
    async fn test_start_records_opening() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("The castle gates creak open.");
        let mut story = story_with(&scripted, "You are a knight.");

        let turn = story.start("You ride to the castle").await;
        assert_eq!(turn.text, "The castle gates creak open.");
        assert!(!turn.degenerate);
        assert_eq!(story.actions(), ["You ride to the castle"]);
        assert_eq!(story.results(), ["The castle gates creak open."]);
    }

    #[tokio::test]
    async fn test_act_prompt_contains_history() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("A guard stops you.");
        scripted.push("He lets you pass.");
        let mut story = story_with(&scripted, "You are a knight.").with_memory(vec!["The king is dead.".into()]);

        story.act("", true).await;
        story.act("You show your badge.", true).await;

        let prompts = scripted.prompts();
        assert_eq!(prompts[0], "You are a knight. The king is dead.\n");
        assert_eq!(
            prompts[1],
            "You are a knight. The king is dead.\n\nA guard stops you.\n> You show your badge."
        );
    }

    #[tokio::test]
    async fn test_act_without_record() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("Nothing happens.");
        let mut story = story_with(&scripted, "You are a knight.");

        let turn = story.act("You wait.", false).await;
        assert_eq!(turn.text, "Nothing happens.");
        assert_eq!(story.turns(), 0);
    }

    #[tokio::test]
    async fn test_degenerate_turn_is_recorded() {
        let scripted = Arc::new(ScriptedCompletion::new().with_fallback(""));
        let mut story = story_with(&scripted, "You are a knight.");

        let turn = story.act("You wait.", true).await;
        assert!(turn.degenerate);
        assert_eq!(turn.text, "");
        assert_eq!(story.results(), [""]);
    }

    #[tokio::test]
    #[should_panic(expected = "a turn needs a context or an action")]
    async fn test_act_needs_context_or_action() {
        let scripted = Arc::new(ScriptedCompletion::new());
        let mut story = story_with(&scripted, "   ");
        story.act("  ", true).await;
    }

    #[tokio::test]
    async fn test_insertion_is_scanned_for_items() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("It flickers in your hand.");
        let mut story = story_with(&scripted, "You are in a cave.");

        let turn = story.act("!You pick up the lantern.", true).await;
        assert_eq!(turn.acquired, vec!["lantern".to_string()]);
        assert!(story.sheet().has_item("lantern"));
        assert_eq!(story.actions(), ["You pick up the lantern."]);
    }

    #[tokio::test]
    async fn test_revert_and_retry() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("You enter the cave.");
        scripted.push("A bat flies past.");
        scripted.push("Water drips from the ceiling.");
        let mut story = story_with(&scripted, "You are an explorer.");

        story.act("", true).await;
        story.act("You listen.", true).await;

        let turn = story.retry().await.unwrap();
        assert_eq!(turn.text, "Water drips from the ceiling.");
        assert_eq!(story.turns(), 2);
        assert_eq!(story.actions()[1], "You listen.");

        assert_eq!(
            story.revert(),
            Some(("You listen.".to_string(), "Water drips from the ceiling.".to_string()))
        );
        assert_eq!(story.turns(), 1);
    }

    #[tokio::test]
    async fn test_retry_on_empty_story() {
        let scripted = Arc::new(ScriptedCompletion::new());
        let mut story = story_with(&scripted, "You are an explorer.");
        assert!(matches!(story.retry().await, Err(StoryError::NothingToRevert)));
    }

    #[tokio::test]
    async fn test_play_reverts_looping_turn() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("The door is locked.");
        scripted.push("The door is locked.");
        let mut story = story_with(&scripted, "You are a thief.");

        story.act("", true).await;
        let result = story.play("You try the door.").await;
        assert!(matches!(result, Err(StoryError::Looping)));
        assert_eq!(story.turns(), 1);
    }

    #[tokio::test]
    async fn test_is_looping() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("You enter the cave.");
        scripted.push("The dragon roars overhead.");
        let mut story = story_with(&scripted, "You are an explorer.");

        story.act("", true).await;
        assert!(!story.is_looping(0.9));
        story.act("You look up.", true).await;
        assert!(!story.is_looping(0.9));
    }

    #[tokio::test]
    async fn test_degenerate_turns_are_not_looping() {
        let scripted = Arc::new(ScriptedCompletion::new().with_fallback(""));
        scripted.push("You enter the cave.");
        let mut story = story_with(&scripted, "You are an explorer.");
        story.act("", true).await;

        let first = story.play("You wait.").await.unwrap();
        let second = story.play("You wait some more.").await.unwrap();

        assert!(first.degenerate);
        assert!(second.degenerate);
        assert_eq!(story.turns(), 3);
        assert!(!story.is_looping(0.0));
    }

    #[test]
    fn test_with_opening_skips_generation() {
        let scripted = Arc::new(ScriptedCompletion::new());
        let story = story_with(&scripted, "You are a knight.")
            .with_opening("  You ride to the castle ", "You find a rusty sword by the gate.");

        assert_eq!(story.actions(), ["You ride to the castle"]);
        assert_eq!(story.results(), ["You find a rusty sword by the gate."]);
        assert!(story.sheet().has_item("rusty sword"));
        assert!(scripted.requests().is_empty());
    }

    #[tokio::test]
    async fn test_set_sampling_applies_to_next_turn() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("The wind howls.");
        let mut story = story_with(&scripted, "You are a sailor.");

        let mut sampling = *story.sampling();
        sampling.set("temp", "1.5").unwrap();
        story.set_sampling(sampling).unwrap();
        story.act("", true).await;

        assert_eq!(story.sampling().temperature, 1.5);
        assert_eq!(scripted.requests()[0].options.temperature, 1.5);

        let bad = SamplingParams {
            top_p: 0.0,
            ..sampling
        };
        assert!(matches!(
            story.set_sampling(bad),
            Err(StoryError::Config(ConfigError::Invalid { key: "top-p", .. }))
        ));
        assert_eq!(story.sampling().top_p, sampling.top_p);
    }

    #[test]
    fn test_memory_commands() {
        let scripted = Arc::new(ScriptedCompletion::new());
        let mut story = story_with(&scripted, "You are a knight.");

        assert_eq!(story.remember("that the king is dead!").unwrap(), "The king is dead.");
        story.remember("you owe the smith").unwrap();
        assert!(matches!(story.remember(" ... "), Err(StoryError::EmptyMemory)));

        story.swap_memories(0, 1).unwrap();
        assert_eq!(story.memory(), ["You owe the smith.", "The king is dead."]);

        story.alter_memory(0, "You owe the smith 5 gold.").unwrap();
        assert_eq!(story.memory()[0], "You owe the smith 5 gold.");

        assert!(matches!(story.forget(5), Err(StoryError::NoSuchMemory(5))));
        assert!(matches!(story.swap_memories(0, 2), Err(StoryError::NoSuchMemory(2))));
        assert_eq!(story.forget(1).unwrap(), "The king is dead.");

        story.alter_memory(0, "  ").unwrap();
        assert!(story.memory().is_empty());
    }

    #[tokio::test]
    async fn test_alter_and_regenerate() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("You find a door.");
        scripted.push("and it swings open.");
        let mut story = story_with(&scripted, "You are in a hall.");

        assert!(matches!(story.alter_last_result("x"), Err(StoryError::EmptyTranscript)));
        story.act("", true).await;
        story.alter_last_result("You find a  red door.").unwrap();
        assert_eq!(story.last_result(), Some("You find a red door."));

        let text = story.regenerate_from("The red door creaks").await.unwrap();
        assert_eq!(text, "The red door creaks and it swings open.");
        assert_eq!(story.results(), ["The red door creaks and it swings open."]);
        assert_eq!(story.turns(), 1);
    }

    #[tokio::test]
    async fn test_summarize_with() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("You reach the gate.");
        scripted.push("The gate opens.");
        let mut story = story_with(&scripted, "You are a knight.");
        story.act("", true).await;
        story.act("You knock.", true).await;
        story.remember("The king is dead").unwrap();

        assert!(matches!(story.summarize_with("  "), Err(StoryError::EmptySummary)));
        story.summarize_with("You travelled to the castle.").unwrap();

        assert_eq!(story.context(), "You travelled to the castle.");
        assert_eq!(story.actions(), [""]);
        assert_eq!(story.results(), ["The gate opens."]);
        assert_eq!(story.memory().len(), 1);
        assert!(story.savefile().is_none());
    }

    #[tokio::test]
    async fn test_summarize_chunk() {
        let scripted = Arc::new(ScriptedCompletion::new());
        for i in 0..3 {
            scripted.push(format!("Event {i} happens."));
        }
        scripted.push("The knight fought two battles.");
        let config = StoryConfig {
            summarize_threshold: 10,
            summarize_chunk: 2,
            ..StoryConfig::default()
        };
        let mut story = story_with(&scripted, "You are a knight.").with_config(config);
        for _ in 0..3 {
            story.act("You fight.", true).await;
        }

        let compaction = story.summarize_chunk().await;
        assert_eq!(compaction, Compaction::Compacted { turns: 2 });
        assert_eq!(story.turns(), 1);
        assert_eq!(
            story.context(),
            "[Previously: The knight fought two battles.]\nYou are a knight."
        );
        assert_eq!(story.results(), ["Event 2 happens."]);

        let request = scripted.requests().pop().unwrap();
        assert!(request.prompt.contains("> You fight.\nEvent 0 happens."));
        assert_eq!(request.options.temperature, 0.2);
        assert_eq!(request.options.num_predict, 100);
    }

    #[tokio::test]
    async fn test_empty_summary_changes_nothing() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("Event happens.");
        scripted.push("");
        let mut story = story_with(&scripted, "You are a knight.");
        story.act("", true).await;

        assert_eq!(story.summarize_chunk().await, Compaction::Skipped);
        assert_eq!(story.turns(), 1);
        assert_eq!(story.context(), "You are a knight.");

        let mut empty = story_with(&scripted, "You are a knight.");
        assert_eq!(empty.summarize_chunk().await, Compaction::NotNeeded);
    }

    #[tokio::test]
    async fn test_suggestion_prompt_and_cleanup() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("You stand in a tavern.");
        scripted.push(" You talk to the bartender\nand more");
        let mut story = story_with(&scripted, "You are a bard.");
        story.act("", true).await;

        let exclude = vec!["Sing a song".to_string()];
        let suggestion = story.suggestion(&exclude).await;
        assert_eq!(suggestion, "talk to the bartender");

        let request = scripted.requests().pop().unwrap();
        assert!(request.prompt.contains("Do not suggest any of the following: Sing a song."));
        assert!(request.prompt.ends_with("\n\n> You"));
        assert_eq!(request.options.repeat_penalty, 1.0);
        assert_eq!(request.options.stop, vec!["\n"]);
    }

    #[test]
    fn test_clean_suggestion() {
        assert_eq!(clean_suggestion("> You open the chest"), "open the chest");
        assert_eq!(clean_suggestion("\"Run away\""), "Run away");
        assert_eq!(clean_suggestion("   \n"), "");
    }

    #[tokio::test]
    async fn test_render() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("and the sun rises.");
        scripted.push("A bird sings.");
        let mut story = story_with(&scripted, "You wake up in a field");
        story.act("", true).await;
        story.act("You listen.", true).await;

        assert_eq!(
            story.render_turn(0).unwrap(),
            "You wake up in a field and the sun rises."
        );
        assert_eq!(story.render_last().unwrap(), "> You listen.\nA bird sings.");
        assert_eq!(
            story.render(),
            "You wake up in a field and the sun rises.\n> You listen.\nA bird sings."
        );
        assert!(story.render_turn(2).is_none());
    }

    #[tokio::test]
    async fn test_saved_round_trip() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("You find a key.");
        let mut story = story_with(&scripted, "You are a thief.");
        story.act("", true).await;
        story.remember("The guard sleeps").unwrap();

        let saved = story.to_saved();
        assert_eq!(saved.model_name.as_deref(), Some("test-model"));
        let restored = Story::from_saved(saved, story.generator().clone()).unwrap();

        assert_eq!(restored.context(), story.context());
        assert_eq!(restored.memory(), story.memory());
        assert_eq!(restored.actions(), story.actions());
        assert_eq!(restored.results(), story.results());
        assert_eq!(restored.sampling(), story.sampling());
        assert!(restored.sheet().has_item("key"));
    }

    #[test]
    fn test_from_saved_rejects_mismatched_transcript() {
        let scripted = Arc::new(ScriptedCompletion::new());
        let story = story_with(&scripted, "You are a thief.");
        let mut saved = story.to_saved();
        saved.actions.push("You run.".into());

        assert!(matches!(
            Story::from_saved(saved, story.generator().clone()),
            Err(StoryError::Persist(PersistError::InvalidFormat(_)))
        ));
    }
}
