//! Testing utilities for the story engine.
//!
//! This module provides tools for testing without a running model:
//! - `ScriptedCompletion`, a completion backend that replays queued text
//! - `TestHarness` for scripted story scenarios
//! - Assertion helpers for verifying story state

use crate::config::SamplingParams;
use crate::generator::{CompletionOptions, Generator, GeneratorError, TextCompletion};
use crate::story::{Story, StoryConfig, StoryError, TurnResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// A completion request seen by [`ScriptedCompletion`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedRequest {
    pub model: String,
    pub prompt: String,
    pub options: CompletionOptions,
}

/// A completion backend that returns scripted responses in order.
///
/// Every request is recorded so tests can inspect the prompts and sampling
/// options that reached the backend.
pub struct ScriptedCompletion {
    /// Responses to return in order.
    responses: Mutex<VecDeque<String>>,
    /// Requests received so far.
    requests: Mutex<Vec<ScriptedRequest>>,
    /// Installed models. `None` means the backend is unreachable.
    models: Option<Vec<String>>,
    context_window: usize,
    /// Returned once the script runs out.
    fallback: String,
}

impl ScriptedCompletion {
    /// A reachable backend with `llama2:7b` installed and a 4096 token window.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            models: Some(vec!["llama2:7b".to_string()]),
            context_window: 4096,
            fallback: "The story has no more scripted responses.".to_string(),
        }
    }

    /// A backend whose model listing fails.
    pub fn unreachable() -> Self {
        Self {
            models: None,
            ..Self::new()
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = Some(models);
        self
    }

    pub fn with_context_window(mut self, tokens: usize) -> Self {
        self.context_window = tokens;
        self
    }

    /// Text returned once the queued responses are used up.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    /// Queue a response.
    pub fn push(&self, text: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(text.into());
    }

    /// Number of queued responses not yet returned.
    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn requests(&self) -> Vec<ScriptedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.prompt).collect()
    }
}

impl Default for ScriptedCompletion {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextCompletion for ScriptedCompletion {
    async fn list_models(&self) -> Result<Vec<String>, GeneratorError> {
        self.models
            .clone()
            .ok_or_else(|| GeneratorError::ConnectionUnavailable {
                host: "scripted".to_string(),
            })
    }

    async fn complete(&self, model: &str, prompt: &str, options: &CompletionOptions) -> String {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ScriptedRequest {
                model: model.to_string(),
                prompt: prompt.to_string(),
                options: options.clone(),
            });

        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }

    async fn describe_model(&self, _model: &str) -> usize {
        self.context_window
    }
}

/// Test harness for running story scenarios.
pub struct TestHarness {
    /// The scripted backend.
    pub backend: Arc<ScriptedCompletion>,
    /// The story under test.
    pub story: Story,
}

impl TestHarness {
    /// Create a harness around a fresh story with the given context.
    pub fn new(context: &str) -> Self {
        let backend = Arc::new(ScriptedCompletion::new());
        let generator = Generator::new(backend.clone(), "test-model", "http://test", 60, 4096);
        let story = Story::new(Arc::new(generator), context, SamplingParams::default());

        Self { backend, story }
    }

    pub fn with_config(mut self, config: StoryConfig) -> Self {
        self.story = self.story.with_config(config);
        self
    }

    /// Queue the next generated result.
    pub fn expect_result(&mut self, text: impl Into<String>) -> &mut Self {
        self.backend.push(text);
        self
    }

    /// Take a recorded turn.
    pub async fn input(&mut self, action: &str) -> TurnResult {
        self.story.act(action, true).await
    }

    /// Take a turn the way the game loop does, with loop detection.
    pub async fn play(&mut self, action: &str) -> Result<TurnResult, StoryError> {
        self.story.play(action).await
    }

    pub fn last_result(&self) -> Option<&str> {
        self.story.last_result()
    }

    /// The prompt of the most recent completion request.
    pub fn last_prompt(&self) -> Option<String> {
        self.backend.prompts().pop()
    }

    pub fn turns(&self) -> usize {
        self.story.turns()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that the character carries an item matching `name`.
#[track_caller]
pub fn assert_has_item(story: &Story, name: &str) {
    assert!(
        story.sheet().has_item(name),
        "Expected an item matching '{name}' in the inventory, found {:?}",
        story.sheet().items().collect::<Vec<_>>()
    );
}

/// Assert that the character does NOT carry an item matching `name`.
#[track_caller]
pub fn assert_no_item(story: &Story, name: &str) {
    assert!(
        !story.sheet().has_item(name),
        "Expected no item matching '{name}' in the inventory"
    );
}

/// Assert the number of recorded turns.
#[track_caller]
pub fn assert_turns(story: &Story, expected: usize) {
    assert_eq!(
        story.turns(),
        expected,
        "Expected {expected} turns, got {}",
        story.turns()
    );
}

/// Assert that actions and results pair up.
#[track_caller]
pub fn assert_transcript_consistent(story: &Story) {
    assert_eq!(
        story.actions().len(),
        story.results().len(),
        "Transcript out of step: {} actions, {} results",
        story.actions().len(),
        story.results().len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let scripted = ScriptedCompletion::new().with_fallback("done");
        scripted.push("first");
        scripted.push("second");
        let options = CompletionOptions {
            temperature: 0.4,
            top_k: 40,
            top_p: 0.9,
            repeat_penalty: 1.2,
            repeat_last_n: 512,
            num_predict: 60,
            stop: Vec::new(),
        };

        assert_eq!(scripted.complete("m", "a", &options).await, "first");
        assert_eq!(scripted.complete("m", "b", &options).await, "second");
        assert_eq!(scripted.complete("m", "c", &options).await, "done");
        assert_eq!(scripted.prompts(), vec!["a", "b", "c"]);
        assert_eq!(scripted.remaining(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let scripted = ScriptedCompletion::unreachable();
        assert!(scripted.list_models().await.is_err());
        assert_eq!(scripted.describe_model("m").await, 4096);
    }

    #[tokio::test]
    async fn test_harness_basic() {
        let mut harness = TestHarness::new("You are a knight.");
        harness.expect_result("You stand in the courtyard.");

        let turn = harness.input("").await;

        assert_eq!(turn.text, "You stand in the courtyard.");
        assert_eq!(harness.last_result(), Some("You stand in the courtyard."));
        assert!(harness.last_prompt().unwrap().contains("You are a knight."));
        assert_turns(&harness.story, 1);
        assert_transcript_consistent(&harness.story);
    }

    #[tokio::test]
    async fn test_harness_inventory() {
        let mut harness = TestHarness::new("You are a knight.");
        harness
            .expect_result("The armory is quiet.")
            .expect_result("You pick up a shield. It is heavy.");

        harness.input("").await;
        assert_no_item(&harness.story, "shield");

        harness.input("You look around.").await;
        assert_has_item(&harness.story, "shield");
        assert_turns(&harness.story, 2);
    }
}
