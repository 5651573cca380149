//! Generation adapter.
//!
//! Sits between a story and its completion backend. Assembles prompts within
//! the model's context window, cleans up generated prose and retries empty
//! generations. Backend failures never surface here as errors: a failed
//! completion is an empty string, and an empty string after every retry is
//! reported as degenerate output by the caller.

use crate::config::{SamplingParams, Settings};
use crate::text::cut_trailing_sentence;
use async_trait::async_trait;
use ollama::{GenerateRequest, GenerateResponse, Ollama, Options};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Full generation attempts before giving up on an empty result.
pub const MAX_GENERATION_ATTEMPTS: usize = 20;

/// Context window assumed when the backend cannot tell us.
pub const FALLBACK_CONTEXT_WINDOW: usize = 2048;

/// Rough prompt budget conversion.
const CHARS_PER_TOKEN: usize = 4;

/// Room for the separators between prompt blocks.
const SEPARATOR_SLACK: usize = 10;

/// Floor for the history budget on tiny context windows.
const MIN_HISTORY_TOKENS: usize = 256;

/// Stop at end-of-text tokens and at the model starting the next action.
const STOP_SEQUENCES: [&str; 2] = ["<|endoftext|>", ">"];

const PASSAGE_PROMPT: &str = include_str!("prompts/passage.txt");
const PREMISE_PROMPT: &str = include_str!("prompts/premise.txt");

/// Errors from setting up generation.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Cannot reach the completion backend at {host}. Is Ollama running?")]
    ConnectionUnavailable { host: String },
}

/// Errors from random premise generation.
#[derive(Debug, Error)]
pub enum PremiseError {
    #[error("The model did not produce a two-part premise: {0:?}")]
    Unparseable(String),
}

/// Sampling options for a single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub repeat_last_n: u32,
    pub num_predict: u32,
    pub stop: Vec<String>,
}

impl From<&CompletionOptions> for Options {
    fn from(options: &CompletionOptions) -> Self {
        Options {
            temperature: Some(options.temperature),
            top_k: Some(options.top_k),
            top_p: Some(options.top_p),
            repeat_penalty: Some(options.repeat_penalty),
            repeat_last_n: i32::try_from(options.repeat_last_n).ok(),
            num_predict: Some(options.num_predict),
            stop: options.stop.clone(),
        }
    }
}

/// Per-call adjustments on top of a story's sampling parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub repetition_penalty: Option<f32>,
    pub stop: Vec<String>,
}

impl Overrides {
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn repetition_penalty(mut self, penalty: f32) -> Self {
        self.repetition_penalty = Some(penalty);
        self
    }

    pub fn stop(mut self, sequence: impl Into<String>) -> Self {
        self.stop.push(sequence.into());
        self
    }
}

/// A text completion backend.
///
/// Only `list_models` may fail; generation and model inspection degrade to
/// an empty string and a default context window.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Names of installed models. Fails when the backend is unreachable.
    async fn list_models(&self) -> Result<Vec<String>, GeneratorError>;

    /// Complete `prompt`. Returns an empty string on any failure.
    async fn complete(&self, model: &str, prompt: &str, options: &CompletionOptions) -> String;

    /// Context window of `model` in tokens, best effort.
    async fn describe_model(&self, model: &str) -> usize;
}

#[async_trait]
impl TextCompletion for Ollama {
    async fn list_models(&self) -> Result<Vec<String>, GeneratorError> {
        match Ollama::list_models(self).await {
            Ok(models) => Ok(models.into_iter().map(|m| m.name).collect()),
            Err(e) => {
                error!(host = %self.host(), error = %e, "Failed to list Ollama models");
                Err(GeneratorError::ConnectionUnavailable {
                    host: self.host().to_string(),
                })
            }
        }
    }

    async fn complete(&self, model: &str, prompt: &str, options: &CompletionOptions) -> String {
        let request = GenerateRequest::new(prompt)
            .with_model(model)
            .with_options(options.into());

        match self.generate(request).await {
            Ok(response) => response_text(model, response),
            Err(e) => {
                error!(model, error = %e, "Ollama generation failed");
                String::new()
            }
        }
    }

    async fn describe_model(&self, model: &str) -> usize {
        match self.show(model).await {
            Ok(details) => details
                .num_ctx()
                .unwrap_or_else(|| context_window_for(model)),
            Err(e) => {
                warn!(model, error = %e, "Could not inspect model, assuming a small context window");
                FALLBACK_CONTEXT_WINDOW
            }
        }
    }
}

/// Text of a generation. Responses not marked done are logged and kept.
fn response_text(requested: &str, response: GenerateResponse) -> String {
    debug!(
        model = %response.model,
        prompt_tokens = ?response.prompt_tokens,
        completion_tokens = ?response.completion_tokens,
        "Ollama generation finished"
    );
    if !response.done {
        warn!(model = %response.model, "Ollama returned an unfinished generation");
    }
    if !response.model.is_empty() && response.model != requested {
        warn!(requested, served = %response.model, "Ollama answered with a different model");
    }
    response.text
}

/// Guess a context window from the model's family name.
pub fn context_window_for(model: &str) -> usize {
    let model = model.to_lowercase();
    if model.contains("codellama") {
        16384
    } else if model.contains("mistral") {
        8192
    } else if model.contains("llama2") {
        4096
    } else {
        FALLBACK_CONTEXT_WINDOW
    }
}

/// Clean up a raw generation.
///
/// Trailing incomplete sentences are cut (see [`cut_trailing_sentence`]),
/// a period inside a closing quote is moved outside, markdown `#` and `*`
/// are stripped and blank lines collapsed. Whether the first letter is
/// capitalized is kept as the model produced it. Returns an empty string
/// when nothing usable remains.
pub fn normalize_result(text: &str, allow_action: bool) -> String {
    let cut = cut_trailing_sentence(text, allow_action);
    let capitalized = cut
        .chars()
        .find(|c| c.is_alphabetic())
        .is_some_and(char::is_uppercase);

    let mut result = cut.replace(".\"", "\".").replace(['#', '*'], "");
    while result.contains("\n\n") {
        result = result.replace("\n\n", "\n");
    }
    let result = result.trim();

    if capitalized {
        result.to_string()
    } else {
        crate::text::decapitalize(result)
    }
}

/// Split a generated premise into `(context, first_action)`.
pub fn parse_premise(raw: &str) -> Result<(String, String), PremiseError> {
    let parts = raw.split_once("|||").or_else(|| raw.split_once("\n\n"));
    match parts {
        Some((context, action)) if !context.trim().is_empty() && !action.trim().is_empty() => {
            Ok((context.trim().to_string(), action.trim().to_string()))
        }
        _ => Err(PremiseError::Unparseable(raw.to_string())),
    }
}

/// Last `max_chars` characters of `text`.
fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    match text.char_indices().nth(count - max_chars) {
        Some((i, _)) => &text[i..],
        None => "",
    }
}

/// Byte offset of the start of the second sentence, if any.
fn second_sentence_start(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\n' {
            return Some(i + 1);
        }
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(j, next)) = chars.peek() {
                if next.is_whitespace() {
                    return Some(j);
                }
            }
        }
    }
    None
}

/// The end of `story` that fits in `max_chars`, without a leading partial
/// sentence.
fn story_tail(story: &str, max_chars: usize) -> String {
    let cut = tail(story, max_chars);
    let truncated = cut.len() < story.len();
    let cut = cut.trim();
    if truncated {
        if let Some(start) = second_sentence_start(cut) {
            let rest = cut[start..].trim();
            if !rest.is_empty() {
                return rest.to_string();
            }
        }
    }
    cut.to_string()
}

fn layout(steering: &str, story: &str, action: &str) -> String {
    if story.is_empty() {
        format!("{steering}\n{action}")
    } else {
        format!("{steering}\n\n{story}\n{action}")
    }
}

/// Prompt assembly and generation against one model.
pub struct Generator {
    client: Arc<dyn TextCompletion>,
    model_name: String,
    host: String,
    generate_num: u32,
    max_history_tokens: usize,
    in_character: bool,
}

impl Generator {
    /// Probe the backend and size the history budget for the configured
    /// model. An unreachable backend is the only error; a model that is not
    /// installed is logged and tolerated.
    pub async fn connect(
        client: Arc<dyn TextCompletion>,
        settings: &Settings,
    ) -> Result<Self, GeneratorError> {
        let model = settings.ollama_model.as_str();
        let models = client.list_models().await?;

        let installed = models
            .iter()
            .any(|m| m == model || m.strip_suffix(":latest") == Some(model));
        if installed {
            info!(host = %settings.ollama_host, model, "Connected to Ollama");
        } else {
            warn!(
                model,
                available = ?models,
                "Model is not installed, pull it with `ollama pull {model}`"
            );
        }

        let context_window = client.describe_model(model).await;
        info!(model, context_window, "Model context window");

        Ok(Self::new(
            client,
            model,
            settings.ollama_host.clone(),
            settings.generate_num,
            context_window,
        )
        .with_in_character(settings.in_character))
    }

    /// Build a generator without probing the backend.
    pub fn new(
        client: Arc<dyn TextCompletion>,
        model_name: impl Into<String>,
        host: impl Into<String>,
        generate_num: u32,
        context_window: usize,
    ) -> Self {
        let max_history_tokens = context_window
            .saturating_sub(generate_num as usize)
            .max(MIN_HISTORY_TOKENS);
        Self {
            client,
            model_name: model_name.into(),
            host: host.into(),
            generate_num,
            max_history_tokens,
            in_character: false,
        }
    }

    /// Prefix every steering block with the stay-in-character instruction.
    pub fn with_in_character(mut self, in_character: bool) -> Self {
        self.in_character = in_character;
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn generate_num(&self) -> u32 {
        self.generate_num
    }

    pub fn max_history_tokens(&self) -> usize {
        self.max_history_tokens
    }

    fn steering(&self, context: &str, memory: &[String]) -> String {
        let block = std::iter::once(context)
            .chain(memory.iter().map(String::as_str))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if self.in_character {
            format!("{}\n\n{block}", PASSAGE_PROMPT.trim())
        } else {
            block
        }
    }

    /// Assemble the prompt for one generation.
    ///
    /// Layout is `steering \n\n story \n action`, where steering is the
    /// context followed by the memory entries. When the prompt exceeds the
    /// history budget the oldest story text goes first. The steering block
    /// is only cut when it does not fit next to the action on its own, and
    /// then its tail is kept. The action is never cut.
    pub fn build_prompt(&self, context: &str, memory: &[String], story: &str, action: &str) -> String {
        let steering = self.steering(context, memory);
        let story = story.trim();
        let prompt = layout(&steering, story, action);

        let budget = self.max_history_tokens * CHARS_PER_TOKEN;
        let length = prompt.chars().count();
        if length <= budget {
            return prompt;
        }

        let fixed = steering.chars().count() + action.chars().count() + SEPARATOR_SLACK;
        let truncated = if fixed <= budget {
            let story = story_tail(story, budget - fixed);
            layout(&steering, &story, action)
        } else {
            let room = budget.saturating_sub(action.chars().count() + SEPARATOR_SLACK);
            let steering = tail(&steering, room).trim();
            if steering.is_empty() {
                action.to_string()
            } else {
                layout(steering, "", action)
            }
        };

        debug!(
            budget,
            original = length,
            truncated = truncated.chars().count(),
            "Prompt truncated to fit the context window"
        );
        truncated
    }

    fn options(&self, sampling: &SamplingParams, overrides: &Overrides) -> CompletionOptions {
        CompletionOptions {
            temperature: overrides.temperature.unwrap_or(sampling.temperature),
            top_k: sampling.top_k,
            top_p: sampling.top_p,
            repeat_penalty: overrides
                .repetition_penalty
                .unwrap_or(sampling.repetition_penalty),
            repeat_last_n: sampling.repetition_penalty_range,
            num_predict: overrides.max_tokens.unwrap_or(self.generate_num),
            stop: overrides.stop.clone(),
        }
    }

    /// Generate the next story passage.
    ///
    /// Empty results are retried, first by accepting text up to an action
    /// marker and then with a fresh request, up to
    /// [`MAX_GENERATION_ATTEMPTS`] requests. Returns an empty string if
    /// every attempt came back empty.
    pub async fn generate(&self, prompt: &str, sampling: &SamplingParams) -> String {
        let overrides = STOP_SEQUENCES
            .iter()
            .fold(Overrides::default(), |o, s| o.stop(*s));
        let options = self.options(sampling, &overrides);
        debug!(prompt, ?options, "Generating passage");

        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let raw = self.client.complete(&self.model_name, prompt, &options).await;
            debug!(attempt, raw = %raw, "Raw generated result");

            let result = normalize_result(&raw, false);
            if !result.is_empty() {
                return result;
            }

            let result = normalize_result(&raw, true);
            if !result.is_empty() {
                info!(attempt, "Empty generation, kept text up to the action marker");
                return result;
            }
            info!(attempt, "Empty generation, retrying");
        }

        warn!(
            attempts = MAX_GENERATION_ATTEMPTS,
            "Model generated empty text, consider different sampling parameters"
        );
        String::new()
    }

    /// A single request with no post-processing.
    pub async fn generate_raw(
        &self,
        prompt: &str,
        sampling: &SamplingParams,
        overrides: &Overrides,
    ) -> String {
        let options = self.options(sampling, overrides);
        debug!(prompt, ?options, "Generating raw text");
        self.client.complete(&self.model_name, prompt, &options).await
    }

    /// Ask the model for a story opening in the given theme.
    pub async fn random_premise(
        &self,
        theme: &str,
        sampling: &SamplingParams,
    ) -> Result<(String, String), PremiseError> {
        let prompt = PREMISE_PROMPT.replace("{theme}", theme);
        let overrides = Overrides::default().temperature(1.0).max_tokens(500);
        let raw = self.generate_raw(&prompt, sampling, &overrides).await;
        let premise = parse_premise(&raw)?;
        info!(theme, "Generated random premise");
        Ok(premise)
    }
}
