//! Text adventure story engine driven by a local LLM.
//!
//! This crate provides:
//! - A story session: turns, revert and retry, loop detection and history
//!   compaction
//! - A generation adapter that fits prompts into the model's context window
//! - An inventory ledger fed by heuristics over the generated prose
//! - Action suggestions from item and keyword tables plus the model
//! - Story persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use dungeon_core::{Generator, Settings, Story};
//! use ollama::Ollama;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load_or_default("config.toml")?;
//!     let client = Ollama::new(&settings.ollama_host, settings.timeout())?
//!         .with_model(&settings.ollama_model);
//!     let generator = Arc::new(Generator::connect(Arc::new(client), &settings).await?);
//!
//!     let mut story = Story::new(generator, "You are a knight.", settings.sampling());
//!     let turn = story.start("You ride toward the castle.").await;
//!     println!("{}", turn.text);
//!
//!     story.save(&settings.saves_dir, Some("knight")).await?;
//!     Ok(())
//! }
//! ```

pub mod character;
pub mod config;
pub mod dictionary;
pub mod generator;
pub mod input;
pub mod persist;
pub mod story;
pub mod suggest;
pub mod testing;
pub mod text;

// Primary public API
pub use character::{CharacterSheet, InventoryError};
pub use config::{ConfigError, SamplingParams, Settings};
pub use generator::{Generator, GeneratorError, TextCompletion};
pub use input::{ActionInput, Command, InputError};
pub use persist::{PersistError, SaveInfo, SavedStory};
pub use story::{Compaction, Story, StoryConfig, StoryError, TurnResult};
pub use suggest::SuggestionComposer;
pub use testing::{ScriptedCompletion, TestHarness};
