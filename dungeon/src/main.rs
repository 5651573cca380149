//! Text adventure driven by a local LLM.
//!
//! A line-oriented interface: the story is printed to stdout, actions and
//! `/commands` are read from stdin, logs go to stderr.
//!
//! ```bash
//! cargo run -p dungeon -- --random
//! cargo run -p dungeon -- --load knight
//! cargo run -p dungeon -- --context "You are a knight." --prompt "You ride to the castle"
//! ```

mod console;
mod game;

use anyhow::{Context, Result};
use clap::Parser;
use dungeon_core::{Generator, Settings};
use ollama::Ollama;
use std::path::PathBuf;
use std::sync::Arc;

use game::{Game, Opening};

/// Text adventure driven by a local LLM
#[derive(Parser)]
#[command(name = "dungeon", version, about, long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Continue a saved story from the saves directory
    #[arg(long, conflicts_with_all = ["random", "prompt_file", "context"])]
    load: Option<String>,

    /// Let the model invent a premise
    #[arg(long, conflicts_with_all = ["prompt_file", "context"])]
    random: bool,

    /// Theme for --random (a random one if omitted)
    #[arg(long, requires = "random")]
    theme: Option<String>,

    /// Prompt file: the first line is the context, the rest the first action
    #[arg(long, conflicts_with = "context")]
    prompt_file: Option<PathBuf>,

    /// Context for a custom story
    #[arg(long)]
    context: Option<String>,

    /// First action for a custom story
    #[arg(long, requires = "context")]
    prompt: Option<String>,

    /// Save name for a new story (asked for when autosave is on)
    #[arg(long)]
    save_as: Option<String>,
}

impl Cli {
    fn opening(&self) -> Option<Opening> {
        if let Some(name) = &self.load {
            return Some(Opening::Load(name.clone()));
        }
        if self.random {
            return Some(Opening::Random(self.theme.clone()));
        }
        if let Some(path) = &self.prompt_file {
            return Some(Opening::PromptFile(path.clone()));
        }
        self.context.as_ref().map(|context| Opening::Custom {
            context: context.clone(),
            prompt: self.prompt.clone().unwrap_or_default(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = Settings::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load settings from {}", cli.config.display()))?;

    // Logs to stderr, the story owns stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("dungeon={}", settings.log_directive()).parse()?)
                .add_directive(format!("ollama={}", settings.log_directive()).parse()?),
        )
        .init();

    let client = Ollama::new(settings.ollama_host.clone(), settings.timeout())?
        .with_model(settings.ollama_model.clone());
    let generator = Generator::connect(Arc::new(client), &settings).await?;

    let mut game = Game::new(Arc::new(generator), settings, cli.save_as.clone());
    game.run(cli.opening()).await
}
