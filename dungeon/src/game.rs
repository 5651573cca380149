//! The play loop.

use crate::console::{print_list, Console, HELP};
use anyhow::Result;
use dungeon_core::dictionary::RANDOM_THEMES;
use dungeon_core::persist::{list_saves, save_path};
use dungeon_core::text::{format_result, player_died, player_won};
use dungeon_core::{
    ActionInput, Command, Generator, Settings, Story, StoryConfig, StoryError, SuggestionComposer,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// How a story gets started.
#[derive(Debug, Clone)]
pub enum Opening {
    Load(String),
    /// A model-written premise, optionally in the given theme.
    Random(Option<String>),
    PromptFile(PathBuf),
    Custom { context: String, prompt: String },
}

/// What the loop does after handling a line.
enum Flow {
    Continue,
    NewGame,
    Quit,
}

pub struct Game {
    generator: Arc<Generator>,
    settings: Settings,
    composer: SuggestionComposer,
    console: Console,
    rng: StdRng,
    /// Save name for the next new story.
    save_as: Option<String>,
    /// Context and first prompt of the current story, for `/restart`.
    opening: Option<(String, String)>,
}

/// Command text after an optional leading "you", e.g. "You /retry".
fn command_text(line: &str) -> Option<&str> {
    let line = line.trim_start();
    let line = match line.get(..3) {
        Some(you) if you.eq_ignore_ascii_case("you") => line[3..].trim_start(),
        _ => line,
    };
    line.strip_prefix('/')
}

/// First line is the context, the remaining lines the first action.
fn parse_prompt_file(content: &str) -> (String, String) {
    let mut lines = content.trim().lines();
    let context = lines.next().unwrap_or_default();
    let prompt = lines.collect::<Vec<_>>().join(" ");
    (format_result(context), format_result(&prompt))
}

fn print_memory(story: &Story) {
    if story.memory().is_empty() {
        println!("Memory is empty.");
    } else {
        println!("Memory:");
        print_list(story.memory());
    }
}

impl Game {
    pub fn new(generator: Arc<Generator>, settings: Settings, save_as: Option<String>) -> Self {
        Self {
            generator,
            composer: SuggestionComposer::from_settings(&settings),
            settings,
            console: Console,
            rng: StdRng::from_entropy(),
            save_as,
            opening: None,
        }
    }

    /// Play stories until the player quits or input ends.
    pub async fn run(&mut self, opening: Option<Opening>) -> Result<()> {
        let mut next = opening;
        loop {
            let opening = match next.take() {
                Some(opening) => opening,
                None => match self.menu() {
                    Some(opening) => opening,
                    None => return Ok(()),
                },
            };

            let Some(mut story) = self.open(opening).await else {
                continue;
            };
            match self.play(&mut story).await {
                Flow::Quit => {
                    println!("Goodbye!");
                    return Ok(());
                }
                Flow::NewGame | Flow::Continue => continue,
            }
        }
    }

    fn menu(&mut self) -> Option<Opening> {
        println!();
        print_list(&[
            "Write a custom prompt (default)",
            "Load a saved game",
            "Generate a random story",
            "Quit",
        ]);
        match self.console.read_number(3)? {
            0 => {
                let context = self.console.read_line("Context> ")?;
                let prompt = self.console.read_line("Prompt> ")?;
                Some(Opening::Custom { context, prompt })
            }
            1 => Some(Opening::Load(self.console.read_required("Save name: ")?)),
            2 => Some(Opening::Random(None)),
            _ => None,
        }
    }

    async fn open(&mut self, opening: Opening) -> Option<Story> {
        let (context, prompt) = match opening {
            Opening::Load(name) => return self.load(&name).await,
            Opening::Random(theme) => {
                let theme = theme
                    .or_else(|| RANDOM_THEMES.choose(&mut self.rng).map(|t| t.to_string()))
                    .unwrap_or_else(|| "Fantasy".to_string());
                println!("Generating a random {theme} story...");
                match self
                    .generator
                    .random_premise(&theme, &self.settings.sampling())
                    .await
                {
                    Ok(premise) => premise,
                    Err(e) => {
                        println!("[ERROR] {e}");
                        return None;
                    }
                }
            }
            Opening::PromptFile(path) => match tokio::fs::read_to_string(&path).await {
                Ok(content) => parse_prompt_file(&content),
                Err(e) => {
                    println!("[ERROR] Could not read {}: {e}", path.display());
                    return None;
                }
            },
            Opening::Custom { context, prompt } => (context, prompt),
        };

        self.start(context.trim(), prompt.trim()).await
    }

    async fn start(&mut self, context: &str, prompt: &str) -> Option<Story> {
        if context.is_empty() && prompt.is_empty() {
            println!("[ERROR] The story has no context or prompt.");
            return None;
        }

        let save_name = if self.settings.autosave {
            match self.save_as.take() {
                Some(name) => Some(name),
                None => Some(
                    self.console
                        .read_required("Autosaving enabled. Please enter a save name: ")?,
                ),
            }
        } else {
            self.save_as.take()
        };

        println!("{HELP}");
        let mut story = self.begin(context, prompt).await;
        if let Some(name) = save_name {
            self.save(&mut story, Some(&name)).await;
        }
        Some(story)
    }

    /// Generate a fresh story and remember how it opened.
    async fn begin(&mut self, context: &str, prompt: &str) -> Story {
        println!();
        println!("Generating story...");

        let mut story = Story::new(self.generator.clone(), context, self.settings.sampling())
            .with_config(StoryConfig::from(&self.settings));
        let turn = story.start(prompt).await;
        self.opening = Some((context.to_string(), prompt.to_string()));

        println!();
        println!("{}", story.render());
        if turn.degenerate {
            println!("[WARN] The model produced nothing. Try /retry.");
        }
        story
    }

    async fn load(&mut self, name: &str) -> Option<Story> {
        let path = match save_path(&self.settings.saves_dir, name) {
            Ok(path) => path,
            Err(e) => {
                println!("[ERROR] {e}");
                return None;
            }
        };

        match Story::load(&path, self.generator.clone()).await {
            Ok(story) => {
                let story = story.with_config(StoryConfig::from(&self.settings));
                let prompt = story.actions().first().cloned().unwrap_or_default();
                self.opening = Some((story.context().to_string(), prompt));
                println!("[LOADED] {}", path.display());
                println!();
                println!("{}", story.render());
                Some(story)
            }
            Err(e) => {
                println!("[ERROR] Load failed: {e}");
                None
            }
        }
    }

    async fn save(&mut self, story: &mut Story, name: Option<&str>) {
        let name = match (name, story.savefile()) {
            (Some(name), _) => Some(name.to_string()),
            (None, Some(_)) => None,
            (None, None) => match self.console.read_required("Please enter a name for this save: ") {
                Some(name) => Some(name),
                None => return,
            },
        };

        match story.save(&self.settings.saves_dir, name.as_deref()).await {
            Ok(path) => println!("[SAVED] Story saved to {}", path.display()),
            Err(e) => println!("[ERROR] Save failed: {e}"),
        }
    }

    async fn play(&mut self, story: &mut Story) -> Flow {
        loop {
            let suggestions = if self.composer.is_enabled() {
                self.composer.compose(story, &mut self.rng).await
            } else {
                Vec::new()
            };
            if !suggestions.is_empty() {
                println!();
                println!("Suggested actions:");
                print_list(suggestions.as_slice());
            }

            let Some(line) = self.console.read_line("\n> ") else {
                return Flow::Quit;
            };

            let flow = match command_text(&line) {
                Some(command) => match command.parse::<Command>() {
                    Ok(command) => self.command(story, command).await,
                    Err(e) => {
                        println!("[ERROR] {e}");
                        Flow::Continue
                    }
                },
                None => self.action(story, &line, &suggestions).await,
            };
            if !matches!(flow, Flow::Continue) {
                return flow;
            }

            if self.settings.autosave && story.savefile().is_some() {
                if let Err(e) = story.save(&self.settings.saves_dir, None).await {
                    warn!(error = %e, "Autosave failed");
                }
            }
        }
    }

    async fn action(&mut self, story: &mut Story, line: &str, suggestions: &[String]) -> Flow {
        let roll = self.settings.action_d20.then(|| self.rng.gen_range(1..=20u8));
        debug!(?roll, "Rolled d20");

        let input = match ActionInput::parse(line, suggestions, roll, &mut self.rng) {
            Ok(input) => input,
            Err(e) => {
                println!("[ERROR] {e}");
                return Flow::Continue;
            }
        };
        match &input {
            ActionInput::Continue => println!("Continuing..."),
            ActionInput::Insertion(text) => println!("{}", format_result(text)),
            ActionInput::Act(text) => println!("> {}", format_result(text)),
        }

        let turn = match story.play(&input.into_action()).await {
            Ok(turn) => turn,
            Err(StoryError::Looping) => {
                println!("[ERROR] That action caused the model to start looping. Try something else instead.");
                return Flow::Continue;
            }
            Err(e) => {
                println!("[ERROR] {e}");
                return Flow::Continue;
            }
        };

        println!();
        println!("{}", turn.text);
        if turn.degenerate {
            println!("[WARN] The model produced nothing. Try /retry or a different action.");
        }
        for item in &turn.acquired {
            println!("[ITEM] You now have: {item}");
        }

        let (won, died) = (player_won(&turn.text), player_died(&turn.text));
        if won || died {
            return self.ending(won);
        }
        Flow::Continue
    }

    fn ending(&mut self, won: bool) -> Flow {
        println!();
        if won {
            println!("YOU WON. CONGRATULATIONS");
            print_list(&["Start a new game", "\"I'm not done yet!\" (if you still want to play)"]);
        } else {
            println!("YOU DIED. GAME OVER");
            print_list(&["Start a new game", "\"I'm not dead yet!\" (if you didn't actually die)"]);
        }
        match self.console.read_number(1) {
            Some(0) => Flow::NewGame,
            Some(_) => {
                println!("Sorry about that... where were we?");
                Flow::Continue
            }
            None => Flow::Quit,
        }
    }

    async fn command(&mut self, story: &mut Story, command: Command) -> Flow {
        match command {
            Command::Revert => {
                if story.turns() < 2 {
                    println!("[ERROR] You can't go back any farther.");
                } else {
                    story.revert();
                    println!("Last action reverted.");
                    self.print_last(story);
                }
            }
            Command::Retry => {
                println!("Retrying...");
                match story.retry().await {
                    Ok(_) => self.print_last(story),
                    Err(StoryError::Looping) => println!(
                        "[ERROR] That action caused the model to start looping. Try something else instead."
                    ),
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
            Command::Print => println!("{}", story.render()),
            Command::Sheet => println!("{}", story.sheet()),
            Command::Saves => match list_saves(&self.settings.saves_dir).await {
                Ok(saves) if saves.is_empty() => println!("No saved stories."),
                Ok(saves) => {
                    for save in saves {
                        println!("  {} ({} turns)", save.name, save.turns);
                    }
                }
                Err(e) => println!("[ERROR] {e}"),
            },
            Command::Help => println!("{HELP}"),
            Command::Quit => {
                let saved = self.settings.autosave && story.savefile().is_some();
                if !saved && self.console.confirm("Do you want to save? (y/N): ") {
                    self.save(story, None).await;
                }
                return Flow::Quit;
            }
            Command::Restart => match self.opening.clone() {
                Some((context, prompt)) if !(context.is_empty() && prompt.is_empty()) => {
                    println!("Restarting story...");
                    *story = self.begin(&context, &prompt).await;
                }
                _ => println!("[ERROR] Story has no prompt or context to restart from."),
            },
            Command::Set(key, value) => {
                let mut sampling = *story.sampling();
                let changed = match sampling.set(&key, &value) {
                    Ok(()) => story.set_sampling(sampling),
                    Err(e) => Err(e.into()),
                };
                match changed {
                    Ok(()) => println!("Set {key} to {value}."),
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
            Command::Alter(text) => match story.alter_last_result(&text) {
                Ok(()) => self.print_last(story),
                Err(e) => println!("[ERROR] {e}"),
            },
            Command::AlterGen(text) => {
                println!("Regenerating result...");
                match story.regenerate_from(&text).await {
                    Ok(_) => self.print_last(story),
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
            Command::Context(text) => {
                story.set_context(&text);
                println!("Context updated.");
            }
            Command::Remember(text) => match story.remember(&text) {
                Ok(memory) => println!("You remember: {memory}"),
                Err(e) => println!("[ERROR] {e}"),
            },
            Command::Forget(i) => match story.forget(i) {
                Ok(memory) => {
                    println!("Forgot: {memory}");
                    print_memory(story);
                }
                Err(e) => println!("[ERROR] {e}"),
            },
            Command::MemSwap(i, j) => match story.swap_memories(i, j) {
                Ok(()) => print_memory(story),
                Err(e) => println!("[ERROR] {e}"),
            },
            Command::MemAlt(i, text) => match story.alter_memory(i, &text) {
                Ok(()) => print_memory(story),
                Err(e) => println!("[ERROR] {e}"),
            },
            Command::Save(name) => self.save(story, name.as_deref()).await,
            Command::Load(name) => {
                if let Some(loaded) = self.load(&name).await {
                    *story = loaded;
                }
            }
            Command::Summarize(summary) => {
                if self.console.confirm("Do you want to save your previous story? (y/N): ") {
                    self.save(story, None).await;
                }
                match story.summarize_with(&summary) {
                    Ok(()) => {
                        println!("Story restarted from your summary. Use /save to name it.");
                        println!();
                        println!("{}", story.render());
                    }
                    Err(e) => println!("[ERROR] {e}"),
                }
            }
            Command::Drop(item) => match story.sheet_mut().remove_item(&item) {
                Ok(()) => println!("You drop the {}.", item.trim()),
                Err(e) => println!("[ERROR] {e}"),
            },
        }
        Flow::Continue
    }

    fn print_last(&self, story: &Story) {
        if let Some(text) = story.render_last() {
            println!("{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dungeon_core::testing::ScriptedCompletion;

    fn game_with(scripted: &Arc<ScriptedCompletion>) -> Game {
        let generator = Generator::new(scripted.clone(), "test-model", "http://test", 60, 4096);
        let settings = Settings {
            autosave: false,
            ..Settings::default()
        };
        Game::new(Arc::new(generator), settings, None)
    }

    #[tokio::test]
    async fn test_restart_regenerates_from_opening() {
        let scripted = Arc::new(ScriptedCompletion::new());
        scripted.push("The gates creak open.");
        scripted.push("A guard waves.");
        scripted.push("The gates are shut tight.");
        let mut game = game_with(&scripted);

        let mut story = game.begin("You are a knight.", "You ride to the castle").await;
        story.act("You wave back.", true).await;
        assert_eq!(story.turns(), 2);

        let flow = game.command(&mut story, Command::Restart).await;
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(story.turns(), 1);
        assert_eq!(story.context(), "You are a knight.");
        assert_eq!(story.actions(), ["You ride to the castle"]);
        assert_eq!(story.results(), ["The gates are shut tight."]);
    }

    #[tokio::test]
    async fn test_restart_without_opening_keeps_story() {
        let scripted = Arc::new(ScriptedCompletion::new());
        let mut game = game_with(&scripted);
        let mut story = Story::new(game.generator.clone(), "You are a bard.", Default::default())
            .with_opening("You sing", "The crowd cheers.");

        game.command(&mut story, Command::Restart).await;
        assert_eq!(story.results(), ["The crowd cheers."]);
        assert!(scripted.requests().is_empty());
    }

    #[tokio::test]
    async fn test_set_changes_story_sampling() {
        let scripted = Arc::new(ScriptedCompletion::new());
        let mut game = game_with(&scripted);
        let mut story = Story::new(game.generator.clone(), "You are a bard.", Default::default());

        game.command(&mut story, Command::Set("top-keks".into(), "50".into()))
            .await;
        assert_eq!(story.sampling().top_k, 50);

        game.command(&mut story, Command::Set("temp".into(), "-1".into()))
            .await;
        game.command(&mut story, Command::Set("volume".into(), "11".into()))
            .await;
        assert_eq!(story.sampling().temperature, Settings::default().temp);
    }

    #[test]
    fn test_command_text() {
        assert_eq!(command_text("/retry"), Some("retry"));
        assert_eq!(command_text("You /remember the key"), Some("remember the key"));
        assert_eq!(command_text("  you/help"), Some("help"));
        assert_eq!(command_text("You open the door"), None);
        assert_eq!(command_text("é"), None);
    }

    #[test]
    fn test_parse_prompt_file() {
        let (context, prompt) =
            parse_prompt_file("You are a knight.\nYou ride to the castle\nas the sun sets,\n");
        assert_eq!(context, "You are a knight.");
        assert_eq!(prompt, "You ride to the castle as the sun sets,");
    }

    #[test]
    fn test_parse_prompt_file_context_only() {
        let (context, prompt) = parse_prompt_file("You are a knight.");
        assert_eq!(context, "You are a knight.");
        assert_eq!(prompt, "");
    }
}
