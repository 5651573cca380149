//! Line-oriented terminal input and output.

use std::io::{self, Write};

pub const HELP: &str = "\
Type an action, or one of these commands:
  /revert             Undo the last turn
  /retry              Generate the last turn again
  /alter <text>       Replace the last result
  /altergen <text>    Replace the last result and let the AI continue it
  /context <text>     Replace the story context
  /remember <text>    Add something to memory
  /forget <n>         Remove memory entry n
  /memswap <n> <m>    Swap two memory entries
  /memalt <n> [text]  Replace memory entry n (no text removes it)
  /summarize <text>   Restart the story from your own summary
  /restart            Start the story over from its opening
  /set <key> <value>  Change temp, top-p, top-keks, rep-pen, rep-pen-range or rep-pen-slope
  /drop <item>        Drop an inventory item
  /sheet              Show your character sheet
  /print              Print the whole story
  /save [name]        Save the story
  /load <name>        Load a saved story
  /saves              List saved stories
  /help               Show this help
  /quit               Leave the game

Actions:
  <number>            Take a suggested action
  \"Hello!\"            Say something
  !<text>             Write the story yourself
  (nothing)           Let the story continue";

/// Reads player input from stdin, one line at a time.
pub struct Console;

impl Console {
    /// Print `prompt` and read a line. `None` at end of input.
    pub fn read_line(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        io::stdout().flush().ok();

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(e) => {
                eprintln!("Error reading input: {e}");
                None
            }
        }
    }

    /// Ask for a number in `0..=max`. A blank line picks 0.
    pub fn read_number(&mut self, max: usize) -> Option<usize> {
        loop {
            let line = self.read_line("Enter a number: ")?;
            let line = line.trim();
            if line.is_empty() {
                return Some(0);
            }
            match line.parse::<usize>() {
                Ok(n) if n <= max => return Some(n),
                _ => println!("[ERROR] Please enter a number between 0 and {max}."),
            }
        }
    }

    /// Ask a yes/no question. Anything but "y" or "yes" is no.
    pub fn confirm(&mut self, question: &str) -> bool {
        self.read_line(question)
            .map(|answer| matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
            .unwrap_or(false)
    }

    /// Ask until a non-blank answer is given.
    pub fn read_required(&mut self, prompt: &str) -> Option<String> {
        loop {
            let line = self.read_line(prompt)?;
            if !line.trim().is_empty() {
                return Some(line.trim().to_string());
            }
            println!("[ERROR] Please enter a name.");
        }
    }
}

/// Print a numbered list, starting at 0.
pub fn print_list<S: AsRef<str>>(items: &[S]) {
    for (i, item) in items.iter().enumerate() {
        println!("{i}) {}", item.as_ref());
    }
}
