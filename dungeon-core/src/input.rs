//! Player input.
//!
//! Turns a line typed by the player into either a session [`Command`]
//! (`/retry`, `/remember ...`) or the action text handed to
//! [`Story::act`](crate::story::Story::act).
//!
//! Actions are normalized to second person and, when d20 rolls are enabled,
//! flavoured by the roll: a natural 1 fails outright, a 20 succeeds with
//! style.

use crate::dictionary::{ACTION_D01, ACTION_D20, SAY_D01, SAY_D20};
use crate::text::{decapitalize, end_sentence, first_to_second_person, format_input};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;
use std::str::FromStr;
use thiserror::Error;

lazy_static::lazy_static! {
    static ref INSERTION: Regex = Regex::new(r"(?i)^(?:you\s*)?!\s*(.*)$").expect("insertion pattern");
    static ref LEADING_YOU: Regex = Regex::new(r"(?i)^(?:you(?:\s+|$))+").expect("leading you pattern");
    static ref NOTHING: Regex = Regex::new(r"(?i)^(?:you\s*)*[.?!]*$").expect("empty action pattern");
    static ref SPEECH: Regex = Regex::new(r#"(?i)^(?:say\s+)?(["'].*["'])$"#).expect("speech pattern");
}

/// Errors from parsing player input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Nothing to insert after '!'")]
    EmptyInsertion,

    #[error("There is no suggestion #{0}")]
    NoSuchSuggestion(usize),

    #[error("Unknown command: /{0}")]
    UnknownCommand(String),

    #[error("/{command} needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("Not an index: {0:?}")]
    BadIndex(String),
}

/// A shaped player action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionInput {
    /// Let the story continue without an action.
    Continue,
    /// Text inserted into the story verbatim.
    Insertion(String),
    /// A second-person action ("You open the door.").
    Act(String),
}

fn pick<'a, R: Rng + ?Sized>(words: &[&'a str], rng: &mut R) -> &'a str {
    words.choose(rng).copied().unwrap_or_default()
}

/// "You say ..." flavoured by a d20 roll.
pub fn d20ify_speech<R: Rng + ?Sized>(speech: &str, roll: u8, rng: &mut R) -> String {
    match roll {
        1 => format!("You {} {speech}", pick(SAY_D01, rng)),
        20 => format!("You {} say {speech}", pick(SAY_D20, rng)),
        _ => format!("You say {speech}"),
    }
}

/// "You ..." flavoured by a d20 roll.
pub fn d20ify_action<R: Rng + ?Sized>(action: &str, roll: u8, rng: &mut R) -> String {
    match roll {
        1 => format!("You {} fail to {action}", pick(ACTION_D01, rng)),
        2..=4 => format!("You attempt to {action}"),
        5..=9 => format!("You try to {action}"),
        10..=14 => format!("You start to {action}"),
        15..=19 => format!("You {action}"),
        _ => format!("You {} {action}", pick(ACTION_D20, rng)),
    }
}

impl ActionInput {
    /// Shape a line of player text.
    ///
    /// `suggestions` are the ones last shown, selectable by index. `roll` is
    /// the d20 result for this action, or `None` when rolls are disabled.
    pub fn parse<R: Rng + ?Sized>(
        raw: &str,
        suggestions: &[String],
        roll: Option<u8>,
        rng: &mut R,
    ) -> Result<Self, InputError> {
        let text = format_input(raw);

        if let Some(caps) = INSERTION.captures(&text) {
            let inserted = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            if inserted.is_empty() {
                return Err(InputError::EmptyInsertion);
            }
            return Ok(Self::Insertion(inserted.to_string()));
        }

        let body = LEADING_YOU.replace(&text, "").trim().to_string();
        if NOTHING.is_match(&body) {
            return Ok(Self::Continue);
        }

        if let Ok(index) = body.parse::<usize>() {
            let suggestion = suggestions
                .get(index)
                .ok_or(InputError::NoSuchSuggestion(index))?;
            return Ok(Self::Act(end_sentence(&format!(
                "You {}",
                decapitalize(suggestion.trim())
            ))));
        }

        if let Some(speech) = SPEECH.captures(&body).and_then(|caps| caps.get(1)) {
            let speech = speech.as_str();
            let text = match roll {
                Some(roll) => d20ify_speech(speech, roll, rng),
                None => format!("You say {speech}"),
            };
            return Ok(Self::Act(end_sentence(&text)));
        }

        let converted = first_to_second_person(&body);
        let action = decapitalize(LEADING_YOU.replace(&converted, "").trim());
        if NOTHING.is_match(&action) {
            return Ok(Self::Continue);
        }
        let text = match roll {
            Some(roll) => d20ify_action(&action, roll, rng),
            None => format!("You {action}"),
        };
        Ok(Self::Act(end_sentence(&text)))
    }

    /// The text to pass to `Story::act`.
    pub fn into_action(self) -> String {
        match self {
            Self::Continue => String::new(),
            Self::Insertion(text) => format!("!{text}"),
            Self::Act(text) => text,
        }
    }
}

/// Session commands, typed with a leading `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Revert,
    Retry,
    Print,
    Sheet,
    Saves,
    Help,
    Quit,
    /// Start over from the session's opening context and prompt.
    Restart,
    /// Change one sampling parameter, e.g. `/set temp 0.6`.
    Set(String, String),
    /// Replace the last result.
    Alter(String),
    /// Replace the last result with this text plus a fresh continuation.
    AlterGen(String),
    Context(String),
    Remember(String),
    Forget(usize),
    MemSwap(usize, usize),
    /// Replace a memory entry; empty text removes it.
    MemAlt(usize, String),
    Save(Option<String>),
    Load(String),
    Summarize(String),
    Drop(String),
}

fn required(command: &'static str, rest: &str, expected: &'static str) -> Result<String, InputError> {
    if rest.is_empty() {
        Err(InputError::MissingArgument { command, expected })
    } else {
        Ok(rest.to_string())
    }
}

fn index(command: &'static str, arg: Option<&str>) -> Result<usize, InputError> {
    let arg = arg.ok_or(InputError::MissingArgument {
        command,
        expected: "a memory index",
    })?;
    arg.parse().map_err(|_| InputError::BadIndex(arg.to_string()))
}

impl FromStr for Command {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('/').unwrap_or(s);
        let (name, rest) = match s.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (s, ""),
        };

        match name.to_lowercase().as_str() {
            "revert" => Ok(Self::Revert),
            "retry" => Ok(Self::Retry),
            "print" => Ok(Self::Print),
            "sheet" => Ok(Self::Sheet),
            "saves" => Ok(Self::Saves),
            "help" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            "restart" => Ok(Self::Restart),
            "set" => {
                let (key, value) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let key = required("set", key, "a setting name")?;
                let value = required("set", value.trim(), "a value")?;
                Ok(Self::Set(key.to_lowercase(), value))
            }
            "alter" => Ok(Self::Alter(required("alter", rest, "the new text")?)),
            "altergen" => Ok(Self::AlterGen(required("altergen", rest, "the start of the new text")?)),
            "context" => Ok(Self::Context(required("context", rest, "the new context")?)),
            "remember" => Ok(Self::Remember(required("remember", rest, "something to remember")?)),
            "forget" => Ok(Self::Forget(index("forget", rest.split_whitespace().next())?)),
            "memswap" => {
                let mut args = rest.split_whitespace();
                let i = index("memswap", args.next())?;
                let j = index("memswap", args.next())?;
                Ok(Self::MemSwap(i, j))
            }
            "memalt" => {
                let (i, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let i = index("memalt", (!i.is_empty()).then_some(i))?;
                Ok(Self::MemAlt(i, text.trim().to_string()))
            }
            "save" => Ok(Self::Save((!rest.is_empty()).then(|| rest.to_string()))),
            "load" => Ok(Self::Load(required("load", rest, "a save name")?)),
            "summarize" => Ok(Self::Summarize(required("summarize", rest, "a summary")?)),
            "drop" => Ok(Self::Drop(required("drop", rest, "an item")?)),
            other => Err(InputError::UnknownCommand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn shape(raw: &str, roll: Option<u8>) -> Result<ActionInput, InputError> {
        let suggestions = vec!["Open the chest".to_string(), "Run away".to_string()];
        let mut rng = StdRng::seed_from_u64(42);
        ActionInput::parse(raw, &suggestions, roll, &mut rng)
    }

    #[test]
    fn test_plain_action() {
        assert_eq!(
            shape("open the door", None).unwrap(),
            ActionInput::Act("You open the door.".to_string())
        );
        assert_eq!(
            shape("You  you draw my sword!", None).unwrap(),
            ActionInput::Act("You draw your sword!".to_string())
        );
        assert_eq!(
            shape("I check my pockets", None).unwrap(),
            ActionInput::Act("You check your pockets.".to_string())
        );
    }

    #[test]
    fn test_continue() {
        assert_eq!(shape("", None).unwrap(), ActionInput::Continue);
        assert_eq!(shape("you", None).unwrap(), ActionInput::Continue);
        assert_eq!(shape(" You . ", None).unwrap(), ActionInput::Continue);
        assert_eq!(ActionInput::Continue.into_action(), "");
    }

    #[test]
    fn test_insertion() {
        let input = shape("!The ceiling collapses", Some(1)).unwrap();
        assert_eq!(input, ActionInput::Insertion("The ceiling collapses".to_string()));
        assert_eq!(input.into_action(), "!The ceiling collapses");

        assert_eq!(
            shape("you ! a wolf howls", None).unwrap(),
            ActionInput::Insertion("a wolf howls".to_string())
        );
        assert_eq!(shape("! ", None), Err(InputError::EmptyInsertion));
    }

    #[test]
    fn test_suggestion_selection() {
        assert_eq!(
            shape("1", Some(1)).unwrap(),
            ActionInput::Act("You run away.".to_string())
        );
        assert_eq!(shape("7", None), Err(InputError::NoSuchSuggestion(7)));
    }

    #[test]
    fn test_speech() {
        assert_eq!(
            shape("\"Hello there\"", None).unwrap(),
            ActionInput::Act("You say \"Hello there\".".to_string())
        );
        assert_eq!(
            shape("say 'I am lost'", Some(10)).unwrap(),
            ActionInput::Act("You say 'I am lost'.".to_string())
        );

        let ActionInput::Act(text) = shape("\"Surrender!\"", Some(1)).unwrap() else {
            panic!("expected an action");
        };
        assert!(SAY_D01.iter().any(|verb| text.starts_with(&format!("You {verb} \"Surrender!\""))));
    }

    #[test]
    fn test_d20_action_bands() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(d20ify_action("jump", 3, &mut rng), "You attempt to jump");
        assert_eq!(d20ify_action("jump", 9, &mut rng), "You try to jump");
        assert_eq!(d20ify_action("jump", 10, &mut rng), "You start to jump");
        assert_eq!(d20ify_action("jump", 19, &mut rng), "You jump");

        let fail = d20ify_action("jump", 1, &mut rng);
        assert!(fail.ends_with(" fail to jump"));
        let great = d20ify_action("jump", 20, &mut rng);
        assert!(ACTION_D20.iter().any(|adverb| great == format!("You {adverb} jump")));
    }

    #[test]
    fn test_commands() {
        assert_eq!("/retry".parse::<Command>().unwrap(), Command::Retry);
        assert_eq!("/REVERT".parse::<Command>().unwrap(), Command::Revert);
        assert_eq!(
            "/remember the king is dead".parse::<Command>().unwrap(),
            Command::Remember("the king is dead".to_string())
        );
        assert_eq!("/memswap 0 2".parse::<Command>().unwrap(), Command::MemSwap(0, 2));
        assert_eq!(
            "/memalt 1 The queen rules.".parse::<Command>().unwrap(),
            Command::MemAlt(1, "The queen rules.".to_string())
        );
        assert_eq!("/memalt 1".parse::<Command>().unwrap(), Command::MemAlt(1, String::new()));
        assert_eq!("/save".parse::<Command>().unwrap(), Command::Save(None));
        assert_eq!(
            "/save castle".parse::<Command>().unwrap(),
            Command::Save(Some("castle".to_string()))
        );
    }

    #[test]
    fn test_command_errors() {
        assert_eq!(
            "/dance".parse::<Command>(),
            Err(InputError::UnknownCommand("dance".to_string()))
        );
        assert!(matches!(
            "/alter".parse::<Command>(),
            Err(InputError::MissingArgument { command: "alter", .. })
        ));
        assert_eq!(
            "/forget two".parse::<Command>(),
            Err(InputError::BadIndex("two".to_string()))
        );
        assert!(matches!(
            "/memswap 1".parse::<Command>(),
            Err(InputError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_restart_and_set_commands() {
        assert_eq!("/restart".parse::<Command>().unwrap(), Command::Restart);
        assert_eq!(
            "/set Temp  0.6".parse::<Command>().unwrap(),
            Command::Set("temp".to_string(), "0.6".to_string())
        );
        assert!(matches!(
            "/set".parse::<Command>(),
            Err(InputError::MissingArgument {
                command: "set",
                expected: "a setting name"
            })
        ));
        assert!(matches!(
            "/set temp".parse::<Command>(),
            Err(InputError::MissingArgument {
                command: "set",
                expected: "a value"
            })
        ));
    }
}
