//! Text heuristics over generated prose and player input.
//!
//! Everything here is a pure, best-effort function. Model output is messy and
//! none of these can be exact; they only have to be predictable.

use crate::dictionary::{
    ABSTRACT_NOUNS, DEATH_PATTERNS, FIRST_TO_SECOND, PHRASE_STOP_WORDS, VICTORY_PATTERNS,
};
use regex::{Captures, Regex, RegexSet};

/// Longest item name picked out of an acquisition sentence, in words.
const MAX_ITEM_WORDS: usize = 3;

lazy_static::lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace pattern");

    static ref SPACE_BEFORE_PUNCTUATION: Regex =
        Regex::new(r" ([,.!?;:])").expect("punctuation pattern");

    static ref ACQUISITION: Regex = Regex::new(
        r"(?i)\b(?:pick\s+up|take|grab|acquire|get|find|obtain|collect)\s+(?:the|a|an|some)\s+"
    )
    .expect("acquisition pattern");

    static ref FIRST_PERSON: Regex = {
        let phrases: Vec<String> = FIRST_TO_SECOND
            .iter()
            .map(|(from, _)| regex::escape(from))
            .collect();
        Regex::new(&format!(r"(?i)\b(?:{})\b", phrases.join("|"))).expect("pronoun pattern")
    };

    static ref DEATH: RegexSet = RegexSet::new(DEATH_PATTERNS).expect("death patterns");
    static ref VICTORY: RegexSet = RegexSet::new(VICTORY_PATTERNS).expect("victory patterns");
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closing_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | '\u{201d}' | '\u{2019}' | ')')
}

/// Byte offset just past the last sentence terminator, including any
/// closing quotes that follow it.
fn last_sentence_end(text: &str) -> Option<usize> {
    let mut end = None;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let mut stop = i + c.len_utf8();
        while let Some(&(j, q)) = chars.peek() {
            if !is_closing_quote(q) {
                break;
            }
            stop = j + q.len_utf8();
            chars.next();
        }
        end = Some(stop);
    }
    end
}

/// Drop everything after the last complete sentence.
///
/// Text from a `<` onwards is always discarded (end-of-text token
/// fragments). With `allow_action` the text is also cut at the first `>`
/// action marker, and an unterminated remainder is accepted as is. Without
/// it, text that has no sentence terminator at all comes back empty.
pub fn cut_trailing_sentence(text: &str, allow_action: bool) -> String {
    let mut text = text;
    if let Some(pos) = text.find('<') {
        text = &text[..pos];
    }
    if allow_action {
        if let Some(pos) = text.find('>') {
            text = &text[..pos];
        }
    }

    match last_sentence_end(text) {
        Some(end) => text[..end].trim().to_string(),
        None if allow_action => text.trim().to_string(),
        None => String::new(),
    }
}

/// Collapse whitespace into single spaces and remove spaces before
/// punctuation. The result is a single line.
pub fn format_input(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    SPACE_BEFORE_PUNCTUATION
        .replace_all(&collapsed, "$1")
        .into_owned()
}

/// Like [`format_input`], but keeps line breaks and drops blank lines.
pub fn format_result(text: &str) -> String {
    text.lines()
        .map(format_input)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Append a period unless the text already ends a sentence.
pub fn end_sentence(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return String::new();
    }
    match trimmed.trim_end_matches(is_closing_quote).chars().last() {
        Some(c) if is_terminator(c) => trimmed.to_string(),
        _ => format!("{trimmed}."),
    }
}

/// Uppercase the first character.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase the first character.
pub fn decapitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Uppercase the first letter of every sentence.
fn capitalize_sentences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut sentence_start = true;
    for c in text.chars() {
        if sentence_start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            sentence_start = false;
            continue;
        }
        if is_terminator(c) {
            sentence_start = true;
        } else if c.is_alphanumeric() {
            sentence_start = false;
        }
        out.push(c);
    }
    out
}

/// Rewrite first-person narration into second person ("I draw my sword"
/// becomes "You draw your sword"). Quoted speech is left alone.
pub fn first_to_second_person(text: &str) -> String {
    let converted: Vec<String> = text
        .split('"')
        .enumerate()
        .map(|(i, segment)| {
            if i % 2 == 1 {
                return segment.to_string();
            }
            FIRST_PERSON
                .replace_all(segment, |caps: &Captures| {
                    let found = &caps[0];
                    let lower = found.to_lowercase();
                    let replacement = FIRST_TO_SECOND
                        .iter()
                        .find(|(from, _)| *from == lower)
                        .map(|(_, to)| *to)
                        .unwrap_or(found);
                    // "I" is always capitalized, so its case says nothing
                    let upper = found.chars().next().is_some_and(char::is_uppercase);
                    if upper && !lower.starts_with('i') {
                        capitalize(replacement)
                    } else {
                        replacement.to_string()
                    }
                })
                .into_owned()
        })
        .collect();
    capitalize_sentences(&converted.join("\""))
}

fn is_acquiring_subject(word: &str) -> bool {
    matches!(word, "you" | "and" | "then")
}

/// Whether the words right before an acquisition verb make the player its
/// subject ("you take", "and grab", "you quickly pick up").
fn has_acquiring_subject(before: &str) -> bool {
    let mut words = before.split_whitespace().rev().map(|word| {
        word.trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase()
    });
    match words.next() {
        Some(word) if is_acquiring_subject(&word) => true,
        Some(word) if word.ends_with("ly") => {
            words.next().is_some_and(|w| is_acquiring_subject(&w))
        }
        _ => false,
    }
}

/// Up to three lowercase words naming the object, stopping at punctuation
/// or a stop word.
fn item_phrase(rest: &str) -> Option<String> {
    let mut words: Vec<String> = Vec::new();
    for raw in rest.split_whitespace().take(MAX_ITEM_WORDS) {
        let word = raw.trim_end_matches(|c: char| !c.is_alphanumeric());
        let lower = word.to_lowercase();
        let is_word = !lower.is_empty()
            && lower
                .chars()
                .all(|c| c.is_alphabetic() || c == '-' || c == '\'');
        if !is_word || PHRASE_STOP_WORDS.contains(&lower.as_str()) {
            break;
        }
        words.push(lower);
        if word.len() != raw.len() {
            break;
        }
    }

    if words.is_empty() || words.iter().any(|w| ABSTRACT_NOUNS.contains(&w.as_str())) {
        return None;
    }
    Some(words.join(" "))
}

/// Items the text says the player picked up, lowercased, in order of
/// appearance and without duplicates.
pub fn detect_acquisitions(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    for found in ACQUISITION.find_iter(text) {
        if !has_acquiring_subject(&text[..found.start()]) {
            continue;
        }
        if let Some(item) = item_phrase(&text[found.end()..]) {
            if !items.contains(&item) {
                items.push(item);
            }
        }
    }
    items
}

/// Normalized Levenshtein similarity in `[0, 1]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    rapidfuzz::distance::levenshtein::normalized_similarity(a.chars(), b.chars())
}

/// Whether the text describes the player's death.
pub fn player_died(text: &str) -> bool {
    DEATH.is_match(&text.to_lowercase())
}

/// Whether the text describes the player winning the story.
pub fn player_won(text: &str) -> bool {
    VICTORY.is_match(&text.to_lowercase())
}
