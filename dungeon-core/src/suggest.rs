//! Action suggestions.
//!
//! Suggestions are filled from three tiers, in order: one action enabled by
//! an inventory item, actions keyed on words in the last result, and finally
//! actions generated by the model. The list is de-duplicated
//! case-insensitively and cut to the configured total.

use crate::config::Settings;
use crate::dictionary::{INVENTORY_RULES, KEYWORD_ACTIONS};
use crate::story::Story;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Composes the suggestion list shown after each turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuggestionComposer {
    total: usize,
    keyword_quota: usize,
}

fn push_unique(list: &mut Vec<String>, candidate: &str) -> bool {
    let candidate = candidate.trim();
    if candidate.is_empty() || list.iter().any(|s| s.to_lowercase() == candidate.to_lowercase()) {
        return false;
    }
    list.push(candidate.to_string());
    true
}

impl SuggestionComposer {
    pub fn new(total: usize, keyword_quota: usize) -> Self {
        Self {
            total,
            keyword_quota,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.action_suggestions, settings.keyword_suggestions)
    }

    pub fn is_enabled(&self) -> bool {
        self.total > 0
    }

    /// Inventory actions whose trigger appears in `scene` and whose item the
    /// player carries.
    pub fn inventory_candidates(scene: &str, story: &Story) -> Vec<&'static str> {
        let scene = scene.to_lowercase();
        INVENTORY_RULES
            .iter()
            .filter(|rule| scene.contains(rule.trigger) && story.sheet().has_item(rule.item))
            .map(|rule| rule.action)
            .collect()
    }

    /// Keywords present in `scene`, each with its actions.
    pub fn keyword_candidates(scene: &str) -> Vec<(&'static str, &'static [&'static str])> {
        let scene = scene.to_lowercase();
        KEYWORD_ACTIONS
            .iter()
            .filter(|(keyword, _)| scene.contains(keyword))
            .copied()
            .collect()
    }

    /// Build the suggestion list for the story's current scene.
    pub async fn compose<R: Rng + ?Sized>(&self, story: &Story, rng: &mut R) -> Vec<String> {
        if self.total == 0 {
            return Vec::new();
        }

        let scene = story.last_result().unwrap_or_default();
        let mut suggestions = Vec::new();

        if let Some(action) = Self::inventory_candidates(scene, story).choose(rng) {
            push_unique(&mut suggestions, action);
        }

        let mut keywords = Self::keyword_candidates(scene);
        keywords.shuffle(rng);
        'keywords: for (_, actions) in keywords {
            let mut actions = actions.to_vec();
            actions.shuffle(rng);
            for action in actions {
                if suggestions.len() >= self.keyword_quota.min(self.total) {
                    break 'keywords;
                }
                push_unique(&mut suggestions, action);
            }
        }

        let from_tables = suggestions.len();
        let remaining = self.total.saturating_sub(from_tables);
        for _ in 0..remaining {
            let suggestion = story.suggestion(&suggestions).await;
            if !push_unique(&mut suggestions, &suggestion) {
                debug!(suggestion = %suggestion, "Dropped empty or duplicate suggestion");
            }
        }

        suggestions.truncate(self.total);
        debug!(from_tables, total = suggestions.len(), "Suggestions composed");
        suggestions
    }
}
