//! The player's character sheet: a few fixed stats and an inventory ledger.
//!
//! Items are stored lowercased and deduplicated. The ledger is filled by
//! scanning generated text (see [`crate::text::detect_acquisitions`]) and
//! emptied by explicit drop commands.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Errors from inventory operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InventoryError {
    #[error("You don't have '{0}' to drop.")]
    NotFound(String),
}

/// Stats and inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterSheet {
    pub stats: BTreeMap<String, i32>,
    inventory: BTreeSet<String>,
}

impl Default for CharacterSheet {
    fn default() -> Self {
        let stats = [
            ("Strength", 10),
            ("Dexterity", 10),
            ("Intelligence", 10),
            ("Sanity", 100),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        Self {
            stats,
            inventory: BTreeSet::new(),
        }
    }
}

fn normalize(item: &str) -> String {
    item.trim().to_lowercase()
}

/// "rusty sword" -> "Rusty Sword"
fn title_case(item: &str) -> String {
    item.split(' ')
        .map(crate::text::capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

impl CharacterSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item. Returns `false` when it was already carried or the name
    /// is blank.
    pub fn add_item(&mut self, item: &str) -> bool {
        let item = normalize(item);
        if item.is_empty() {
            return false;
        }
        let added = self.inventory.insert(item.clone());
        if added {
            tracing::info!(item = %item, "Item acquired");
        }
        added
    }

    /// Remove an item by exact (case-insensitive) name.
    pub fn remove_item(&mut self, item: &str) -> Result<(), InventoryError> {
        let item = normalize(item);
        if self.inventory.remove(&item) {
            tracing::info!(item = %item, "Item dropped");
            Ok(())
        } else {
            Err(InventoryError::NotFound(title_case(&item)))
        }
    }

    /// Whether any carried item contains `needle` ("key" matches "rusty key").
    pub fn has_item(&self, needle: &str) -> bool {
        let needle = normalize(needle);
        !needle.is_empty() && self.inventory.iter().any(|item| item.contains(&needle))
    }

    /// Carried items, sorted.
    pub fn items(&self) -> impl Iterator<Item = &str> {
        self.inventory.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.inventory.is_empty()
    }

    pub fn stat(&self, name: &str) -> Option<i32> {
        self.stats.get(name).copied()
    }
}

impl fmt::Display for CharacterSheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Character Sheet ---")?;
        writeln!(f, "Stats:")?;
        for (name, value) in &self.stats {
            writeln!(f, "  {name}: {value}")?;
        }
        writeln!(f)?;
        writeln!(f, "Inventory:")?;
        if self.inventory.is_empty() {
            writeln!(f, "  - Empty -")?;
        }
        for item in &self.inventory {
            writeln!(f, "  - {}", title_case(item))?;
        }
        write!(f, "-----------------------")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats() {
        let sheet = CharacterSheet::new();
        assert_eq!(sheet.stat("Strength"), Some(10));
        assert_eq!(sheet.stat("Sanity"), Some(100));
        assert!(sheet.is_empty());
    }

    #[test]
    fn test_add_item_deduplicates_case_insensitively() {
        let mut sheet = CharacterSheet::new();
        assert!(sheet.add_item("Torch"));
        assert!(!sheet.add_item("torch"));
        assert!(!sheet.add_item("  TORCH "));
        assert_eq!(sheet.items().collect::<Vec<_>>(), vec!["torch"]);
    }

    #[test]
    fn test_blank_items_are_ignored() {
        let mut sheet = CharacterSheet::new();
        assert!(!sheet.add_item("   "));
        assert!(sheet.is_empty());
    }

    #[test]
    fn test_remove_missing_item() {
        let mut sheet = CharacterSheet::new();
        sheet.add_item("rope");

        let err = sheet.remove_item("rusty key").unwrap_err();
        assert_eq!(err, InventoryError::NotFound("Rusty Key".to_string()));
        assert_eq!(err.to_string(), "You don't have 'Rusty Key' to drop.");
        assert_eq!(sheet.items().collect::<Vec<_>>(), vec!["rope"]);

        sheet.remove_item("ROPE").unwrap();
        assert!(sheet.is_empty());
    }

    #[test]
    fn test_has_item_matches_substrings() {
        let mut sheet = CharacterSheet::new();
        sheet.add_item("rusty key");
        assert!(sheet.has_item("key"));
        assert!(sheet.has_item("Rusty"));
        assert!(!sheet.has_item("sword"));
        assert!(!sheet.has_item(""));
    }

    #[test]
    fn test_display_lists_items() {
        let mut sheet = CharacterSheet::new();
        assert!(sheet.to_string().contains("- Empty -"));
        sheet.add_item("old lantern");
        let shown = sheet.to_string();
        assert!(shown.contains("Strength: 10"));
        assert!(shown.contains("- Old Lantern"));
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let sheet: CharacterSheet = serde_json::from_str(r#"{"inventory": ["map"]}"#).unwrap();
        assert!(sheet.has_item("map"));
        assert_eq!(sheet.stat("Dexterity"), Some(10));
    }
}
