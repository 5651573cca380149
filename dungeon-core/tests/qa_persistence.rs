//! QA tests for saving and loading stories.
//!
//! Run with: `cargo test -p dungeon-core --test qa_persistence`

use dungeon_core::persist::list_saves;
use dungeon_core::testing::TestHarness;
use dungeon_core::{PersistError, Story, StoryError};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    let mut harness = TestHarness::new("You are a knight.");
    harness
        .expect_result("The castle looms ahead.")
        .expect_result("You find a silver shield.");
    harness.input("").await;
    harness.input("You enter the castle.").await;
    harness.story.remember("the king is dead").unwrap();

    let path = harness
        .story
        .save(temp_dir.path(), Some("knight"))
        .await
        .expect("Failed to save story");
    assert!(path.exists(), "Save file should exist after saving");
    assert_eq!(harness.story.savefile(), Some("knight"));

    let generator = harness.story.generator().clone();
    let loaded = Story::load(&path, generator).await.expect("Failed to load story");

    assert_eq!(loaded.context(), harness.story.context());
    assert_eq!(loaded.memory(), ["The king is dead."]);
    assert_eq!(loaded.actions(), harness.story.actions());
    assert_eq!(loaded.results(), harness.story.results());
    assert_eq!(loaded.sheet(), harness.story.sheet());
    assert_eq!(loaded.sampling(), harness.story.sampling());
    assert_eq!(loaded.savefile(), Some("knight"));
}

#[tokio::test]
async fn test_resave_uses_current_name() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    let mut harness = TestHarness::new("You are a bard.");
    harness.expect_result("The tavern is loud.").expect_result("They cheer.");
    harness.input("").await;
    harness.story.save(temp_dir.path(), Some("saves/tavern.json")).await.unwrap();

    harness.input("You sing a song.").await;
    let path = harness.story.save(temp_dir.path(), None).await.unwrap();

    assert_eq!(path, temp_dir.path().join("tavern.json"));
    let saves = list_saves(temp_dir.path()).await.unwrap();
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].name, "tavern");
    assert_eq!(saves[0].turns, 2);
}

#[tokio::test]
async fn test_save_without_name_fails() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    let mut harness = TestHarness::new("You are a bard.");
    let result = harness.story.save(temp_dir.path(), None).await;

    assert!(matches!(
        result,
        Err(StoryError::Persist(PersistError::InvalidName(_)))
    ));
    assert!(list_saves(temp_dir.path()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_load_rejects_broken_transcript() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("broken.json");
    std::fs::write(
        &path,
        r#"{"temp": 0.4, "top-p": 0.9, "top-keks": 20, "rep-pen": 1.2,
            "context": "c", "memory": [], "actions": ["a", "b"], "results": ["r"]}"#,
    )
    .unwrap();

    let harness = TestHarness::new("You are a bard.");
    let result = Story::load(&path, Arc::clone(harness.story.generator())).await;

    assert!(matches!(
        result,
        Err(StoryError::Persist(PersistError::InvalidFormat(_)))
    ));
}

#[tokio::test]
async fn test_load_missing_save() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let harness = TestHarness::new("You are a bard.");

    let result = Story::load(temp_dir.path().join("nope.json"), harness.story.generator().clone()).await;

    assert!(matches!(
        result,
        Err(StoryError::Persist(PersistError::NotFound(_)))
    ));
}
