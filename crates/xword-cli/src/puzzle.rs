//! Puzzle files
//!
//! A puzzle file holds the payload of a `create` event, either bare
//! (`{"pid": ..., "game": {...}}`) or as the whole event.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use xword_core::events::CreatePuzzle;

pub fn load_puzzle(path: &Path) -> Result<CreatePuzzle> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read puzzle file {:?}", path))?;
    parse_puzzle(&content).with_context(|| format!("Invalid puzzle file {:?}", path))
}

fn parse_puzzle(content: &str) -> Result<CreatePuzzle> {
    let mut value: Value = serde_json::from_str(content)?;
    if let Some(params) = value.get_mut("params") {
        value = params.take();
    }
    let puzzle: CreatePuzzle = serde_json::from_value(value)?;
    if puzzle.grid().is_empty() {
        bail!("puzzle '{}' has an empty grid", puzzle.pid);
    }
    if !puzzle.grid().is_rectangular() {
        bail!("puzzle '{}' has rows of different lengths", puzzle.pid);
    }
    Ok(puzzle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BARE: &str = r#"{"pid": "p1", "game": {"solution": [["A", "B"], [".", "C"]],
        "clues": {"across": [null, "First"], "down": [null, "Down"]}}}"#;

    #[test]
    fn test_parse_bare_payload() {
        let puzzle = parse_puzzle(BARE).unwrap();
        assert_eq!(puzzle.pid, "p1");
        assert_eq!(puzzle.grid().rows(), 2);
        assert_eq!(puzzle.clues().across[1].as_deref(), Some("First"));
    }

    #[test]
    fn test_parse_create_event() {
        let event = format!(r#"{{"id": "e1", "type": "create", "params": {}}}"#, BARE);
        let puzzle = parse_puzzle(&event).unwrap();
        assert_eq!(puzzle.pid, "p1");
    }

    #[test]
    fn test_rejects_empty_grid() {
        assert!(parse_puzzle(r#"{"pid": "p1", "game": {"solution": []}}"#).is_err());
        assert!(parse_puzzle("not json").is_err());
    }

    #[test]
    fn test_rejects_ragged_grid() {
        let ragged = r#"{"pid": "p1", "game": {"solution": [["A"], ["B", "C"]]}}"#;
        assert!(parse_puzzle(ragged).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("puzzle.json");
        std::fs::write(&path, BARE).unwrap();

        assert_eq!(load_puzzle(&path).unwrap().pid, "p1");
        assert!(load_puzzle(&temp_dir.path().join("missing.json")).is_err());
    }
}
