//! Snapshot command handlers

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

use xword_core::{Config, SnapshotStore, StorageError};

use crate::output::{Output, OutputFormat};
use crate::puzzle::load_puzzle;

/// Show the saved snapshot of a game (or offline puzzle)
pub fn show(
    id: String,
    puzzle: Option<PathBuf>,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let store = SnapshotStore::from_config(&config);

    let Some(state) = store.load(&id).map_err(with_hint)? else {
        anyhow::bail!("No saved game '{}' in {}", id, config.data_dir.display());
    };
    let grid = puzzle
        .as_deref()
        .map(load_puzzle)
        .transpose()?
        .map(|p| p.grid());

    output.print_snapshot(&id, &state, grid.as_ref());
    Ok(())
}

/// Delete the saved snapshot of a game
pub fn forget(id: String, config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;
    let store = SnapshotStore::from_config(&config);

    if !store.exists(&id) {
        match output.format {
            OutputFormat::Json => println!(
                "{}",
                serde_json::json!({"status": "missing", "id": id})
            ),
            _ => output.message(&format!("No saved game '{}'", id)),
        }
        return Ok(());
    }

    store.delete(&id).map_err(with_hint)?;
    output.success(&format!("Forgot {}", id));
    Ok(())
}

/// Storage error with its recovery suggestion, if any
fn with_hint(error: StorageError) -> anyhow::Error {
    match error.recovery_suggestion() {
        Some(hint) => anyhow!("{}\n{}", error, hint),
        None => error.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use xword_core::{CellEntry, Coordinates, SaveState, Solution};

    fn config_in(temp_dir: &TempDir) -> PathBuf {
        let config = Config {
            data_dir: temp_dir.path().join("data"),
            ..Config::default()
        };
        let path = temp_dir.path().join("config.toml");
        config.save_to_path(&path).unwrap();
        path
    }

    #[test]
    fn test_storage_errors_carry_hint() {
        let denied = StorageError::from_io(
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            PathBuf::from("/games/g1.json"),
        );
        let message = with_hint(denied).to_string();
        assert!(message.contains("Permission denied"));
        assert!(message.contains("permissions for the xword data directory"));

        let other = StorageError::from_io(
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
            PathBuf::from("/games/g1.json"),
        );
        assert!(!with_hint(other).to_string().contains('\n'));
    }

    #[test]
    fn test_show_missing_game_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = config_in(&temp_dir);
        let output = Output::new(OutputFormat::Quiet);

        assert!(show("nope".into(), None, Some(&path), &output).is_err());
    }

    #[test]
    fn test_show_and_forget() {
        let temp_dir = TempDir::new().unwrap();
        let path = config_in(&temp_dir);
        let output = Output::new(OutputFormat::Quiet);

        let store = SnapshotStore::new(temp_dir.path().join("data"));
        let mut solution = Solution::empty(1, 2);
        solution.set(Coordinates::new(0, 1), CellEntry::new("u1", "B"));
        store
            .save(
                "g1",
                &SaveState {
                    solution,
                    last_read_chat: None,
                },
            )
            .unwrap();

        show("g1".into(), None, Some(&path), &output).unwrap();
        forget("g1".into(), Some(&path), &output).unwrap();
        assert!(!store.exists("g1"));

        // Forgetting twice is fine
        forget("g1".into(), Some(&path), &output).unwrap();
    }
}
