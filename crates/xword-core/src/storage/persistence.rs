//! Game snapshot persistence
//!
//! Saves the solution for a game (or, offline, a puzzle) so a cold start can
//! show progress before any network activity. Uses atomic writes (write to
//! temp file, then rename) to prevent corruption.
//!
//! Files live under `<data_dir>/games/<id>.json`:
//!
//! ```text
//! {"solution": [[{"authorId": "u1", "value": "A"}, null]], "lastReadChat": 1700000000000}
//! ```
//!
//! Older files hold only the bare solution matrix; those still load.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::error::{StorageError, StorageResult};
use crate::config::Config;
use crate::grid::Solution;

/// Everything persisted for one game or puzzle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveState {
    pub solution: Solution,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_chat: Option<i64>,
}

/// Directory of per-game snapshot files
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Snapshots stored in `<data_dir>/games`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: data_dir.as_ref().join("games"),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.data_dir)
    }

    /// Path of the snapshot for `id`
    pub fn path_for(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).exists()
    }

    /// Write the snapshot for `id` atomically
    pub fn save(&self, id: &str, state: &SaveState) -> StorageResult<()> {
        let path = self.path_for(id);
        let bytes = serde_json::to_vec(state).map_err(|source| StorageError::Encode {
            path: path.clone(),
            source,
        })?;
        atomic_write(&path, &bytes)?;
        debug!("Saved snapshot {:?}", path);
        Ok(())
    }

    /// Read the snapshot for `id`
    ///
    /// Tries the save-state shape first, then a bare solution matrix.
    /// Anything else is treated as absent.
    pub fn load(&self, id: &str) -> StorageResult<Option<SaveState>> {
        let path = self.path_for(id);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::ReadError { path, source }),
        };

        let decoded = serde_json::from_slice::<Value>(&bytes).and_then(|value| {
            if value.is_object() {
                serde_json::from_value::<SaveState>(value)
            } else {
                debug!("Loading legacy snapshot format from {:?}", path);
                serde_json::from_value::<Solution>(value).map(|solution| SaveState {
                    solution,
                    last_read_chat: None,
                })
            }
        });

        match decoded {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!("Ignoring unreadable snapshot {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    /// Remove the snapshot for `id` if present
    pub fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.path_for(id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io(e, path)),
        }
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file =
        File::create(&temp_path).map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.write_all(data)
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    file.sync_all()
        .map_err(|e| StorageError::from_io(e, temp_path.clone()))?;

    fs::rename(&temp_path, path).map_err(|source| StorageError::AtomicWriteFailed {
        from: temp_path.clone(),
        to: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellEntry;
    use crate::models::Coordinates;
    use tempfile::TempDir;

    fn sample_solution() -> Solution {
        let mut solution = Solution::empty(2, 2);
        solution.set(Coordinates::new(0, 0), CellEntry::new("u1", "A"));
        solution
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path());

        let state = SaveState {
            solution: sample_solution(),
            last_read_chat: Some(99),
        };
        store.save("g1", &state).unwrap();

        assert!(store.exists("g1"));
        assert_eq!(store.load("g1").unwrap(), Some(state));
        assert!(!store.path_for("g1").with_extension("tmp").exists());
    }

    #[test]
    fn test_load_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path());
        assert_eq!(store.load("nope").unwrap(), None);
    }

    #[test]
    fn test_load_legacy_bare_matrix() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path());

        let path = store.path_for("p1");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, serde_json::to_vec(&sample_solution()).unwrap()).unwrap();

        let loaded = store.load("p1").unwrap().unwrap();
        assert_eq!(loaded.solution, sample_solution());
        assert_eq!(loaded.last_read_chat, None);
    }

    #[test]
    fn test_load_garbage_is_absent() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path());

        let path = store.path_for("g1");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{not json").unwrap();

        assert_eq!(store.load("g1").unwrap(), None);
    }

    #[test]
    fn test_ids_are_sanitized() {
        let store = SnapshotStore::new("/data");
        let path = store.path_for("../etc/passwd");
        assert_eq!(path, PathBuf::from("/data/games/___etc_passwd.json"));
    }

    #[test]
    fn test_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(temp_dir.path());
        store.save("g1", &SaveState::default()).unwrap();
        store.delete("g1").unwrap();
        assert!(!store.exists("g1"));
        store.delete("g1").unwrap();
    }
}
