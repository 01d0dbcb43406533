/*!
Durable named-entity tables.

[`Registry<T>`] owns both an in-memory table and the TOML document backing
it. Loading fails soft (missing, empty or corrupt documents read as an empty
table); saving fails hard and every mutator persists before it returns, so an
acknowledged mutation is always on disk. A mutation whose save fails is
rolled back in memory and the error is returned to the caller.

Built on top of it:
- `webhooks.rs`  -> `WebhookRegistry`  (named webhook actions)
- `schedules.rs` -> `ScheduleRegistry` (recurring reboot/backup tasks)
*/

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error, info};

use crate::error::PersistenceError;

pub mod schedules;
pub mod webhooks;

pub use schedules::{ScheduleRegistry, ScheduledTask, TaskAction};
pub use webhooks::{WebhookAction, WebhookKind, WebhookRegistry};

/// Entity name/id -> entity.
pub type Table<T> = BTreeMap<String, T>;

/// A table mirrored one-to-one by a document on disk.
#[derive(Debug)]
pub struct Registry<T> {
    path: PathBuf,
    entries: Table<T>,
}

impl<T> Registry<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Open the registry at `path`, loading whatever is there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path);
        Self { path, entries }
    }

    /// Read a table from disk. Never fails: problems are logged and read as empty.
    pub fn load(path: &Path) -> Table<T> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(target: "telepwn::registry", path = %path.display(), "No registry file, starting fresh");
                return Table::new();
            }
            Err(e) => {
                error!(target: "telepwn::registry", path = %path.display(), error = %e, "Failed to read registry");
                return Table::new();
            }
        };
        if text.trim().is_empty() {
            info!(target: "telepwn::registry", path = %path.display(), "Registry file empty, starting fresh");
            return Table::new();
        }
        match toml::from_str::<Table<T>>(&text) {
            Ok(entries) => {
                info!(
                    target: "telepwn::registry",
                    path = %path.display(),
                    entries = entries.len(),
                    "Registry loaded"
                );
                entries
            }
            Err(e) => {
                error!(
                    target: "telepwn::registry",
                    path = %path.display(),
                    error = %e,
                    "Registry file is corrupt; treating as empty"
                );
                Table::new()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn entries(&self) -> &Table<T> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or overwrite `name`, then persist. Returns the previous value.
    pub fn insert(&mut self, name: &str, value: T) -> Result<Option<T>, PersistenceError> {
        let previous = self.entries.insert(name.to_string(), value);
        if let Err(e) = self.save() {
            match previous {
                Some(old) => self.entries.insert(name.to_string(), old),
                None => self.entries.remove(name),
            };
            return Err(e);
        }
        Ok(previous)
    }

    /// Remove `name`, then persist. `Ok(None)` if it was not present.
    pub fn remove(&mut self, name: &str) -> Result<Option<T>, PersistenceError> {
        let Some(removed) = self.entries.remove(name) else {
            return Ok(None);
        };
        if let Err(e) = self.save() {
            self.entries.insert(name.to_string(), removed);
            return Err(e);
        }
        Ok(Some(removed))
    }

    /// Rewrite the whole document from the in-memory table.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let text = toml::to_string(&self.entries).map_err(|source| PersistenceError::Serialize {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        std::fs::write(&self.path, text).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            target: "telepwn::registry",
            path = %self.path.display(),
            entries = self.entries.len(),
            "Registry saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        n: i64,
    }

    #[test]
    fn missing_and_empty_files_load_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.toml");
        assert!(Registry::<Entry>::open(&path).is_empty());
        std::fs::write(&path, "  \n").unwrap();
        assert!(Registry::<Entry>::open(&path).is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.toml");
        std::fs::write(&path, "[a\nn = ").unwrap();
        assert!(Registry::<Entry>::open(&path).is_empty());
    }

    #[test]
    fn mutations_are_persisted_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("t.toml");
        let mut reg = Registry::<Entry>::open(&path);
        reg.insert("a", Entry { n: 1 }).unwrap();
        reg.insert("b", Entry { n: 2 }).unwrap();
        assert_eq!(Registry::<Entry>::open(&path).len(), 2);

        assert_eq!(reg.remove("a").unwrap(), Some(Entry { n: 1 }));
        assert_eq!(reg.remove("zzz").unwrap(), None);
        let reopened = Registry::<Entry>::open(&path);
        assert_eq!(reopened.get("b"), Some(&Entry { n: 2 }));
        assert!(!reopened.contains("a"));
    }

    #[test]
    fn failed_save_rolls_back() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes every write fail.
        let path = dir.path().join("blocked");
        std::fs::create_dir(&path).unwrap();
        let mut reg = Registry::<Entry>::open(&path);
        assert!(reg.insert("a", Entry { n: 1 }).is_err());
        assert!(!reg.contains("a"));
    }
}
