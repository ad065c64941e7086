//! Atomic JSON file primitive
//!
//! All persisted state uses write-temp-then-rename so a crash mid-write can
//! never leave a half-written file behind.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::errors::StoreError;

/// Handle to one JSON file inside the data directory
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(data_dir: &Path, file_name: &str) -> Self {
        Self {
            path: data_dir.join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the file, falling back to `T::default()` when it does not exist
    ///
    /// A file that exists but cannot be parsed is moved aside to
    /// `<name>.corrupt` and reported as [`StoreError::Corrupt`]; the caller
    /// decides whether to continue on defaults.
    pub fn load_or_default<T>(&self) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default,
    {
        if !self.path.exists() {
            return Ok(T::default());
        }

        let raw = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                let backup = self.path.with_extension("json.corrupt");
                warn!(
                    "Corrupt store file {}, moving aside to {}: {}",
                    self.path.display(),
                    backup.display(),
                    e
                );
                if let Err(rename_err) = fs::rename(&self.path, &backup) {
                    warn!(
                        "Could not move corrupt file {}: {}",
                        self.path.display(),
                        rename_err
                    );
                }
                Err(StoreError::Corrupt {
                    path: self.path.display().to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Persist `value` atomically
    pub fn save<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let serialized = serde_json::to_string_pretty(value)?;
        let tmp = self.path.with_extension("json.tmp");

        fs::write(&tmp, serialized).map_err(|source| StoreError::Io {
            path: tmp.display().to_string(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path(), "test.json");

        let mut value: HashMap<String, u32> = HashMap::new();
        value.insert("alpha".to_string(), 7);
        file.save(&value).unwrap();

        let loaded: HashMap<String, u32> = file.load_or_default().unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path(), "absent.json");
        let loaded: HashMap<String, u32> = file.load_or_default().unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let file = JsonFile::new(dir.path(), "bad.json");
        std::fs::write(file.path(), "{not json").unwrap();

        let result: Result<HashMap<String, u32>, _> = file.load_or_default();
        assert!(matches!(result, Err(StoreError::Corrupt { .. })));
        assert!(!file.path().exists());
        assert!(dir.path().join("bad.json.corrupt").exists());
    }
}
