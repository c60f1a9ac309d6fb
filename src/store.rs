use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

pub const CARDS_KEY: &str = "cpp_cards";
pub const PAYMENTS_KEY: &str = "cpp_payments";
pub const LOCK_KEY: &str = "cpp_ics_lock";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reading '{key}'")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("writing '{key}'")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Whole-document key/value persistence. Values are opaque strings.
pub trait Store {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// One file per key inside a directory.
#[derive(Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_owned(),
        }
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }
}

impl Store for DirectoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{:?} missing", path);
                Ok(None)
            }
            Err(source) => Err(StoreError::Read {
                key: key.to_owned(),
                source,
            }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let write = |source| StoreError::Write {
            key: key.to_owned(),
            source,
        };
        std::fs::create_dir_all(&self.root).map_err(write)?;
        std::fs::write(self.path(key), value).map_err(write)
    }
}

#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_store_missing_key() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = DirectoryStore::new(dir.path());
        assert_eq!(store.get(CARDS_KEY)?, None);

        Ok(())
    }

    #[test]
    fn test_directory_store_set_then_get() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut store = DirectoryStore::new(&dir.path().join("nested"));
        store.set(LOCK_KEY, "1")?;
        assert_eq!(store.get(LOCK_KEY)?, Some("1".to_owned()));
        assert!(dir.path().join("nested").join("cpp_ics_lock.json").exists());

        Ok(())
    }

    #[test]
    fn test_memory_store() -> anyhow::Result<()> {
        let mut store = MemoryStore::default();
        assert_eq!(store.get(PAYMENTS_KEY)?, None);
        store.set(PAYMENTS_KEY, "[]")?;
        assert_eq!(store.get(PAYMENTS_KEY)?, Some("[]".to_owned()));

        Ok(())
    }
}
