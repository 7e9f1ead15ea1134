//! File-per-key backend

use super::{PersistenceBackend, PersistenceConfig, PersistenceError};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Stores each key as a file under the data directory.
///
/// `write` goes through a temp file and rename so a crash never leaves a
/// half-written value behind. `append` is serialized by a lock so
/// concurrent appends never interleave.
pub struct FileBackend {
    config: PersistenceConfig,
    append_lock: Mutex<()>,
}

impl FileBackend {
    /// Create a new file backend, creating the data directory if needed
    pub fn new(config: PersistenceConfig) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            config,
            append_lock: Mutex::new(()),
        })
    }

    /// Get the file path for a key
    fn key_path(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        if key.is_empty()
            || key.starts_with('.')
            || key.contains('/')
            || key.contains('\\')
        {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.config.data_dir.join(key))
    }
}

impl PersistenceBackend for FileBackend {
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        let path = self.key_path(key)?;
        let tmp_path = self.config.data_dir.join(format!(".{}.tmp", key));

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;

            file.write_all(data)?;
            if self.config.sync_writes {
                file.sync_all()?;
            }
        }

        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn append(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        let path = self.key_path(key)?;
        let _guard = self.append_lock.lock();

        let mut file = OpenOptions::new().append(true).create(true).open(path)?;

        file.write_all(data)?;
        if self.config.sync_writes {
            file.sync_data()?;
        }

        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.key_path(key)?;

        if !path.exists() {
            return Ok(None);
        }

        let data = std::fs::read(path)?;
        Ok(Some(data))
    }

    fn list_keys(&self) -> Result<Vec<String>, PersistenceError> {
        let mut keys = Vec::new();

        for entry in std::fs::read_dir(&self.config.data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    keys.push(name.to_string());
                }
            }
        }

        Ok(keys)
    }
}
