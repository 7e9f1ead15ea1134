//! Durable key/blob persistence shared by the alert ledger and the
//! connection registry.

pub mod file;
pub mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use std::path::Path;

/// Trait for persistence backends
pub trait PersistenceBackend: Send + Sync {
    /// Replace the data stored under a key
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError>;

    /// Append data to a key, creating it if needed
    fn append(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError>;

    /// Read data from persistence
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// List all keys
    fn list_keys(&self) -> Result<Vec<String>, PersistenceError>;
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Base directory for persistence files
    pub data_dir: std::path::PathBuf,
    /// fsync after every write or append
    pub sync_writes: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: std::path::PathBuf::from("./vitalwatch_data"),
            sync_writes: true,
        }
    }
}

impl PersistenceConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_sync_writes(mut self, enabled: bool) -> Self {
        self.sync_writes = enabled;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Storage task failed: {0}")]
    Task(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
