pub mod ledger;
pub mod persistence;
pub mod registry;

pub use ledger::{AlertLedger, JsonlLedger, MemoryLedger};
pub use persistence::{
    FileBackend, MemoryBackend, PersistenceBackend, PersistenceConfig, PersistenceError,
};
pub use registry::{ConnectionRegistry, RegistryEntry};
