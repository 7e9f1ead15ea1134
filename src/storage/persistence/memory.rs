//! In-process backend

use super::{PersistenceBackend, PersistenceError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Keeps every key in memory. Nothing survives a restart.
///
/// Can be switched into a failing mode to exercise error paths.
#[derive(Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<String, Vec<u8>>>,
    mutations: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent mutation fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful write/append calls
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), PersistenceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("backend set to fail".to_string()));
        }
        Ok(())
    }
}

impl PersistenceBackend for MemoryBackend {
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        self.check_available()?;
        self.data.write().insert(key.to_string(), data.to_vec());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn append(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError> {
        self.check_available()?;
        self.data
            .write()
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(data);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn list_keys(&self) -> Result<Vec<String>, PersistenceError> {
        Ok(self.data.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_mode() {
        let backend = MemoryBackend::new();
        backend.write("k", b"v").unwrap();

        backend.set_failing(true);
        assert!(backend.append("k", b"w").is_err());
        assert_eq!(backend.read("k").unwrap().unwrap(), b"v");
        assert_eq!(backend.mutation_count(), 1);
    }
}
