//! Registry of connected subscribers

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::persistence::{PersistenceBackend, PersistenceError};

/// Key holding the persisted connection set
pub const CONNECTIONS_KEY: &str = "connections.json";

/// One registration as seen in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub connection_id: String,
    /// Distinguishes successive registrations of the same id
    pub generation: u64,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, u64>,
    next_generation: u64,
}

#[derive(Serialize, Deserialize)]
struct PersistedConnections {
    connections: Vec<String>,
}

/// Set of active subscriber connections.
///
/// Mutations are serialized by `mutation` and persist before they become
/// visible, so a failed persist leaves the registry unchanged. Disk writes
/// happen outside `state`; readers only wait for the final swap. Reads
/// return copies, never live views.
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    mutation: Mutex<()>,
    backend: Option<Arc<dyn PersistenceBackend>>,
}

impl ConnectionRegistry {
    /// Registry with no durable store
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            mutation: Mutex::new(()),
            backend: None,
        }
    }

    /// Open a durable registry, reloading connections left by a previous run.
    ///
    /// Reloaded entries may belong to peers that are long gone; delivery
    /// failures prune them.
    pub fn open(backend: Arc<dyn PersistenceBackend>) -> Result<Self, PersistenceError> {
        let mut state = RegistryState::default();

        if let Some(data) = backend.read(CONNECTIONS_KEY)? {
            let persisted: PersistedConnections = serde_json::from_slice(&data)
                .map_err(|e| PersistenceError::Deserialization(e.to_string()))?;

            for id in persisted.connections {
                state.next_generation += 1;
                state.entries.insert(id, state.next_generation);
            }
        }

        if !state.entries.is_empty() {
            tracing::info!(
                connections = state.entries.len(),
                "Restored persisted connections"
            );
        }

        Ok(Self {
            state: RwLock::new(state),
            mutation: Mutex::new(()),
            backend: Some(backend),
        })
    }

    /// Register a connection. Re-adding an id starts a new generation.
    pub fn add(&self, connection_id: &str) -> Result<u64, PersistenceError> {
        let _mutation = self.mutation.lock();

        let (generation, entries) = {
            let state = self.state.read();
            let mut entries = state.entries.clone();
            let generation = state.next_generation + 1;
            entries.insert(connection_id.to_string(), generation);
            (generation, entries)
        };
        self.persist(&entries)?;

        let mut state = self.state.write();
        state.entries = entries;
        state.next_generation = generation;
        drop(state);

        tracing::debug!(connection_id, generation, "Connection registered");
        Ok(generation)
    }

    /// Remove a connection regardless of generation.
    ///
    /// Returns whether the connection was registered.
    pub fn remove(&self, connection_id: &str) -> Result<bool, PersistenceError> {
        let _mutation = self.mutation.lock();

        let entries = {
            let state = self.state.read();
            if !state.entries.contains_key(connection_id) {
                return Ok(false);
            }
            let mut entries = state.entries.clone();
            entries.remove(connection_id);
            entries
        };
        self.persist(&entries)?;
        self.state.write().entries = entries;

        tracing::debug!(connection_id, "Connection removed");
        Ok(true)
    }

    /// Remove a connection only if it still carries the given generation.
    ///
    /// A registration made after the caller's snapshot is left alone.
    pub fn prune(&self, connection_id: &str, generation: u64) -> Result<bool, PersistenceError> {
        let _mutation = self.mutation.lock();

        let entries = {
            let state = self.state.read();
            match state.entries.get(connection_id) {
                Some(current) if *current == generation => {}
                _ => return Ok(false),
            }
            let mut entries = state.entries.clone();
            entries.remove(connection_id);
            entries
        };
        self.persist(&entries)?;
        self.state.write().entries = entries;

        Ok(true)
    }

    /// [`add`](Self::add) for async callers; disk writes run on the blocking pool
    pub async fn add_async(self: &Arc<Self>, connection_id: &str) -> Result<u64, PersistenceError> {
        let id = connection_id.to_string();
        self.run_blocking(move |registry| registry.add(&id)).await
    }

    /// [`remove`](Self::remove) for async callers
    pub async fn remove_async(self: &Arc<Self>, connection_id: &str) -> Result<bool, PersistenceError> {
        let id = connection_id.to_string();
        self.run_blocking(move |registry| registry.remove(&id)).await
    }

    /// [`prune`](Self::prune) for async callers
    pub async fn prune_async(
        self: &Arc<Self>,
        connection_id: &str,
        generation: u64,
    ) -> Result<bool, PersistenceError> {
        let id = connection_id.to_string();
        self.run_blocking(move |registry| registry.prune(&id, generation))
            .await
    }

    async fn run_blocking<T, F>(self: &Arc<Self>, op: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&ConnectionRegistry) -> Result<T, PersistenceError> + Send + 'static,
    {
        // Nothing touches the disk without a backend.
        if self.backend.is_none() {
            return op(self);
        }

        let registry = Arc::clone(self);
        tokio::task::spawn_blocking(move || op(&registry))
            .await
            .map_err(|e| PersistenceError::Task(e.to_string()))?
    }

    /// Snapshot of registered connection ids
    pub fn list(&self) -> BTreeSet<String> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// Snapshot of registrations with their generations
    pub fn snapshot(&self) -> Vec<RegistryEntry> {
        self.state
            .read()
            .entries
            .iter()
            .map(|(id, generation)| RegistryEntry {
                connection_id: id.clone(),
                generation: *generation,
            })
            .collect()
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.state.read().entries.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    fn persist(&self, entries: &HashMap<String, u64>) -> Result<(), PersistenceError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let mut connections: Vec<String> = entries.keys().cloned().collect();
        connections.sort();

        let data = serde_json::to_vec(&PersistedConnections { connections })
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        backend.write(CONNECTIONS_KEY, &data)
    }
}
