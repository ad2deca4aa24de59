//! Session registry mapping connection identifiers to open handles.
//!
//! The registry is a single map behind a read/write lock. Each operation takes
//! the lock exactly once for one map operation, so callers observe a
//! linearizable history: an identifier is either bound or not, and a `remove`
//! that succeeds is the only one that will ever succeed for that identifier.
//! The lock is never held while a handle does I/O.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;
use uuid::Uuid;

use sqlbridge_protocol::{CommandError, ConnectionId};

/// Errors raised by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No session is bound to the identifier.
    #[error("connection '{id}' not found")]
    NotFound {
        /// Identifier that was looked up.
        id: ConnectionId,
    },
    /// A session is already bound to the identifier.
    #[error("connection '{id}' already exists")]
    Duplicate {
        /// Identifier that was being inserted.
        id: ConnectionId,
    },
}

impl From<RegistryError> for CommandError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound { id } => Self::connection_not_found(&id),
            RegistryError::Duplicate { id } => Self::duplicate_connection(&id),
        }
    }
}

/// Map from [`ConnectionId`] to a shared handle.
pub struct SessionRegistry<H: ?Sized> {
    sessions: RwLock<HashMap<ConnectionId, Arc<H>>>,
}

impl<H: ?Sized> Default for SessionRegistry<H> {
    fn default() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl<H: ?Sized> SessionRegistry<H> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a fresh random identifier without binding it.
    #[must_use]
    pub fn create(&self) -> ConnectionId {
        ConnectionId::new(Uuid::new_v4().to_string())
    }

    /// Binds `handle` to `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if `id` is already bound; the
    /// existing session is left untouched.
    pub fn insert(&self, id: ConnectionId, handle: Arc<H>) -> Result<(), RegistryError> {
        match self.write().entry(id) {
            Entry::Occupied(entry) => Err(RegistryError::Duplicate {
                id: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(handle);
                Ok(())
            }
        }
    }

    /// Returns the handle bound to `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when `id` is unbound.
    pub fn lookup(&self, id: &ConnectionId) -> Result<Arc<H>, RegistryError> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound { id: id.clone() })
    }

    /// Unbinds `id` and hands back its handle.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] when `id` is unbound, including when
    /// a concurrent `remove` won the race.
    pub fn remove(&self, id: &ConnectionId) -> Result<Arc<H>, RegistryError> {
        self.write()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound { id: id.clone() })
    }

    /// Number of bound sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no session is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Unbinds every session at once.
    #[must_use]
    pub fn drain(&self) -> Vec<(ConnectionId, Arc<H>)> {
        self.write().drain().collect()
    }

    // A panic cannot leave the map half-updated because every critical section
    // is a single map call, so poisoned guards are safe to reuse.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Arc<H>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Arc<H>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}
