//! Bookkeeping of known actors keyed by client id
//!
//! Both peers keep one of these: the server stores a connection record per
//! peer and the client stores one remote actor per other player. Records
//! come and go with join and part events, and ids are handed out by the
//! transport, so an id can return after its previous owner left.

use crate::error::RegistryError;
use crate::ClientId;
use std::collections::HashMap;

/// Registry of per-client records
///
/// Lookups always go to the map; nothing is cached across a removal, so a
/// freed id can be registered again immediately.
#[derive(Debug)]
pub struct ClientRegistry<R> {
    /// Records indexed by the id the transport assigned
    clients: HashMap<ClientId, R>,
}

impl<R> ClientRegistry<R> {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Registers a record under a new id
    ///
    /// Returns a mutable reference to the stored record so the caller can
    /// finish initializing it. Fails if the id is currently present; the
    /// existing record is left untouched in that case.
    pub fn new_client(&mut self, id: ClientId, record: R) -> Result<&mut R, RegistryError> {
        use std::collections::hash_map::Entry;

        match self.clients.entry(id) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateClient(id)),
            Entry::Vacant(slot) => Ok(slot.insert(record)),
        }
    }

    /// Removes a record, returning it if it was present
    pub fn free_client(&mut self, id: ClientId) -> Option<R> {
        self.clients.remove(&id)
    }

    pub fn find_by_id(&self, id: ClientId) -> Option<&R> {
        self.clients.get(&id)
    }

    pub fn find_by_id_mut(&mut self, id: ClientId) -> Option<&mut R> {
        self.clients.get_mut(&id)
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.contains_key(&id)
    }

    /// Snapshot of the ids currently present, in no particular order
    ///
    /// Returned as an owned list so callers can mutate the registry while
    /// walking it.
    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &R)> {
        self.clients.iter().map(|(id, record)| (*id, record))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ClientId, &mut R)> {
        self.clients.iter_mut().map(|(id, record)| (*id, record))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl<R> Default for ClientRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}
