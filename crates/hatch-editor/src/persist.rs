//! The persistence boundary.
//!
//! The engine never talks to a database. It hands a `ContainerRecord` to a
//! `ContainerStore` and later receives the outcome. Because the outcome may
//! arrive after further edits, or after the container was closed, each
//! request carries a `RequestTicket`; `PendingRequests` decides whether a
//! ticket is still current when its response comes back.

use crate::error::{EditorError, StoreError};
use hatch_core::{Container, ContainerId, ContainerToken};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ─── Records ─────────────────────────────────────────────────────────────

/// A container as the persistence service stores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub id: ContainerId,
    pub name: String,
    /// Serialized graph token, kept opaque by the store.
    pub json: String,
    /// Tokenized container property set.
    #[serde(default)]
    pub properties: Value,
}

impl ContainerRecord {
    pub fn from_container(container: &Container) -> Result<Self, EditorError> {
        let mut token = container.tokenize();
        let properties = std::mem::take(&mut token.properties);
        let json = token.to_json().map_err(|source| EditorError::Record {
            id: container.id.clone(),
            source,
        })?;
        Ok(Self {
            id: container.id.clone(),
            name: container.name.clone(),
            json,
            properties,
        })
    }

    /// Rebuild the container token, properties included.
    pub fn token(&self) -> Result<ContainerToken, EditorError> {
        let mut token = ContainerToken::from_json(&self.json).map_err(|source| EditorError::Record {
            id: self.id.clone(),
            source,
        })?;
        token.properties = self.properties.clone();
        Ok(token)
    }
}

/// CRUD collaborator for containers.
pub trait ContainerStore {
    /// Store `record`, returning the canonical id the store filed it under.
    fn save(&mut self, record: &ContainerRecord) -> Result<ContainerId, StoreError>;

    fn load(&self, id: &ContainerId) -> Result<ContainerRecord, StoreError>;

    fn delete(&mut self, id: &ContainerId) -> Result<(), StoreError>;
}

/// In-process store, for tests and offline sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: IndexMap<ContainerId, ContainerRecord>,
    /// When set, the next save fails with this message.
    reject_next: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `save` fail.
    pub fn reject_next_save(&mut self, reason: impl Into<String>) {
        self.reject_next = Some(reason.into());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ContainerId> {
        self.records.keys()
    }
}

impl ContainerStore for MemoryStore {
    fn save(&mut self, record: &ContainerRecord) -> Result<ContainerId, StoreError> {
        if let Some(reason) = self.reject_next.take() {
            return Err(StoreError::Rejected(reason));
        }
        self.records.insert(record.id.clone(), record.clone());
        Ok(record.id.clone())
    }

    fn load(&self, id: &ContainerId) -> Result<ContainerRecord, StoreError> {
        self.records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn delete(&mut self, id: &ContainerId) -> Result<(), StoreError> {
        self.records
            .shift_remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

// ─── Request correlation ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Save,
    Load,
}

/// Handle for one in-flight request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    pub request: RequestId,
    pub container: ContainerId,
    pub kind: RequestKind,
    generation: u64,
}

/// Open requests, per container.
///
/// Issuing a new request of the same kind for a container supersedes the
/// older one; invalidating a container supersedes all of its requests.
#[derive(Debug, Default)]
pub struct PendingRequests {
    next_request: u64,
    next_generation: u64,
    current: HashMap<(ContainerId, RequestKind), u64>,
    open: HashMap<RequestId, RequestTicket>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, container: &ContainerId, kind: RequestKind) -> RequestTicket {
        self.next_request += 1;
        self.next_generation += 1;
        let ticket = RequestTicket {
            request: RequestId(self.next_request),
            container: container.clone(),
            kind,
            generation: self.next_generation,
        };
        self.current
            .insert((container.clone(), kind), ticket.generation);
        self.open.insert(ticket.request, ticket.clone());
        ticket
    }

    /// Would a response for `ticket` still apply?
    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.open.get(&ticket.request) == Some(ticket)
            && self.current.get(&(ticket.container.clone(), ticket.kind)) == Some(&ticket.generation)
    }

    /// Close `ticket`. Returns whether its response should be applied.
    pub fn resolve(&mut self, ticket: &RequestTicket) -> bool {
        let current = self.is_current(ticket);
        self.open.remove(&ticket.request);
        if !current {
            log::debug!(
                "ignoring stale {:?} response for `{}` ({:?})",
                ticket.kind,
                ticket.container,
                ticket.request
            );
        }
        current
    }

    /// Drop every request for `container`, e.g. when it is closed.
    pub fn invalidate(&mut self, container: &ContainerId) {
        self.open.retain(|_, t| &t.container != container);
        self.current.retain(|(c, _), _| c != container);
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hatch_core::{EngineConfig, IdGenerator, Placement};
    use pretty_assertions::assert_eq;

    fn cid(s: &str) -> ContainerId {
        ContainerId::new(s)
    }

    #[test]
    fn record_round_trips_through_store() {
        let mut container = Container::new(cid("main"), "Main", IdGenerator::new(), EngineConfig::default());
        container
            .canvas_mut()
            .add_comment("saved", Placement::default())
            .unwrap();

        let record = ContainerRecord::from_container(&container).unwrap();
        let mut store = MemoryStore::new();
        assert_eq!(store.save(&record).unwrap(), cid("main"));

        let loaded = store.load(&cid("main")).unwrap();
        assert_eq!(loaded.token().unwrap().items.len(), 1);
    }

    #[test]
    fn missing_record_is_not_found() {
        let store = MemoryStore::new();
        assert_eq!(
            store.load(&cid("nope")),
            Err(StoreError::NotFound(cid("nope")))
        );
    }

    #[test]
    fn reissue_supersedes_older_ticket() {
        let mut pending = PendingRequests::new();
        let first = pending.issue(&cid("a"), RequestKind::Save);
        let second = pending.issue(&cid("a"), RequestKind::Save);
        assert!(!pending.resolve(&first));
        assert!(pending.resolve(&second));
        assert!(pending.is_empty());
    }

    #[test]
    fn kinds_do_not_supersede_each_other() {
        let mut pending = PendingRequests::new();
        let save = pending.issue(&cid("a"), RequestKind::Save);
        let load = pending.issue(&cid("a"), RequestKind::Load);
        assert!(pending.is_current(&save));
        assert!(pending.is_current(&load));
    }

    #[test]
    fn invalidate_drops_container_tickets() {
        let mut pending = PendingRequests::new();
        let a = pending.issue(&cid("a"), RequestKind::Save);
        let b = pending.issue(&cid("b"), RequestKind::Save);
        pending.invalidate(&cid("a"));
        assert!(!pending.resolve(&a));
        assert!(pending.resolve(&b));
    }
}
