//! Translation table from temporary ids to in-flight create operations.
//!
//! The reconciler consults this table before falling back to the
//! parent+title heuristic, and the confirmation path uses it to learn
//! whether a push event already resolved the placeholder.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    List,
    Card,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCreate {
    pub temp_id: String,
    pub kind: EntityKind,
    /// Board id for lists, list id for cards.
    pub parent_id: String,
    pub title: String,
    /// Real id once a push event replaced the placeholder.
    pub resolved_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct PendingTable {
    creates: HashMap<String, PendingCreate>,
    /// Registration order, oldest first, so title matches prefer the
    /// earliest placeholder.
    order: Vec<String>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pending: PendingCreate) {
        self.order.push(pending.temp_id.clone());
        self.creates.insert(pending.temp_id.clone(), pending);
    }

    pub fn get(&self, temp_id: &str) -> Option<&PendingCreate> {
        self.creates.get(temp_id)
    }

    /// Remove and return the entry once its REST call settled.
    pub fn take(&mut self, temp_id: &str) -> Option<PendingCreate> {
        self.order.retain(|id| id != temp_id);
        self.creates.remove(temp_id)
    }

    /// Record that a push event replaced the placeholder with `real_id`.
    pub fn resolve(&mut self, temp_id: &str, real_id: &str) -> bool {
        match self.creates.get_mut(temp_id) {
            Some(entry) => {
                entry.resolved_id = Some(real_id.to_string());
                true
            }
            None => false,
        }
    }

    /// Unresolved entry for a `clientRef` echoed by the server.
    pub fn match_client_ref(&self, kind: EntityKind, client_ref: &str) -> Option<&PendingCreate> {
        self.creates
            .get(client_ref)
            .filter(|entry| entry.kind == kind && entry.resolved_id.is_none())
    }

    /// Oldest unresolved entry with the same parent and title.
    pub fn match_title(&self, kind: EntityKind, parent_id: &str, title: &str) -> Option<&PendingCreate> {
        self.order
            .iter()
            .filter_map(|id| self.creates.get(id))
            .find(|entry| {
                entry.kind == kind
                    && entry.resolved_id.is_none()
                    && entry.parent_id == parent_id
                    && entry.title == title
            })
    }

    /// Drop every entry; used when a hydrate discards all placeholders.
    pub fn clear(&mut self) -> usize {
        let dropped = self.creates.len();
        self.creates.clear();
        self.order.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.creates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
    }
}
