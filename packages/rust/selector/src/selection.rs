//! Selection store for entity pickers.
//!
//! Holds the set of entities chosen for a pending bulk action. Pure
//! state transitions, no failure modes: order is stable, duplicates
//! are impossible, and single mode never holds more than one entity.

use std::collections::BTreeMap;

use crmrelay_shared::{EntityId, EntityRef, SelectionMode};

/// The current set of chosen entities, in selection order.
#[derive(Debug, Clone)]
pub struct Selection {
    mode: SelectionMode,
    entities: Vec<EntityRef>,
    /// Stable ordering key per id. Kept across a toggle-off so that
    /// re-toggling an entity restores it to its original position
    /// instead of appending it at the end.
    order: BTreeMap<EntityId, u64>,
    next_key: u64,
}

impl Selection {
    /// Create an empty selection in the given mode.
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            entities: Vec::new(),
            order: BTreeMap::new(),
            next_key: 0,
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Toggle an entity.
    ///
    /// Single mode replaces the whole selection with this entity,
    /// whether or not it was already selected. Multiple mode adds the
    /// entity if absent and removes it if present; toggling the same id
    /// twice restores the selection's exact contents and order.
    pub fn toggle(&mut self, entity: EntityRef) {
        match self.mode {
            SelectionMode::Single => {
                self.entities = vec![entity];
            }
            SelectionMode::Multiple => {
                if let Some(pos) = self.entities.iter().position(|e| e.id == entity.id) {
                    // The ordering key stays behind for a re-toggle.
                    self.entities.remove(pos);
                } else {
                    self.insert_ordered(entity);
                }
            }
        }
    }

    /// Remove an entity by id, if present.
    pub fn remove(&mut self, id: &EntityId) {
        self.entities.retain(|e| &e.id != id);
    }

    /// Clear the selection (selector closed or submit succeeded).
    pub fn clear(&mut self) {
        self.entities.clear();
        self.order.clear();
        self.next_key = 0;
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.iter().any(|e| &e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Selected entities in selection order.
    pub fn entities(&self) -> &[EntityRef] {
        &self.entities
    }

    /// Selected ids in selection order.
    pub fn ids(&self) -> Vec<EntityId> {
        self.entities.iter().map(|e| e.id.clone()).collect()
    }

    /// Insert at the position given by the entity's ordering key,
    /// reusing the key from an earlier toggle when one exists.
    fn insert_ordered(&mut self, entity: EntityRef) {
        let key = match self.order.get(&entity.id) {
            Some(key) => *key,
            None => {
                let key = self.next_key;
                self.next_key += 1;
                self.order.insert(entity.id.clone(), key);
                key
            }
        };
        let pos = self
            .entities
            .iter()
            .position(|e| self.order.get(&e.id).is_some_and(|k| *k > key))
            .unwrap_or(self.entities.len());
        self.entities.insert(pos, entity);
    }
}
