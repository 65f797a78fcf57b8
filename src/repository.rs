use std::collections::HashMap;

use crate::types::Entity;

/// In-memory mirror of one entity kind's remote state
///
/// Keyed primarily by the console-assigned id, with a secondary name index
/// for display-name lookups (last writer wins on name collisions). The
/// repository is a mirror of remote truth: it is populated by the initial
/// bulk fetch, kept current by the change stream, and cleared only at
/// session teardown.
#[derive(Debug)]
pub struct Repository<T: Entity> {
    by_id: HashMap<String, T>,
    name_index: HashMap<String, String>,
}

impl<T: Entity> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Repository<T> {
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            name_index: HashMap::new(),
        }
    }

    /// Upsert by id, replacing the stored entity wholesale.
    ///
    /// Reindexes the name lookup; a rename drops the stale index entry so
    /// the old name stops resolving.
    pub fn add(&mut self, entity: T) {
        if let Some(previous) = self.by_id.get(entity.id()) {
            if previous.name() != entity.name() {
                self.name_index.remove(previous.name());
            }
        }
        self.name_index
            .insert(entity.name().to_string(), entity.id().to_string());
        self.by_id.insert(entity.id().to_string(), entity);
    }

    /// Look up by id, falling back to the name index
    pub fn get_single(&self, key: &str) -> Option<&T> {
        self.by_id.get(key).or_else(|| {
            let id = self.name_index.get(key)?;
            self.by_id.get(id)
        })
    }

    /// Snapshot of all entities, in no meaningful order
    pub fn get_all(&self) -> Vec<T> {
        self.by_id.values().cloned().collect()
    }

    /// All known ids
    pub fn get_ids(&self) -> Vec<String> {
        self.by_id.keys().cloned().collect()
    }

    /// Remove by primary id only. Returns whether an entity was removed;
    /// removing an absent id is a no-op.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.by_id.remove(id) {
            Some(entity) => {
                if self.name_index.get(entity.name()).map(String::as_str) == Some(id) {
                    self.name_index.remove(entity.name());
                }
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.name_index.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
