use std::collections::HashMap;

use parking_lot::RwLock;

use crate::types::{ItemId, UploadItem};

/// Authoritative map of all upload items - the single source of truth
/// for every derived value
///
/// Items are always mutated by whole-item read-modify-write under the
/// lock, never through field references shared across pipelines, so a
/// progress callback racing a `remove` cannot produce a lost update.
pub struct ItemStore {
    items: RwLock<HashMap<ItemId, UploadItem>>,
}

impl ItemStore {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a new item
    pub fn insert(&self, item: UploadItem) {
        self.items.write().insert(item.id.clone(), item);
    }

    /// Get a clone of an item
    pub fn get(&self, id: &ItemId) -> Option<UploadItem> {
        self.items.read().get(id).cloned()
    }

    /// Apply a mutation to the item keyed by `id`
    ///
    /// Returns false without calling `f` when the id is no longer
    /// present - a pipeline updating an item removed mid-flight is a
    /// silent no-op, not an error.
    pub fn update(&self, id: &ItemId, f: impl FnOnce(&mut UploadItem)) -> bool {
        let mut items = self.items.write();
        match items.get_mut(id) {
            Some(item) => {
                f(item);
                true
            }
            None => false,
        }
    }

    /// Remove an item; returns whether it existed
    pub fn remove(&self, id: &ItemId) -> bool {
        self.items.write().remove(id).is_some()
    }

    /// Drop every item
    pub fn clear(&self) {
        self.items.write().clear();
    }

    /// Snapshot of all items, in no particular order
    pub fn snapshot(&self) -> Vec<UploadItem> {
        self.items.read().values().cloned().collect()
    }

    /// Number of items in the store
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Check whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}
