//! Shared in-memory entity collection.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chorus_core::{Entity, EntityKey};

#[derive(Debug)]
struct Inner<T> {
    items: Vec<T>,
    /// Bumped by every change.
    generation: u64,
}

/// A change applied under one write lock.
#[derive(Debug, Clone)]
pub struct AppliedChange<T> {
    /// Items right before the change.
    pub snapshot: Vec<T>,
    /// Index and prior value of the entity touched. For a push, the pushed
    /// entity.
    pub original: Option<(usize, T)>,
    /// Generation right after the change.
    pub generation: u64,
}

/// The locally displayed collection of `T`.
///
/// Cloning shares the same collection. Every change bumps the generation,
/// which lets a mutation tell whether anything else touched the collection
/// since it applied its own change.
#[derive(Debug)]
pub struct OptimisticCollection<T> {
    inner: Arc<RwLock<Inner<T>>>,
}

impl<T> Clone for OptimisticCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Entity> Default for OptimisticCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> OptimisticCollection<T> {
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                items,
                generation: 0,
            })),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<T>> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<T>> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current items, in order.
    pub fn snapshot(&self) -> Vec<T> {
        self.read().items.clone()
    }

    pub fn get(&self, key: &EntityKey) -> Option<T> {
        self.read().items.iter().find(|item| item.key() == key).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().items.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Append `item`. Returns the new generation.
    pub fn push(&self, item: T) -> u64 {
        let mut inner = self.write();
        inner.items.push(item);
        inner.generation += 1;
        inner.generation
    }

    /// Append `item`, returning the collection as it was before.
    pub fn push_tracked(&self, item: T) -> AppliedChange<T> {
        let mut inner = self.write();
        let snapshot = inner.items.clone();
        inner.items.push(item.clone());
        inner.generation += 1;
        AppliedChange {
            original: Some((snapshot.len(), item)),
            snapshot,
            generation: inner.generation,
        }
    }

    /// [`patch`](Self::patch), returning the collection as it was before.
    pub fn patch_tracked(&self, key: &EntityKey, patch: &T::Patch) -> AppliedChange<T> {
        let mut inner = self.write();
        let snapshot = inner.items.clone();
        let original = inner.items.iter().position(|item| item.key() == key).map(|index| {
            let previous = inner.items[index].clone();
            inner.items[index].apply_patch(patch);
            inner.generation += 1;
            (index, previous)
        });
        AppliedChange {
            snapshot,
            original,
            generation: inner.generation,
        }
    }

    /// [`remove_key`](Self::remove_key), returning the collection as it was before.
    pub fn remove_tracked(&self, key: &EntityKey) -> AppliedChange<T> {
        let mut inner = self.write();
        let snapshot = inner.items.clone();
        let original = inner.items.iter().position(|item| item.key() == key).map(|index| {
            let removed = inner.items.remove(index);
            inner.generation += 1;
            (index, removed)
        });
        AppliedChange {
            snapshot,
            original,
            generation: inner.generation,
        }
    }

    /// Replace the item with `key` by `item`. Returns false if none matched.
    pub fn replace_key(&self, key: &EntityKey, item: T) -> bool {
        let mut inner = self.write();
        match inner.items.iter().position(|existing| existing.key() == key) {
            Some(index) => {
                inner.items[index] = item;
                inner.generation += 1;
                true
            }
            None => false,
        }
    }

    /// Apply `patch` in place. Returns the index and the pre-patch entity.
    pub fn patch(&self, key: &EntityKey, patch: &T::Patch) -> Option<(usize, T)> {
        let mut inner = self.write();
        let index = inner.items.iter().position(|item| item.key() == key)?;
        let previous = inner.items[index].clone();
        inner.items[index].apply_patch(patch);
        inner.generation += 1;
        Some((index, previous))
    }

    /// Remove the item with `key`. Returns its index and value.
    pub fn remove_key(&self, key: &EntityKey) -> Option<(usize, T)> {
        let mut inner = self.write();
        let index = inner.items.iter().position(|item| item.key() == key)?;
        let removed = inner.items.remove(index);
        inner.generation += 1;
        Some((index, removed))
    }

    /// Insert at `index`, or at the end if the collection got shorter.
    pub fn insert_at(&self, index: usize, item: T) {
        let mut inner = self.write();
        let index = index.min(inner.items.len());
        inner.items.insert(index, item);
        inner.generation += 1;
    }

    /// Replace every item. Returns the new generation.
    pub fn replace_all(&self, items: Vec<T>) -> u64 {
        let mut inner = self.write();
        inner.items = items;
        inner.generation += 1;
        inner.generation
    }

    /// Replace every item, but only if the generation is still `expected`.
    ///
    /// Returns the new generation on success.
    pub fn replace_all_if(&self, expected: u64, items: Vec<T>) -> Option<u64> {
        let mut inner = self.write();
        if inner.generation != expected {
            return None;
        }
        inner.items = items;
        inner.generation += 1;
        Some(inner.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::{Client, ClientDraft, ClientPatch};

    fn client(id: &str, name: &str) -> Client {
        Client::tentative(EntityKey::remote(id), &ClientDraft::named(name))
    }

    #[test]
    fn test_generation_moves_on_every_change() {
        let collection = OptimisticCollection::new();
        assert_eq!(collection.generation(), 0);

        assert_eq!(collection.push(client("1", "Acme")), 1);
        let patch = ClientPatch {
            name: Some("Acme Corp".to_string()),
            ..Default::default()
        };
        let (index, previous) = collection.patch(&EntityKey::remote("1"), &patch).unwrap();
        assert_eq!(index, 0);
        assert_eq!(previous.name, "Acme");
        assert_eq!(collection.generation(), 2);
        assert_eq!(collection.get(&EntityKey::remote("1")).unwrap().name, "Acme Corp");
    }

    #[test]
    fn test_tracked_changes_record_their_own_generation() {
        let collection = OptimisticCollection::from_items(vec![client("1", "Acme")]);
        let other = collection.clone();
        let patch = ClientPatch {
            name: Some("Acme Corp".to_string()),
            ..Default::default()
        };

        let change = collection.patch_tracked(&EntityKey::remote("1"), &patch);
        other.push(client("2", "Beta"));

        assert_eq!(change.generation, 1);
        assert_eq!(change.snapshot, vec![client("1", "Acme")]);
        assert_eq!(change.original.as_ref().map(|(i, c)| (*i, c.name.as_str())), Some((0, "Acme")));
        // The push landed after the patch, so restoring the snapshot must fail.
        assert_eq!(collection.replace_all_if(change.generation, change.snapshot), None);
        assert!(collection.get(&EntityKey::remote("2")).is_some());
    }

    #[test]
    fn test_tracked_push_and_remove() {
        let collection = OptimisticCollection::from_items(vec![client("1", "A")]);
        let pushed = collection.push_tracked(client("2", "B"));
        assert_eq!(pushed.snapshot.len(), 1);
        assert_eq!(pushed.original.map(|(i, _)| i), Some(1));
        assert_eq!(pushed.generation, collection.generation());

        let removed = collection.remove_tracked(&EntityKey::remote("1"));
        assert_eq!(removed.snapshot.len(), 2);
        assert_eq!(removed.original.map(|(i, c)| (i, c.name)), Some((0, "A".to_string())));
        assert_eq!(removed.generation, 2);

        let missing = collection.remove_tracked(&EntityKey::remote("nope"));
        assert!(missing.original.is_none());
        assert_eq!(missing.generation, 2);
    }

    #[test]
    fn test_missing_keys_leave_generation_alone() {
        let collection = OptimisticCollection::from_items(vec![client("1", "Acme")]);
        let missing = EntityKey::remote("nope");
        assert!(collection.remove_key(&missing).is_none());
        assert!(!collection.replace_key(&missing, client("2", "B")));
        assert_eq!(collection.generation(), 0);
    }

    #[test]
    fn test_insert_at_clamps_index() {
        let collection = OptimisticCollection::from_items(vec![client("1", "A")]);
        collection.insert_at(10, client("2", "B"));
        collection.insert_at(0, client("0", "Z"));
        let names: Vec<_> = collection.snapshot().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Z", "A", "B"]);
    }

    #[test]
    fn test_replace_all_if_checks_generation() {
        let collection = OptimisticCollection::from_items(vec![client("1", "A")]);
        let clone = collection.clone();
        clone.push(client("2", "B"));

        assert_eq!(collection.replace_all_if(0, vec![]), None);
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.replace_all_if(1, vec![]), Some(2));
        assert!(clone.is_empty());
    }
}
