//! LRU cache for entities-with-components query results.
//!
//! Keys are the sorted component-id list of a query; a reverse index per
//! column keeps invalidation proportional to the keys that actually touch
//! the mutated column.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stormstack_core::{ComponentId, EntityId};

struct Slot {
    result: Arc<Vec<EntityId>>,
    last_used: u64,
}

pub(crate) struct QueryCache {
    capacity: usize,
    slots: HashMap<Vec<ComponentId>, Slot>,
    by_column: HashMap<ComponentId, HashSet<Vec<ComponentId>>>,
    clock: u64,
}

impl QueryCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: HashMap::new(),
            by_column: HashMap::new(),
            clock: 0,
        }
    }

    pub(crate) fn get(&mut self, key: &[ComponentId]) -> Option<Arc<Vec<EntityId>>> {
        self.clock += 1;
        let slot = self.slots.get_mut(key)?;
        slot.last_used = self.clock;
        Some(Arc::clone(&slot.result))
    }

    pub(crate) fn insert(&mut self, key: Vec<ComponentId>, result: Arc<Vec<EntityId>>) {
        self.clock += 1;
        if self.slots.len() >= self.capacity && !self.slots.contains_key(&key) {
            self.evict_lru();
        }
        for column in &key {
            self.by_column.entry(*column).or_default().insert(key.clone());
        }
        self.slots.insert(
            key,
            Slot {
                result,
                last_used: self.clock,
            },
        );
    }

    pub(crate) fn invalidate_column(&mut self, column: ComponentId) {
        let Some(keys) = self.by_column.remove(&column) else {
            return;
        };
        for key in keys {
            if self.slots.remove(&key).is_some() {
                for other in &key {
                    if *other != column {
                        if let Some(set) = self.by_column.get_mut(other) {
                            set.remove(&key);
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    fn evict_lru(&mut self) {
        let victim = self
            .slots
            .iter()
            .min_by_key(|(_, slot)| slot.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            self.slots.remove(&key);
            for column in &key {
                if let Some(set) = self.by_column.get_mut(column) {
                    set.remove(&key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ids: &[u64]) -> Vec<ComponentId> {
        ids.iter().map(|&id| ComponentId(id)).collect()
    }

    fn result(ids: &[u64]) -> Arc<Vec<EntityId>> {
        Arc::new(ids.iter().map(|&id| EntityId(id)).collect())
    }

    #[test]
    fn hit_after_insert() {
        let mut cache = QueryCache::new(8);
        cache.insert(key(&[1, 2]), result(&[10, 11]));
        let hit = cache.get(&key(&[1, 2])).expect("hit");
        assert_eq!(*hit, vec![EntityId(10), EntityId(11)]);
        assert!(cache.get(&key(&[1, 3])).is_none());
    }

    #[test]
    fn invalidation_only_touches_listed_columns() {
        let mut cache = QueryCache::new(8);
        cache.insert(key(&[1, 2]), result(&[10]));
        cache.insert(key(&[3]), result(&[20]));

        cache.invalidate_column(ComponentId(2));
        assert!(cache.get(&key(&[1, 2])).is_none());
        assert!(cache.get(&key(&[3])).is_some());
    }

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let mut cache = QueryCache::new(2);
        cache.insert(key(&[1]), result(&[1]));
        cache.insert(key(&[2]), result(&[2]));

        // Touch [1] so [2] becomes the LRU victim.
        cache.get(&key(&[1]));
        cache.insert(key(&[3]), result(&[3]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(&[1])).is_some());
        assert!(cache.get(&key(&[2])).is_none());
        assert!(cache.get(&key(&[3])).is_some());
    }
}
