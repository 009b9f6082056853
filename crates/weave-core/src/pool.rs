//! Per-slot key index of reusable render units.
//!
//! Each unit is indexed under both its exact and its close key. Claiming a
//! unit must remove it under both; a unit found under one key but missing
//! under the other is a pool consistency violation.

use indexmap::IndexSet;

use crate::collections::map::HashMap;
use crate::key::{UnitKey, UnitKeys};
use crate::unit::UnitId;

#[derive(Debug, Default)]
pub struct UnitPool {
    by_key: HashMap<UnitKey, IndexSet<UnitId>>,
}

impl UnitPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keys: &UnitKeys, unit: UnitId) {
        self.by_key
            .entry(keys.exact.clone())
            .or_default()
            .insert(unit);
        self.by_key
            .entry(keys.close.clone())
            .or_default()
            .insert(unit);
    }

    /// Drops `unit` from the entry for `key`; `false` when it was not there.
    pub fn remove_key(&mut self, key: &str, unit: UnitId) -> bool {
        let Some(units) = self.by_key.get_mut(key) else {
            return false;
        };
        let removed = units.shift_remove(&unit);
        if units.is_empty() {
            self.by_key.remove(key);
        }
        removed
    }

    /// Drops `unit` under both keys; `true` if either entry held it.
    pub fn remove(&mut self, keys: &UnitKeys, unit: UnitId) -> bool {
        let exact = self.remove_key(keys.exact.as_str(), unit);
        let close = self.remove_key(keys.close.as_str(), unit);
        exact || close
    }

    /// Oldest unit indexed under `key`.
    pub fn first(&self, key: &str) -> Option<UnitId> {
        self.by_key.get(key).and_then(|units| units.first().copied())
    }

    pub fn contains(&self, key: &str, unit: UnitId) -> bool {
        self.by_key
            .get(key)
            .is_some_and(|units| units.contains(&unit))
    }

    /// Every distinct unit in the pool.
    pub fn units(&self) -> IndexSet<UnitId> {
        self.by_key.values().flatten().copied().collect()
    }
}
