//! Bidirectional maps used by the graph lenses.
//!
//! Both directions live in one value so they can never drift apart; each map
//! exposes `check_invariants` which the lens builders run in debug builds.

use indexmap::IndexSet;
use rustc_hash::{FxBuildHasher, FxHashMap};
use std::fmt::Debug;
use std::hash::Hash;

/// A one-to-one map with an inverse view
#[derive(Debug, Clone)]
pub struct BidirectionalOneToOneMap<K, V> {
    forward: FxHashMap<K, V>,
    inverse: FxHashMap<V, K>,
}

impl<K, V> Default for BidirectionalOneToOneMap<K, V> {
    fn default() -> Self {
        Self {
            forward: FxHashMap::default(),
            inverse: FxHashMap::default(),
        }
    }
}

impl<K, V> BidirectionalOneToOneMap<K, V>
where
    K: Copy + Eq + Hash + Debug,
    V: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `key -> value`, evicting any pair that already used either side.
    /// Returns the value previously bound to `key`.
    pub fn force_put(&mut self, key: K, value: V) -> Option<V> {
        if let Some(old_key) = self.inverse.remove(&value) {
            self.forward.remove(&old_key);
        }
        let previous = self.forward.insert(key, value);
        if let Some(previous) = previous {
            self.inverse.remove(&previous);
        }
        self.inverse.insert(value, key);
        previous
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.forward.get(key).copied()
    }

    pub fn get_key(&self, value: &V) -> Option<K> {
        self.inverse.get(value).copied()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.forward.contains_key(key)
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.inverse.contains_key(value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.forward.remove(key)?;
        self.inverse.remove(&value);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.forward.iter().map(|(k, v)| (*k, *v))
    }

    /// Drop every `k -> k` pair
    pub fn remove_identity_mappings(&mut self)
    where
        K: PartialEq<V>,
    {
        let identities: Vec<K> = self
            .forward
            .iter()
            .filter(|(k, v)| *k == *v)
            .map(|(k, _)| *k)
            .collect();
        for key in identities {
            self.remove(&key);
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        if self.forward.len() != self.inverse.len() {
            return Err(format!(
                "one-to-one map has {} forward and {} inverse entries",
                self.forward.len(),
                self.inverse.len()
            ));
        }
        for (key, value) in &self.forward {
            if self.inverse.get(value) != Some(key) {
                return Err(format!("inverse of {value:?} is not {key:?}"));
            }
        }
        Ok(())
    }
}

/// A many-to-one map that remembers, for every value, the ordered set of keys
/// mapping to it and a representative key.
///
/// When no representative has been set explicitly the first key inserted for
/// the value wins. This is the tie-break the lenses use when several original
/// members collapse into one current member.
#[derive(Debug, Clone)]
pub struct BidirectionalManyToOneRepresentativeMap<K, V> {
    forward: FxHashMap<K, V>,
    inverse: FxHashMap<V, IndexSet<K, FxBuildHasher>>,
    representatives: FxHashMap<V, K>,
}

impl<K, V> Default for BidirectionalManyToOneRepresentativeMap<K, V> {
    fn default() -> Self {
        Self {
            forward: FxHashMap::default(),
            inverse: FxHashMap::default(),
            representatives: FxHashMap::default(),
        }
    }
}

impl<K, V> BidirectionalManyToOneRepresentativeMap<K, V>
where
    K: Copy + Eq + Hash + Debug,
    V: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key -> value`, detaching the key from its previous value first.
    pub fn put(&mut self, key: K, value: V) {
        if let Some(old) = self.forward.insert(key, value) {
            if old == value {
                return;
            }
            self.detach_key(key, old);
        }
        self.inverse.entry(value).or_default().insert(key);
    }

    fn detach_key(&mut self, key: K, value: V) {
        if let Some(keys) = self.inverse.get_mut(&value) {
            keys.shift_remove(&key);
            if keys.is_empty() {
                self.inverse.remove(&value);
            }
        }
        if self.representatives.get(&value) == Some(&key) {
            self.representatives.remove(&value);
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.forward.get(key).copied()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.forward.contains_key(key)
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.inverse.contains_key(value)
    }

    /// Keys mapping to `value`, in insertion order
    pub fn keys(&self, value: &V) -> impl Iterator<Item = K> + '_ {
        self.inverse
            .get(value)
            .into_iter()
            .flat_map(|keys| keys.iter().copied())
    }

    /// Keys mapping to `value` with the representative first
    pub fn keys_representative_first(&self, value: &V) -> Vec<K> {
        let Some(representative) = self.representative_key(value) else {
            return Vec::new();
        };
        let mut keys = vec![representative];
        keys.extend(self.keys(value).filter(|k| *k != representative));
        keys
    }

    pub fn representative_key(&self, value: &V) -> Option<K> {
        if let Some(representative) = self.representatives.get(value) {
            return Some(*representative);
        }
        self.inverse
            .get(value)
            .and_then(|keys| keys.first().copied())
    }

    /// Pin the representative of `value`. The key must already map to it.
    pub fn set_representative(&mut self, value: V, key: K) {
        debug_assert_eq!(
            self.forward.get(&key),
            Some(&value),
            "representative {key:?} does not map to {value:?}"
        );
        self.representatives.insert(value, key);
    }

    /// Re-point every key of `old` to `new`, keeping the representative.
    /// Keys already bound to `new` stay ahead of the moved ones.
    pub fn rename_value(&mut self, old: V, new: V) {
        if old == new {
            return;
        }
        let Some(keys) = self.inverse.remove(&old) else {
            return;
        };
        let representative = self.representatives.remove(&old);
        let target = self.inverse.entry(new).or_default();
        for key in keys {
            target.insert(key);
            self.forward.insert(key, new);
        }
        if let Some(representative) = representative {
            self.representatives.entry(new).or_insert(representative);
        }
    }

    pub fn remove_key(&mut self, key: &K) -> Option<V> {
        let value = self.forward.remove(key)?;
        self.detach_key(*key, value);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.forward.iter().map(|(k, v)| (*k, *v))
    }

    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        self.inverse.keys().copied()
    }

    /// Drop values whose only key is the value itself
    pub fn remove_identity_mappings(&mut self)
    where
        K: PartialEq<V>,
    {
        let identities: Vec<K> = self
            .inverse
            .iter()
            .filter(|(value, keys)| keys.len() == 1 && keys[0] == **value)
            .map(|(_, keys)| keys[0])
            .collect();
        for key in identities {
            self.remove_key(&key);
        }
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        for (key, value) in &self.forward {
            let bound = self
                .inverse
                .get(value)
                .is_some_and(|keys| keys.contains(key));
            if !bound {
                return Err(format!("{key:?} -> {value:?} missing from the inverse"));
            }
        }
        for (value, keys) in &self.inverse {
            if keys.is_empty() {
                return Err(format!("empty key set for {value:?}"));
            }
            for key in keys {
                if self.forward.get(key) != Some(value) {
                    return Err(format!("inverse lists {key:?} for {value:?}"));
                }
            }
        }
        for (value, representative) in &self.representatives {
            if self.forward.get(representative) != Some(value) {
                return Err(format!(
                    "representative {representative:?} does not map to {value:?}"
                ));
            }
        }
        Ok(())
    }
}
