use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Authoritative-side "last known applied state" table for one feature.
///
/// Written on every successful apply, read only to replay state to newly
/// connected clients. Conflict resolution never consults this — the
/// engine is always asked for ground truth instead. Values are cloned in
/// and out so cached state never aliases a mutable message object.
pub struct StateCache<K, V> {
    entries: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Default for StateCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone, V: Clone> StateCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite-on-write; the previous state for the key is discarded.
    pub fn store(&self, key: K, state: V) {
        self.lock().insert(key, state);
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.lock().get(key).cloned()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.lock()
            .iter()
            .map(|(key, state)| (key.clone(), state.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
