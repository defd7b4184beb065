use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::application::watcher::Watcher;
use crate::domain::{OwnerScopeId, WatcherKey};

/// In-memory table of live watchers. Map mutations are atomic with
/// respect to concurrent lookups; watchers themselves serialize their own
/// work, so no lock is held across any await.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<Mutex<HashMap<WatcherKey, Arc<Watcher>>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing watcher or inserts the one produced by
    /// `build`. The builder runs outside any await but under the map
    /// lock, so it must stay cheap.
    pub fn get_or_create(
        &self,
        key: &WatcherKey,
        build: impl FnOnce() -> Arc<Watcher>,
    ) -> Arc<Watcher> {
        let mut inner = self.inner.lock().unwrap();
        inner.entry(key.clone()).or_insert_with(build).clone()
    }

    /// No implicit creation: update-dispatch paths must no-op when nobody
    /// is subscribed.
    pub fn find(&self, key: &WatcherKey) -> Option<Arc<Watcher>> {
        let inner = self.inner.lock().unwrap();
        inner.get(key).cloned()
    }

    /// All live watchers for one entity, regardless of per-target keying.
    pub fn find_for_entity(&self, key: &WatcherKey) -> Vec<Arc<Watcher>> {
        let inner = self.inner.lock().unwrap();
        inner
            .iter()
            .filter(|(k, _)| {
                k.scope == key.scope && k.kind == key.kind && k.entity == key.entity
            })
            .map(|(_, w)| w.clone())
            .collect()
    }

    pub fn contains(&self, key: &WatcherKey) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.contains_key(key)
    }

    /// Removes the entry only if it still maps to this exact instance.
    /// A retired watcher must never evict the fresh one that may already
    /// have replaced it under the same key.
    pub fn remove_if_same(&self, key: &WatcherKey, watcher: &Arc<Watcher>) {
        let mut inner = self.inner.lock().unwrap();
        if inner.get(key).is_some_and(|w| Arc::ptr_eq(w, watcher)) {
            inner.remove(key);
        }
    }

    pub fn keys_in_scope(&self, scope: &OwnerScopeId) -> Vec<WatcherKey> {
        let inner = self.inner.lock().unwrap();
        inner
            .keys()
            .filter(|k| &k.scope == scope)
            .cloned()
            .collect()
    }
}
