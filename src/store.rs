//! # Store
//!
//! In-memory mirror of the watched resources, keyed by `namespace/name`.
//!
//! The store is rebuilt from scratch every time the watch stream reconnects.
//! All operations take the lock for a bounded amount of work and never await
//! while holding it.

use crate::resource::Resource;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Thread-safe resource cache
pub struct Store<K> {
    skip_generation_check: bool,
    resources: RwLock<HashMap<String, Arc<K>>>,
}

impl<K> fmt::Debug for Store<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("Store")
            .field("skip_generation_check", &self.skip_generation_check)
            .field("len", &len)
            .finish()
    }
}

impl<K: Resource> Store<K> {
    /// Create an empty store
    ///
    /// With `skip_generation_check` every upsert of an existing key counts as an
    /// update; otherwise only upserts that bump the generation do.
    pub fn new(skip_generation_check: bool) -> Self {
        Self {
            skip_generation_check,
            resources: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<K>> {
        self.read().get(key).cloned()
    }

    /// Insert or replace a resource
    ///
    /// Returns true when the change is worth reconciling: the key is new, or its
    /// generation increased (always true with the generation check disabled).
    pub fn upsert(&self, res: Arc<K>) -> bool {
        let key = res.key();
        let new_generation = res.generation();
        let previous = self.write().insert(key, res);
        match previous {
            None => true,
            Some(_) if self.skip_generation_check => true,
            Some(existing) => new_generation > existing.generation(),
        }
    }

    /// Remove the entry for the resource's key, whatever its generation
    pub fn remove(&self, res: &K) {
        self.write().remove(&res.key());
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn all(&self) -> Vec<Arc<K>> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Poisoning is ignored: every critical section is a single map operation.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<K>>> {
        self.resources.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<K>>> {
        self.resources.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn config_map(name: &str, generation: i64, text: &str) -> Arc<ConfigMap> {
        Arc::new(ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("skop".to_string()),
                generation: Some(generation),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("text".to_string(), text.to_string())])),
            ..Default::default()
        })
    }

    fn text(res: &ConfigMap) -> &str {
        res.data
            .as_ref()
            .and_then(|d| d.get("text"))
            .map(String::as_str)
            .unwrap_or_default()
    }

    #[test]
    fn test_upsert_new_key_is_update() {
        let store = Store::new(false);
        assert!(store.upsert(config_map("a", 1, "one")));
        assert_eq!(store.len(), 1);
        assert!(store.get("skop/a").is_some());
        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_upsert_requires_generation_bump() {
        let store = Store::new(false);
        assert!(store.upsert(config_map("a", 1, "one")));
        assert!(!store.upsert(config_map("a", 1, "status change")));
        assert!(!store.upsert(config_map("a", 0, "older")));
        assert!(store.upsert(config_map("a", 2, "two")));
    }

    #[test]
    fn test_upsert_always_replaces_body() {
        let store = Store::new(false);
        store.upsert(config_map("a", 2, "two"));
        store.upsert(config_map("a", 2, "status change"));
        let stored = store.get("skop/a").expect("resource should be cached");
        assert_eq!(text(&stored), "status change");
    }

    #[test]
    fn test_skip_generation_check_treats_every_upsert_as_update() {
        let store = Store::new(true);
        assert!(store.upsert(config_map("a", 1, "one")));
        assert!(store.upsert(config_map("a", 1, "again")));
        assert!(store.upsert(config_map("a", 0, "older")));
    }

    #[test]
    fn test_last_event_wins_for_increasing_generations() {
        let store = Store::new(false);
        for generation in 1..=5 {
            store.upsert(config_map("a", generation, &format!("gen-{generation}")));
        }
        let stored = store.get("skop/a").expect("resource should be cached");
        assert_eq!(text(&stored), "gen-5");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_remove_ignores_generation() {
        let store = Store::new(false);
        store.upsert(config_map("a", 7, "seven"));
        store.remove(&config_map("a", 1, "stale delete"));
        assert!(store.get("skop/a").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_unknown_key_is_noop() {
        let store: Store<ConfigMap> = Store::new(false);
        store.remove(&config_map("missing", 1, ""));
        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_empties_store() {
        let store = Store::new(false);
        store.upsert(config_map("a", 1, "one"));
        store.upsert(config_map("b", 1, "one"));
        store.clear();
        assert!(store.is_empty());
        assert!(store.keys().is_empty());
        assert!(store.all().is_empty());
        // After a clear, a known key is fresh again
        assert!(store.upsert(config_map("a", 1, "one")));
    }

    #[test]
    fn test_keys_and_all() {
        let store = Store::new(false);
        store.upsert(config_map("a", 1, "one"));
        store.upsert(config_map("b", 1, "one"));
        let mut keys = store.keys();
        keys.sort();
        assert_eq!(keys, vec!["skop/a".to_string(), "skop/b".to_string()]);
        assert_eq!(store.all().len(), 2);
    }

    #[test]
    fn test_concurrent_upserts() {
        let store = Arc::new(Store::new(false));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for generation in 1..=50 {
                        store.upsert(config_map(&format!("r{i}"), generation, "x"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread panicked");
        }
        assert_eq!(store.len(), 8);
        for i in 0..8 {
            let stored = store.get(&format!("skop/r{i}")).expect("resource should be cached");
            assert_eq!(stored.metadata.generation, Some(50));
        }
    }
}
