//! Thread-safe, type-indexed container store.

use super::{AttributeContainer, ContainerRef};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

type ErasedContainer = Arc<dyn Any + Send + Sync>;
type StreamingCallback = Arc<dyn Fn(&ErasedContainer) + Send + Sync>;

fn downcast<T: AttributeContainer>(erased: &ErasedContainer) -> Option<ContainerRef<T>> {
    Arc::clone(erased)
        .downcast::<RwLock<T>>()
        .ok()
        .map(ContainerRef::from_shared)
}

/// The shared state every module reads from and writes to.
///
/// Containers are bucketed by their type tag and kept in insertion order
/// within a bucket. Every operation on a bucket runs under that bucket's
/// lock, so concurrent stores from many workers never lose or duplicate a
/// container. The store never holds a bucket lock while locking a
/// container, so callers may keep a container locked while storing others.
#[derive(Default)]
pub struct ContainerStore {
    buckets: DashMap<&'static str, Vec<ErasedContainer>>,
    callbacks: RwLock<HashMap<&'static str, Vec<StreamingCallback>>>,
}

impl ContainerStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new container and returns a shared handle to it.
    pub fn store_container<T: AttributeContainer>(&self, container: T) -> ContainerRef<T> {
        let handle = ContainerRef::new(container);
        self.store_container_ref(&handle);
        handle
    }

    /// Stores an existing handle. The store shares the instance with the caller.
    pub fn store_container_ref<T: AttributeContainer>(&self, container: &ContainerRef<T>) {
        self.buckets
            .entry(T::CONTAINER_TYPE)
            .or_default()
            .push(container.erased());
    }

    /// Returns every container stored under `T`'s type tag, in insertion order.
    ///
    /// The returned handles are the stored instances themselves.
    #[must_use]
    pub fn get_containers<T: AttributeContainer>(&self) -> Vec<ContainerRef<T>> {
        self.buckets
            .get(T::CONTAINER_TYPE)
            .map(|bucket| bucket.iter().filter_map(downcast::<T>).collect())
            .unwrap_or_default()
    }

    /// Returns and removes every container stored under `T`'s type tag.
    pub fn pop_containers<T: AttributeContainer>(&self) -> Vec<ContainerRef<T>> {
        let Some(mut bucket) = self.buckets.get_mut(T::CONTAINER_TYPE) else {
            return Vec::new();
        };

        let mut popped = Vec::new();
        bucket.retain(|erased| match downcast::<T>(erased) {
            Some(container) => {
                popped.push(container);
                false
            }
            None => true,
        });
        popped
    }

    /// Removes one container instance. Returns false if it was not stored.
    pub fn remove_container<T: AttributeContainer>(&self, container: &ContainerRef<T>) -> bool {
        let Some(mut bucket) = self.buckets.get_mut(T::CONTAINER_TYPE) else {
            return false;
        };

        match bucket.iter().position(|erased| container.is_instance(erased)) {
            Some(pos) => {
                bucket.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Removes several container instances under a single bucket lock.
    ///
    /// Instances that are not stored are ignored. Returns how many were removed.
    pub fn remove_containers<T: AttributeContainer>(&self, containers: &[ContainerRef<T>]) -> usize {
        if containers.is_empty() {
            return 0;
        }
        let Some(mut bucket) = self.buckets.get_mut(T::CONTAINER_TYPE) else {
            return 0;
        };

        let before = bucket.len();
        bucket.retain(|erased| !containers.iter().any(|c| c.is_instance(erased)));
        before - bucket.len()
    }

    /// Removes containers of type `T` that are value-equal to an earlier one.
    ///
    /// The first occurrence in insertion order is kept, including when the
    /// same instance was stored more than once. Returns the number of
    /// bucket entries removed.
    pub fn dedupe_containers<T: AttributeContainer + PartialEq>(&self) -> usize {
        // Values are compared on a snapshot; the bucket lock is only taken
        // afterwards, for pointer comparisons.
        let current = self.get_containers::<T>();
        let mut kept: Vec<&ContainerRef<T>> = Vec::with_capacity(current.len());
        let mut dropped: Vec<&ContainerRef<T>> = Vec::new();

        for container in &current {
            let seen = kept
                .iter()
                .chain(dropped.iter())
                .any(|c| c.same_instance(container));
            if seen {
                continue;
            }
            if kept.iter().any(|k| *k == container) {
                dropped.push(container);
            } else {
                kept.push(container);
            }
        }

        let Some(mut bucket) = self.buckets.get_mut(T::CONTAINER_TYPE) else {
            return 0;
        };
        let mut first_seen = vec![false; kept.len()];
        let before = bucket.len();
        bucket.retain(|erased| {
            if dropped.iter().any(|d| d.is_instance(erased)) {
                return false;
            }
            match kept.iter().position(|k| k.is_instance(erased)) {
                Some(i) => !std::mem::replace(&mut first_seen[i], true),
                None => true,
            }
        });
        let removed = before - bucket.len();
        drop(bucket);

        if removed > 0 {
            debug!(
                container_type = T::CONTAINER_TYPE,
                removed, "Removed duplicate containers"
            );
        }
        removed
    }

    /// Registers a callback invoked for every streamed container of type `T`.
    pub fn register_streaming_callback<T, F>(&self, callback: F)
    where
        T: AttributeContainer,
        F: Fn(&ContainerRef<T>) + Send + Sync + 'static,
    {
        let wrapped: StreamingCallback = Arc::new(move |erased: &ErasedContainer| {
            if let Some(container) = downcast::<T>(erased) {
                callback(&container);
            }
        });
        self.callbacks
            .write()
            .entry(T::CONTAINER_TYPE)
            .or_default()
            .push(wrapped);
    }

    /// Hands a container to every streaming callback registered for its type.
    ///
    /// The container is not stored. Returns the number of callbacks invoked.
    pub fn stream_container<T: AttributeContainer>(&self, container: T) -> usize {
        let callbacks: Vec<StreamingCallback> = self
            .callbacks
            .read()
            .get(T::CONTAINER_TYPE)
            .cloned()
            .unwrap_or_default();

        let erased = ContainerRef::new(container).erased();
        for callback in &callbacks {
            callback(&erased);
        }
        callbacks.len()
    }

    /// Returns the number of containers stored under `T`'s type tag.
    #[must_use]
    pub fn container_count<T: AttributeContainer>(&self) -> usize {
        self.buckets
            .get(T::CONTAINER_TYPE)
            .map_or(0, |bucket| bucket.len())
    }

    /// Returns the type tags that currently hold at least one container.
    #[must_use]
    pub fn container_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self
            .buckets
            .iter()
            .filter(|entry| !entry.value().is_empty())
            .map(|entry| *entry.key())
            .collect();
        types.sort_unstable();
        types
    }

    /// Returns the total number of stored containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|entry| entry.value().len()).sum()
    }

    /// Returns true if no container is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every stored container and streaming callback.
    pub fn clear(&self) {
        self.buckets.clear();
        self.callbacks.write().clear();
    }
}

impl std::fmt::Debug for ContainerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerStore")
            .field("container_types", &self.container_types())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        value: String,
    }

    impl AttributeContainer for Item {
        const CONTAINER_TYPE: &'static str = "item";
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Summary {
        total: usize,
    }

    impl AttributeContainer for Summary {
        const CONTAINER_TYPE: &'static str = "summary";
    }

    fn item(value: &str) -> Item {
        Item {
            value: value.to_string(),
        }
    }

    fn values(store: &ContainerStore) -> Vec<String> {
        store
            .get_containers::<Item>()
            .iter()
            .map(|c| c.read().value.clone())
            .collect()
    }

    #[test]
    fn test_store_and_get_preserves_order() {
        let store = ContainerStore::new();
        store.store_container(item("a"));
        store.store_container(item("b"));
        store.store_container(item("c"));

        assert_eq!(values(&store), vec!["a", "b", "c"]);
        assert_eq!(store.container_count::<Item>(), 3);
    }

    #[test]
    fn test_types_are_isolated() {
        let store = ContainerStore::new();
        store.store_container(item("a"));
        store.store_container(Summary { total: 1 });

        assert_eq!(store.get_containers::<Item>().len(), 1);
        assert_eq!(store.get_containers::<Summary>().len(), 1);
        assert_eq!(store.container_types(), vec!["item", "summary"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_unknown_type_is_empty() {
        let store = ContainerStore::new();
        assert!(store.get_containers::<Item>().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_retrieved_handles_are_stored_instances() {
        let store = ContainerStore::new();
        let original = store.store_container(item("a"));

        for container in store.get_containers::<Item>() {
            container.write().value.push_str(" appended");
        }

        assert_eq!(original.read().value, "a appended");
        assert_eq!(values(&store), vec!["a appended"]);
    }

    #[test]
    fn test_remove_container_is_idempotent() {
        let store = ContainerStore::new();
        let a = store.store_container(item("a"));
        store.store_container(item("b"));

        assert!(store.remove_container(&a));
        assert!(!store.remove_container(&a));
        assert_eq!(values(&store), vec!["b"]);
    }

    #[test]
    fn test_remove_uses_identity_not_value() {
        let store = ContainerStore::new();
        let first = store.store_container(item("same"));
        let second = store.store_container(item("same"));

        assert!(store.remove_container(&second));

        let remaining = store.get_containers::<Item>();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].same_instance(&first));
    }

    #[test]
    fn test_remove_never_stored_is_noop() {
        let store = ContainerStore::new();
        let loose = ContainerRef::new(item("loose"));

        assert!(!store.remove_container(&loose));
        assert_eq!(store.remove_containers(&[loose]), 0);
    }

    #[test]
    fn test_pop_containers() {
        let store = ContainerStore::new();
        store.store_container(item("a"));
        store.store_container(item("b"));
        store.store_container(Summary { total: 0 });

        let popped = store.pop_containers::<Item>();
        assert_eq!(popped.len(), 2);
        assert!(store.get_containers::<Item>().is_empty());
        assert_eq!(store.container_count::<Summary>(), 1);
        assert!(store.pop_containers::<Item>().is_empty());
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let store = ContainerStore::new();
        let first = store.store_container(item("x"));
        store.store_container(item("y"));
        store.store_container(item("x"));
        store.store_container(item("x"));

        assert_eq!(store.dedupe_containers::<Item>(), 2);
        assert_eq!(values(&store), vec!["x", "y"]);
        assert!(store.get_containers::<Item>()[0].same_instance(&first));
    }

    #[test]
    fn test_dedupe_same_instance_stored_twice() {
        let store = ContainerStore::new();
        let first = store.store_container(item("x"));
        store.store_container_ref(&first);
        store.store_container(item("y"));
        store.store_container(item("x"));

        assert_eq!(store.dedupe_containers::<Item>(), 2);

        let remaining = store.get_containers::<Item>();
        assert_eq!(remaining.len(), 2);
        assert!(remaining[0].same_instance(&first));
        assert_eq!(values(&store), vec!["x", "y"]);
    }

    #[test]
    fn test_dedupe_without_duplicates_is_noop() {
        let store = ContainerStore::new();
        store.store_container(item("x"));
        store.store_container(item("y"));

        assert_eq!(store.dedupe_containers::<Item>(), 0);
        assert_eq!(store.dedupe_containers::<Summary>(), 0);
        assert_eq!(values(&store), vec!["x", "y"]);
    }

    #[test]
    fn test_streaming_callbacks() {
        let store = ContainerStore::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        store.register_streaming_callback::<Item, _>(move |container| {
            assert_eq!(container.read().value, "streamed");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(store.stream_container(item("streamed")), 1);
        assert_eq!(store.stream_container(Summary { total: 3 }), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_stores_lose_nothing() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 250;

        let store = Arc::new(ContainerStore::new());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        store.store_container(item(&format!("{t}-{i}")));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut stored = values(&store);
        assert_eq!(stored.len(), THREADS * PER_THREAD);
        stored.sort();
        stored.dedup();
        assert_eq!(stored.len(), THREADS * PER_THREAD);
    }

    #[test]
    fn test_clear() {
        let store = ContainerStore::new();
        store.store_container(item("a"));
        store.register_streaming_callback::<Item, _>(|_| {});
        store.clear();

        assert!(store.is_empty());
        assert_eq!(store.stream_container(item("b")), 0);
    }
}
