//! Run-scoped side-channel
//!
//! Hooks of one job family often share richer state than what flows through
//! job input and output (clients, a typed "state" object, counters). The
//! caller creates a [`Store`] per run and every hook receives a handle to it.
//! Nothing in the store is persisted.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Typed map holding at most one value per type
#[derive(Clone, Default)]
pub struct Store {
    entries: Arc<Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value`, returning the previous value of the same type
    pub fn insert<S: Any + Send + Sync>(&self, value: S) -> Option<S> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<S>(), Box::new(value))
            .and_then(|previous| previous.downcast::<S>().ok())
            .map(|previous| *previous)
    }

    /// Returns a clone of the stored value of type `S`
    pub fn get<S: Any + Send + Sync + Clone>(&self) -> Option<S> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<S>())
            .and_then(|value| value.downcast_ref::<S>())
            .cloned()
    }

    /// Mutates the stored value of type `S` in place
    pub fn update<S, R>(&self, f: impl FnOnce(&mut S) -> R) -> Option<R>
    where
        S: Any + Send + Sync,
    {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&TypeId::of::<S>())
            .and_then(|value| value.downcast_mut::<S>())
            .map(f)
    }

    pub fn remove<S: Any + Send + Sync>(&self) -> Option<S> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&TypeId::of::<S>())
            .and_then(|value| value.downcast::<S>().ok())
            .map(|value| *value)
    }

    pub fn contains<S: Any + Send + Sync>(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<S>())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("Store").field("entries", &len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct LaunchState {
        pods: Vec<String>,
    }

    #[test]
    fn test_insert_and_get() {
        let store = Store::new();
        assert!(store.insert(LaunchState { pods: vec![] }).is_none());

        let previous = store.insert(LaunchState {
            pods: vec!["gzserver".into()],
        });
        assert_eq!(previous, Some(LaunchState { pods: vec![] }));
        assert_eq!(
            store.get::<LaunchState>().map(|s| s.pods),
            Some(vec!["gzserver".to_string()])
        );
    }

    #[test]
    fn test_update_is_shared_across_clones() {
        let store = Store::new();
        store.insert(LaunchState { pods: vec![] });

        let handle = store.clone();
        let len = handle.update(|state: &mut LaunchState| {
            state.pods.push("bridge".into());
            state.pods.len()
        });

        assert_eq!(len, Some(1));
        assert_eq!(store.get::<LaunchState>().map(|s| s.pods.len()), Some(1));
    }

    #[test]
    fn test_missing_type() {
        let store = Store::new();
        assert!(store.get::<u32>().is_none());
        assert!(store.update(|n: &mut u32| *n += 1).is_none());
        assert!(!store.contains::<u32>());
    }

    #[test]
    fn test_remove() {
        let store = Store::new();
        store.insert(7u32);
        assert_eq!(store.remove::<u32>(), Some(7));
        assert!(!store.contains::<u32>());
    }
}
