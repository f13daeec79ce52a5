use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::OwnedMutexGuard;

/// Named exclusive-access scopes for global collections that have no parent
/// resource (message templates, mute timings).
///
/// Clones share the same set of scopes. Holding the [`ScopeGuard`] of a
/// collection excludes every other reconciliation of that collection;
/// distinct collections never block each other.
///
/// Scopes are never evicted, so collection names must come from a bounded
/// set such as the fixed global collection names.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveScopes {
    scopes: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ExclusiveScopes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `collection` is free and holds it until the guard drops.
    pub async fn acquire(&self, collection: &str) -> ScopeGuard {
        let lock = {
            let mut scopes = self.scopes.lock().unwrap_or_else(PoisonError::into_inner);
            scopes
                .entry(collection.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        tracing::trace!(collection, "Waiting for exclusive scope");
        let guard = lock.lock_owned().await;
        tracing::trace!(collection, "Acquired exclusive scope");
        ScopeGuard {
            collection: collection.to_string(),
            _guard: guard,
        }
    }
}

#[derive(Debug)]
pub struct ScopeGuard {
    collection: String,
    _guard: OwnedMutexGuard<()>,
}

impl ScopeGuard {
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }
}
