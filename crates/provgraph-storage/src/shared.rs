//! Thread-shared access to a [`LinkStore`].
//!
//! [`SharedLinkStore`] wraps a backend in `Arc<parking_lot::Mutex<_>>`. Each
//! call holds the lock for exactly one store operation, so a mutation and
//! the closure rows it implies are observed together or not at all.
//! A mutex rather than a read-write lock keeps `SqliteStore` (whose
//! connection is `Send` but not `Sync`) shareable.

use std::sync::Arc;

use parking_lot::Mutex;

use provgraph_core::{Link, LinkId, NodeId};

use crate::error::StorageError;
use crate::traits::LinkStore;
use crate::verify::ClosureReport;

/// Cloneable handle to one store shared across threads.
#[derive(Debug)]
pub struct SharedLinkStore<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedLinkStore<S> {
    fn clone(&self) -> Self {
        SharedLinkStore {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: LinkStore> SharedLinkStore<S> {
    pub fn new(store: S) -> Self {
        SharedLinkStore {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Runs `f` with exclusive access to the store.
    pub fn with<T>(&self, f: impl FnOnce(&mut S) -> T) -> T {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    pub fn insert_link(&self, link: &Link) -> Result<LinkId, StorageError> {
        self.with(|store| store.insert_link(link))
    }

    pub fn delete_link(&self, id: LinkId) -> Result<(), StorageError> {
        self.with(|store| store.delete_link(id))
    }

    pub fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> Result<bool, StorageError> {
        self.with(|store| store.is_ancestor(ancestor, descendant))
    }

    pub fn verify_closure(&self) -> Result<ClosureReport, StorageError> {
        self.with(|store| store.verify_closure())
    }

    /// Returns the store if this is the last handle.
    pub fn into_inner(self) -> Option<S> {
        Arc::try_unwrap(self.inner).ok().map(Mutex::into_inner)
    }
}
