//! Opaque object handles
//!
//! `Pointer`-typed values cross the boundary by identity, never by content.
//! The creating side publishes an object into the process-wide table and owns
//! it for as long as the entry lives; the other side only ever holds the
//! non-owning `Handle` and may pass it back unchanged in a later call.
//! Retiring an entry is the creator's job, not the receiver's.

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::errors::PluginError;

/// A non-owning reference to a published object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

/// Process-wide table of published objects.
pub struct HandleTable {
    entries: Mutex<AHashMap<u64, Arc<dyn Any + Send + Sync>>>,
    next_id: AtomicU64,
}

static HANDLES: Lazy<HandleTable> = Lazy::new(HandleTable::new);

/// The shared handle table for this process.
pub fn handles() -> &'static HandleTable {
    &HANDLES
}

impl HandleTable {
    fn new() -> Self {
        HandleTable {
            entries: Mutex::new(AHashMap::new()),
            // Zero is reserved so a zeroed handle can never resolve.
            next_id: AtomicU64::new(1),
        }
    }

    /// Publish an object and get its handle.
    ///
    /// The caller stays the owner; the returned handle is safe to hand to the
    /// other side of the boundary.
    pub fn publish<T: Any + Send + Sync>(&self, object: Arc<T>) -> Handle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(id, object);
        trace!(handle = id, "published object handle");
        Handle(id)
    }

    /// Resolve a handle back to its published object.
    ///
    /// Fails with `InvalidHandle` when the handle is unknown, already retired,
    /// or refers to an object of a different type.
    pub fn resolve<T: Any + Send + Sync>(&self, handle: Handle) -> Result<Arc<T>, PluginError> {
        let entry = self
            .entries
            .lock()
            .get(&handle.0)
            .cloned()
            .ok_or(PluginError::InvalidHandle(handle))?;

        entry
            .downcast::<T>()
            .map_err(|_| PluginError::InvalidHandle(handle))
    }

    /// Remove a published object. Only the creating side may do this.
    pub fn retire(&self, handle: Handle) -> Result<(), PluginError> {
        self.entries
            .lock()
            .remove(&handle.0)
            .map(|_| trace!(handle = handle.0, "retired object handle"))
            .ok_or(PluginError::InvalidHandle(handle))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
