//! # Snapshot Store
//!
//! Holds the active configuration snapshot for lock-free reads.
//!
//! Readers get an `Arc` to an immutable snapshot; a swap publishes a new
//! snapshot in one atomic pointer exchange, so no reader ever sees a
//! partially updated value. The store does no validation of its own.

use arc_swap::ArcSwapOption;
use std::sync::Arc;

pub struct SnapshotStore<T> {
    current: ArcSwapOption<T>,
}

impl<T> SnapshotStore<T> {
    /// Creates an empty store; [`SnapshotStore::get`] returns `None` until
    /// the first swap.
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
        }
    }

    /// Returns the active snapshot without blocking.
    pub fn get(&self) -> Option<Arc<T>> {
        self.current.load_full()
    }

    /// Publishes `next` and returns the snapshot it replaced.
    pub fn swap(&self, next: Arc<T>) -> Option<Arc<T>> {
        self.current.swap(Some(next))
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_none()
    }
}

impl<T> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
