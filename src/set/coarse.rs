/*!
 * Coarse-Grained Set
 * A single mutex serializes every operation, resize included
 */

use super::table::{hash_of, Table};
use super::Set;
use crate::config::SetKind;
use crate::errors::SetResult;
use ahash::RandomState;
use parking_lot::Mutex;
use std::hash::{BuildHasher, Hash};
use tracing::debug;

/// Chained hash set behind one lock
///
/// Fully serializable, with no intra-structure parallelism. Resizing happens
/// inline while the same lock is still held, so it needs no double-check.
pub struct CoarseGrainedSet<T, S = RandomState> {
    table: Mutex<Table<T>>,
    hasher: S,
}

impl<T: Hash + Eq> CoarseGrainedSet<T> {
    pub fn new(initial_capacity: usize) -> SetResult<Self> {
        Self::with_hasher(initial_capacity, RandomState::new())
    }
}

impl<T: Hash + Eq, S: BuildHasher> CoarseGrainedSet<T, S> {
    pub fn with_hasher(initial_capacity: usize, hasher: S) -> SetResult<Self> {
        Ok(Self {
            table: Mutex::new(Table::new(initial_capacity)?),
            hasher,
        })
    }
}

impl<T: Hash + Eq, S: BuildHasher> Set<T> for CoarseGrainedSet<T, S> {
    fn add(&self, elem: T) -> SetResult<bool> {
        // Hashing needs no lock
        let hash = hash_of(&self.hasher, &elem);
        let mut table = self.table.lock();

        if !table.insert(hash, elem) {
            return Ok(false);
        }

        if table.is_overloaded() {
            let old_capacity = table.capacity();
            let new_capacity = table.grow(|e| hash_of(&self.hasher, e))?;
            debug!(
                kind = "coarse_grained",
                old_capacity,
                new_capacity,
                size = table.size(),
                "table resized"
            );
        }
        Ok(true)
    }

    fn remove(&self, elem: &T) -> bool {
        let hash = hash_of(&self.hasher, elem);
        self.table.lock().remove(hash, elem)
    }

    fn contains(&self, elem: &T) -> bool {
        let hash = hash_of(&self.hasher, elem);
        self.table.lock().contains(hash, elem)
    }

    fn size(&self) -> usize {
        self.table.lock().size()
    }

    fn capacity(&self) -> usize {
        self.table.lock().capacity()
    }

    fn kind(&self) -> SetKind {
        SetKind::CoarseGrained
    }
}
