/*!
 * Sequential Set
 * Unsynchronized reference implementation
 */

use super::table::{hash_of, Table};
use super::Set;
use crate::config::SetKind;
use crate::errors::SetResult;
use ahash::RandomState;
use std::cell::RefCell;
use std::hash::{BuildHasher, Hash};
use tracing::debug;

/// Chained hash set with no locking
///
/// Interior mutability is a `RefCell`, so the type is `!Sync` and cannot be
/// shared across threads. It is the oracle the concurrent variants are checked
/// against.
pub struct SequentialSet<T, S = RandomState> {
    table: RefCell<Table<T>>,
    hasher: S,
}

impl<T: Hash + Eq> SequentialSet<T> {
    pub fn new(initial_capacity: usize) -> SetResult<Self> {
        Self::with_hasher(initial_capacity, RandomState::new())
    }
}

impl<T: Hash + Eq, S: BuildHasher> SequentialSet<T, S> {
    pub fn with_hasher(initial_capacity: usize, hasher: S) -> SetResult<Self> {
        Ok(Self {
            table: RefCell::new(Table::new(initial_capacity)?),
            hasher,
        })
    }
}

impl<T: Hash + Eq, S: BuildHasher> Set<T> for SequentialSet<T, S> {
    fn add(&self, elem: T) -> SetResult<bool> {
        let hash = hash_of(&self.hasher, &elem);
        let mut table = self.table.borrow_mut();

        if !table.insert(hash, elem) {
            return Ok(false);
        }

        if table.is_overloaded() {
            let old_capacity = table.capacity();
            let new_capacity = table.grow(|e| hash_of(&self.hasher, e))?;
            debug!(
                kind = "sequential",
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
        self.table.borrow_mut().remove(hash, elem)
    }

    fn contains(&self, elem: &T) -> bool {
        let hash = hash_of(&self.hasher, elem);
        self.table.borrow().contains(hash, elem)
    }

    fn size(&self) -> usize {
        self.table.borrow().size()
    }

    fn capacity(&self) -> usize {
        self.table.borrow().capacity()
    }

    fn kind(&self) -> SetKind {
        SetKind::Sequential
    }
}
