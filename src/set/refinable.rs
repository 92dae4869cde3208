/*!
 * Refinable Set
 * Per-bucket locks that grow with the table, behind a resize reader/writer lock
 */

use super::table::{
    alloc_chains, alloc_slots, bucket_contains, bucket_insert, bucket_remove, check_capacity,
    destinations, doubled, hash_of, is_overloaded, Bucket,
};
use super::Set;
use crate::config::SetKind;
use crate::errors::{SetError, SetResult};
use ahash::RandomState;
use parking_lot::{Mutex, RwLock};
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace, warn};

/// Hash set whose lock count tracks its capacity
///
/// # Locking
///
/// The bucket array is a growable array of per-bucket mutexes, wrapped in a
/// reader/writer lock that serves as the resize barrier:
///
/// - `add`, `remove`, `contains`: resize lock shared, then one bucket lock
/// - resize: resize lock exclusive, which waits out every in-flight operation
///
/// Operations on different buckets never block each other. Shared holders
/// only read the array's length and index into it; the array itself is only
/// mutated under the exclusive lock.
///
/// # Resizing
///
/// Doubling appends one new bucket lock per existing bucket and splits each
/// old bucket `i` between `i` and `i + old_capacity`. Existing locks stay at
/// their positions.
pub struct RefinableSet<T, S = RandomState> {
    buckets: RwLock<Vec<Mutex<Bucket<T>>>>,
    /// Mirror of `buckets.len()` for the unlocked resize trigger
    capacity: AtomicUsize,
    size: AtomicUsize,
    hasher: S,
}

impl<T: Hash + Eq> RefinableSet<T> {
    pub fn new(initial_capacity: usize) -> SetResult<Self> {
        Self::with_hasher(initial_capacity, RandomState::new())
    }
}

impl<T: Hash + Eq, S: BuildHasher> RefinableSet<T, S> {
    pub fn with_hasher(initial_capacity: usize, hasher: S) -> SetResult<Self> {
        check_capacity(initial_capacity)?;
        Ok(Self {
            buckets: RwLock::new(alloc_slots(initial_capacity, || Mutex::new(Vec::new()))?),
            capacity: AtomicUsize::new(initial_capacity),
            size: AtomicUsize::new(0),
            hasher,
        })
    }

    /// Run `f` on the bucket for `hash` with both locks held
    ///
    /// The bucket index is computed from the capacity seen under the shared
    /// resize lock, never from a value read before it.
    #[inline]
    fn with_bucket<R>(&self, hash: usize, f: impl FnOnce(&mut Bucket<T>) -> R) -> R {
        let buckets = self.buckets.read();
        let mut bucket = buckets[hash % buckets.len()].lock();
        f(&mut *bucket)
    }

    /// Resize until the load factor holds
    ///
    /// Must not be called while holding the resize lock in shared mode.
    fn grow_while_overloaded(&self) -> SetResult<()> {
        loop {
            let observed = self.capacity.load(Ordering::Acquire);
            if !is_overloaded(self.size.load(Ordering::Relaxed), observed) {
                return Ok(());
            }
            self.resize(observed)?;
        }
    }

    fn resize(&self, observed: usize) -> SetResult<()> {
        let mut buckets = self.buckets.write();

        let capacity = buckets.len();
        if capacity != observed {
            trace!(kind = "refinable", observed, capacity, "resize already done by another thread");
            return Ok(());
        }

        let new_capacity = doubled(capacity)?;

        // Exclusive hold: no bucket lock can be contended, so access them directly
        let indices = destinations(
            buckets.iter_mut().flat_map(|bucket| bucket.get_mut().iter()),
            self.size.load(Ordering::Relaxed),
            new_capacity,
            |elem| hash_of(&self.hasher, elem),
        )?;
        let mut chains = alloc_chains(new_capacity, &indices).map_err(|e| {
            warn!(kind = "refinable", new_capacity, "failed to allocate split buckets");
            e
        })?;
        let mut appended = alloc_slots(capacity, || Mutex::new(Vec::new()))?;
        for (lock, chain) in appended.iter_mut().zip(chains.drain(capacity..)) {
            *lock.get_mut() = chain;
        }
        buckets.try_reserve_exact(capacity).map_err(|e| {
            warn!(kind = "refinable", new_capacity, "failed to grow bucket lock array");
            SetError::from_reserve(new_capacity, e)
        })?;

        // Everything is reserved: bucket `i` splits between `i` and `i + capacity`
        let mut next = 0;
        for (stay, chain) in buckets.iter_mut().zip(chains) {
            let old = std::mem::replace(stay.get_mut(), chain);
            let routes = &indices[next..next + old.len()];
            next += old.len();
            for (elem, &index) in old.into_iter().zip(routes) {
                if index < capacity {
                    stay.get_mut().push(elem);
                } else {
                    appended[index - capacity].get_mut().push(elem);
                }
            }
        }
        buckets.append(&mut appended);

        self.capacity.store(new_capacity, Ordering::Release);

        debug!(
            kind = "refinable",
            old_capacity = capacity,
            new_capacity,
            size = self.size.load(Ordering::Relaxed),
            "table resized"
        );
        Ok(())
    }
}

impl<T: Hash + Eq, S: BuildHasher> Set<T> for RefinableSet<T, S> {
    fn add(&self, elem: T) -> SetResult<bool> {
        let hash = hash_of(&self.hasher, &elem);
        let inserted = self.with_bucket(hash, |bucket| {
            let inserted = bucket_insert(bucket, elem);
            if inserted {
                self.size.fetch_add(1, Ordering::Relaxed);
            }
            inserted
        });
        if !inserted {
            return Ok(false);
        }

        // Both locks are released here, so taking the resize lock exclusively cannot self-deadlock
        self.grow_while_overloaded()?;
        Ok(true)
    }

    fn remove(&self, elem: &T) -> bool {
        let hash = hash_of(&self.hasher, elem);
        self.with_bucket(hash, |bucket| {
            let removed = bucket_remove(bucket, elem);
            if removed {
                self.size.fetch_sub(1, Ordering::Relaxed);
            }
            removed
        })
    }

    fn contains(&self, elem: &T) -> bool {
        let hash = hash_of(&self.hasher, elem);
        self.with_bucket(hash, |bucket| bucket_contains(bucket, elem))
    }

    fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    fn kind(&self) -> SetKind {
        SetKind::Refinable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_operations() {
        let set = RefinableSet::new(4).unwrap();

        assert!(set.add(10).unwrap());
        assert!(!set.add(10).unwrap());
        assert!(set.contains(&10));
        assert!(set.remove(&10));
        assert!(!set.remove(&10));
        assert!(set.is_empty());
    }

    #[test]
    fn test_lock_array_tracks_capacity() {
        let set = RefinableSet::new(1).unwrap();
        for i in 0..50u32 {
            set.add(i).unwrap();
        }

        let buckets = set.buckets.read();
        assert_eq!(buckets.len(), set.capacity());
        for (index, bucket) in buckets.iter().enumerate() {
            for elem in bucket.lock().iter() {
                assert_eq!(hash_of(&set.hasher, elem) % buckets.len(), index);
            }
        }
    }

    #[test]
    fn test_stale_resize_is_noop() {
        let set = RefinableSet::new(2).unwrap();
        for i in 0..9u32 {
            set.add(i).unwrap();
        }
        assert_eq!(set.capacity(), 4);

        // A thread that observed the old capacity loses the race
        set.resize(2).unwrap();
        assert_eq!(set.capacity(), 4);
        assert_eq!(set.buckets.read().len(), 4);
        assert!((0..9).all(|i| set.contains(&i)));
    }

    #[test]
    fn test_split_fills_chains_without_reallocating() {
        let set = RefinableSet::new(2).unwrap();
        // The 9th insertion triggers the only resize
        for i in 0..9u32 {
            set.add(i).unwrap();
        }
        assert_eq!(set.capacity(), 4);

        let buckets = set.buckets.read();
        assert_eq!(buckets.len(), 4);
        let mut total = 0;
        for bucket in buckets.iter() {
            let chain = bucket.lock();
            assert_eq!(chain.capacity(), chain.len());
            total += chain.len();
        }
        assert_eq!(total, 9);
    }

    #[test]
    fn test_concurrent_mixed_operations() {
        let set = Arc::new(RefinableSet::<u64>::new(1).unwrap());
        let mut handles = vec![];

        for t in 0..8u64 {
            let set = set.clone();
            handles.push(thread::spawn(move || {
                let base = t * 1000;
                for j in 0..1000 {
                    assert!(set.add(base + j).unwrap());
                }
                for j in (0..1000).step_by(2) {
                    assert!(set.remove(&(base + j)));
                }
                for j in 0..1000 {
                    assert_eq!(set.contains(&(base + j)), j % 2 == 1);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(set.size(), 4000);
        assert!(set.size() <= 4 * set.capacity());
    }
}
