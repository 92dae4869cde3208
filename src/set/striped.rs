/*!
 * Lock Striping Pattern
 * Fixed stripe locks guarding a growing bucket table
 */

use super::table::{
    alloc_chains, alloc_slots, bucket_contains, bucket_insert, bucket_remove, check_capacity,
    destinations, doubled, hash_of, is_overloaded, Bucket,
};
use super::Set;
use crate::config::SetKind;
use crate::errors::{SetError, SetResult};
use crate::sync::OrderedGuard;
use ahash::RandomState;
use parking_lot::Mutex;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace, warn};

/// Buckets owned by one stripe: global bucket `b` lives at local index `b / stripes`
type Partition<T> = Vec<Bucket<T>>;

/// Lock-striped hash set
///
/// # Locking
///
/// - Lock index is `hash % stripes`, with `stripes` fixed at construction
/// - Bucket index is `hash % capacity`, with `capacity` doubling over time
///
/// The stripe count divides the initial capacity, and therefore every later
/// capacity, so `(hash % capacity) % stripes == hash % stripes`. Each bucket is
/// thus guarded by exactly one stripe for the whole life of the set, and the
/// stripe physically owns it.
///
/// # Resizing
///
/// All stripes are taken in ascending order through [`OrderedGuard`], the
/// capacity is re-checked against the value that triggered the attempt, and
/// every partition is rebuilt before any stripe is released.
///
/// # Example
///
/// ```
/// use concurrent_hashset::{Set, StripedSet};
///
/// let set = StripedSet::new(4).unwrap();
/// assert!(set.add(42).unwrap());
/// assert!(set.contains(&42));
/// ```
pub struct StripedSet<T, S = RandomState> {
    stripes: Vec<Mutex<Partition<T>>>,
    /// Written only while every stripe is held
    capacity: AtomicUsize,
    size: AtomicUsize,
    hasher: S,
}

impl<T: Hash + Eq> StripedSet<T> {
    /// One stripe per initial bucket
    pub fn new(initial_capacity: usize) -> SetResult<Self> {
        Self::with_stripes(initial_capacity, initial_capacity, RandomState::new())
    }
}

impl<T: Hash + Eq, S: BuildHasher> StripedSet<T, S> {
    pub fn with_hasher(initial_capacity: usize, hasher: S) -> SetResult<Self> {
        Self::with_stripes(initial_capacity, initial_capacity, hasher)
    }

    /// Create a set with an explicit stripe count
    ///
    /// `stripes` must be positive and divide `initial_capacity`.
    pub fn with_stripes(initial_capacity: usize, stripes: usize, hasher: S) -> SetResult<Self> {
        check_capacity(initial_capacity)?;
        if stripes == 0 || initial_capacity % stripes != 0 {
            return Err(SetError::invalid(format!(
                "stripe count {} must be positive and divide initial capacity {}",
                stripes, initial_capacity
            )));
        }

        let per_stripe = initial_capacity / stripes;
        let mut locks = alloc_slots(stripes, || Mutex::new(Vec::new()))?;
        for lock in locks.iter_mut() {
            *lock.get_mut() = alloc_slots(per_stripe, Vec::new)?;
        }

        Ok(Self {
            stripes: locks,
            capacity: AtomicUsize::new(initial_capacity),
            size: AtomicUsize::new(0),
            hasher,
        })
    }

    /// Number of stripe locks (never changes)
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    #[inline]
    fn stripe_of(&self, hash: usize) -> &Mutex<Partition<T>> {
        &self.stripes[hash % self.stripes.len()]
    }

    /// Local bucket index inside the owning stripe
    ///
    /// Must be called with that stripe held: the capacity read is then
    /// ordered after the last resize by the stripe lock.
    #[inline]
    fn local_index(&self, hash: usize) -> usize {
        let capacity = self.capacity.load(Ordering::Relaxed);
        (hash % capacity) / self.stripes.len()
    }

    /// Resize until the load factor holds
    ///
    /// The trigger reads `size` and `capacity` without any lock. A stale read
    /// costs at most one resize attempt that aborts on the double-check.
    fn grow_while_overloaded(&self) -> SetResult<()> {
        loop {
            let observed = self.capacity.load(Ordering::Relaxed);
            if !is_overloaded(self.size.load(Ordering::Relaxed), observed) {
                return Ok(());
            }
            self.resize(observed)?;
        }
    }

    fn resize(&self, observed: usize) -> SetResult<()> {
        let mut all = OrderedGuard::lock_all(&self.stripes);

        let capacity = self.capacity.load(Ordering::Relaxed);
        if capacity != observed {
            trace!(kind = "striped", observed, capacity, "resize already done by another thread");
            return Ok(());
        }

        let stripes = all.len();
        let new_capacity = doubled(capacity)?;
        let per_stripe = new_capacity / stripes;

        // Size is exact while every stripe is held
        let indices = destinations(
            all.iter_mut().flat_map(|partition| partition.iter().flatten()),
            self.size.load(Ordering::Relaxed),
            new_capacity,
            |elem| hash_of(&self.hasher, elem),
        )?;
        let chains = alloc_chains(new_capacity, &indices).map_err(|e| {
            warn!(kind = "striped", new_capacity, "failed to allocate grown table");
            e
        })?;

        let mut fresh: Vec<Partition<T>> = alloc_slots(stripes, Vec::new)?;
        for partition in fresh.iter_mut() {
            partition
                .try_reserve_exact(per_stripe)
                .map_err(|e| SetError::from_reserve(new_capacity, e))?;
        }
        for (bucket, chain) in chains.into_iter().enumerate() {
            fresh[bucket % stripes].push(chain);
        }

        // Everything is reserved: no allocation from here on
        let elems = all
            .iter_mut()
            .flat_map(|partition| std::mem::take(partition).into_iter().flatten());
        for (elem, index) in elems.zip(indices) {
            fresh[index % stripes][index / stripes].push(elem);
        }

        for (slot, partition) in all.iter_mut().zip(fresh) {
            *slot = partition;
        }
        self.capacity.store(new_capacity, Ordering::Relaxed);

        debug!(
            kind = "striped",
            old_capacity = capacity,
            new_capacity,
            size = self.size.load(Ordering::Relaxed),
            stripes,
            "table resized"
        );
        Ok(())
    }
}

impl<T: Hash + Eq, S: BuildHasher> Set<T> for StripedSet<T, S> {
    fn add(&self, elem: T) -> SetResult<bool> {
        let hash = hash_of(&self.hasher, &elem);
        {
            let mut partition = self.stripe_of(hash).lock();
            let index = self.local_index(hash);
            if !bucket_insert(&mut partition[index], elem) {
                return Ok(false);
            }
            self.size.fetch_add(1, Ordering::Relaxed);
        }

        self.grow_while_overloaded()?;
        Ok(true)
    }

    fn remove(&self, elem: &T) -> bool {
        let hash = hash_of(&self.hasher, elem);
        let mut partition = self.stripe_of(hash).lock();
        let index = self.local_index(hash);

        let removed = bucket_remove(&mut partition[index], elem);
        if removed {
            self.size.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    fn contains(&self, elem: &T) -> bool {
        let hash = hash_of(&self.hasher, elem);
        let partition = self.stripe_of(hash).lock();
        bucket_contains(&partition[self.local_index(hash)], elem)
    }

    fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    fn kind(&self) -> SetKind {
        SetKind::Striped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_invalid_stripes() {
        assert!(StripedSet::<u32>::new(0).is_err());
        assert!(StripedSet::<u32>::with_stripes(8, 0, RandomState::new()).is_err());
        assert!(StripedSet::<u32>::with_stripes(8, 3, RandomState::new()).is_err());
        assert!(StripedSet::<u32>::with_stripes(8, 2, RandomState::new()).is_ok());
    }

    #[test]
    fn test_basic_operations() {
        let set = StripedSet::new(4).unwrap();

        assert!(set.add("key1").unwrap());
        assert!(set.add("key2").unwrap());
        assert!(!set.add("key1").unwrap());
        assert!(set.contains(&"key2"));
        assert!(!set.contains(&"key3"));

        assert!(set.remove(&"key1"));
        assert!(!set.remove(&"key1"));
        assert_eq!(set.size(), 1);
    }

    #[test]
    fn test_stripe_count_fixed_across_resize() {
        let set = StripedSet::with_stripes(4, 2, RandomState::new()).unwrap();
        for i in 0..200 {
            set.add(i).unwrap();
        }

        assert_eq!(set.stripe_count(), 2);
        assert!(set.capacity() >= 64);
        assert_eq!(set.capacity() % 4, 0);
        assert!((0..200).all(|i| set.contains(&i)));
    }

    #[test]
    fn test_buckets_stay_with_their_stripe() {
        let set = StripedSet::with_stripes(8, 4, RandomState::new()).unwrap();
        for i in 0..500u64 {
            set.add(i).unwrap();
        }

        let capacity = set.capacity();
        let stripes = set.stripe_count();
        for (stripe, lock) in set.stripes.iter().enumerate() {
            let partition = lock.lock();
            assert_eq!(partition.len(), capacity / stripes);
            for (local, bucket) in partition.iter().enumerate() {
                for elem in bucket {
                    let hash = hash_of(&set.hasher, elem);
                    assert_eq!(hash % stripes, stripe);
                    assert_eq!(hash % capacity, local * stripes + stripe);
                }
            }
        }
    }

    #[test]
    fn test_stale_resize_is_noop() {
        let set = StripedSet::with_stripes(4, 2, RandomState::new()).unwrap();
        for i in 0..17u32 {
            set.add(i).unwrap();
        }
        assert_eq!(set.capacity(), 8);

        // A thread that observed the old capacity loses the race
        set.resize(4).unwrap();
        assert_eq!(set.capacity(), 8);
        for lock in &set.stripes {
            assert_eq!(lock.lock().len(), 4);
        }
        assert_eq!(set.size(), 17);
        assert!((0..17).all(|i| set.contains(&i)));
    }

    #[test]
    fn test_resize_fills_chains_without_reallocating() {
        let set = StripedSet::with_stripes(4, 2, RandomState::new()).unwrap();
        // The 17th insertion triggers the only resize
        for i in 0..17u32 {
            set.add(i).unwrap();
        }
        assert_eq!(set.capacity(), 8);

        let mut total = 0;
        for lock in &set.stripes {
            let partition = lock.lock();
            assert_eq!(partition.capacity(), partition.len());
            for chain in partition.iter() {
                assert_eq!(chain.capacity(), chain.len());
                total += chain.len();
            }
        }
        assert_eq!(total, 17);
    }

    #[test]
    fn test_concurrent_access() {
        let set = Arc::new(StripedSet::<u64>::new(16).unwrap());
        let mut handles = vec![];

        for i in 0..16u64 {
            let set = set.clone();
            handles.push(thread::spawn(move || {
                for j in 0..1000 {
                    set.add(i * 1000 + j).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(set.size(), 16_000);
        assert!(set.size() <= 4 * set.capacity());
    }
}
