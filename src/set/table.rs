/*!
 * Bucket Table
 * Linear-chaining storage shared by every set variant
 */

use crate::errors::{SetError, SetResult};
use std::hash::{BuildHasher, Hash};

/// Maximum average bucket length before the table doubles
pub const LOAD_FACTOR: usize = 4;

/// Unordered chain of distinct elements
pub(crate) type Bucket<T> = Vec<T>;

#[inline]
pub(crate) fn hash_of<T: Hash, S: BuildHasher>(hasher: &S, elem: &T) -> usize {
    hasher.hash_one(elem) as usize
}

#[inline]
pub(crate) fn is_overloaded(size: usize, capacity: usize) -> bool {
    size > LOAD_FACTOR.saturating_mul(capacity)
}

pub(crate) fn check_capacity(initial_capacity: usize) -> SetResult<()> {
    if initial_capacity == 0 {
        return Err(SetError::invalid("initial capacity must be at least 1"));
    }
    Ok(())
}

/// Next capacity, or `OutOfMemory` when doubling would overflow
pub(crate) fn doubled(capacity: usize) -> SetResult<usize> {
    capacity
        .checked_mul(2)
        .ok_or_else(SetError::capacity_overflow)
}

/// Allocate `count` slots up front so growth failures surface as errors
pub(crate) fn alloc_slots<B>(count: usize, mut make: impl FnMut() -> B) -> SetResult<Vec<B>> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(count)
        .map_err(|e| SetError::from_reserve(count, e))?;
    slots.extend((0..count).map(|_| make()));
    Ok(slots)
}

/// New bucket index of every element, in iteration order
///
/// `count` must be the number of elements `elems` yields.
pub(crate) fn destinations<'e, T: 'e>(
    elems: impl Iterator<Item = &'e T>,
    count: usize,
    new_capacity: usize,
    hash: impl Fn(&T) -> usize,
) -> SetResult<Vec<usize>> {
    let mut indices = Vec::new();
    indices
        .try_reserve_exact(count)
        .map_err(|e| SetError::from_reserve(new_capacity, e))?;
    indices.extend(elems.map(|elem| hash(elem) % new_capacity));
    Ok(indices)
}

/// Empty chains for a rehash, each reserved for the elements routed to it
///
/// Moving elements into these chains afterwards never allocates.
pub(crate) fn alloc_chains<T>(new_capacity: usize, indices: &[usize]) -> SetResult<Vec<Bucket<T>>> {
    let mut lengths = alloc_slots(new_capacity, || 0usize)?;
    for &index in indices {
        lengths[index] += 1;
    }

    let mut chains = alloc_slots(new_capacity, Vec::new)?;
    for (chain, length) in chains.iter_mut().zip(lengths) {
        chain
            .try_reserve_exact(length)
            .map_err(|e| SetError::from_reserve(new_capacity, e))?;
    }
    Ok(chains)
}

#[inline]
pub(crate) fn bucket_contains<T: Eq>(bucket: &[T], elem: &T) -> bool {
    bucket.iter().any(|e| e == elem)
}

/// Append `elem` unless an equal element is already chained
#[inline]
pub(crate) fn bucket_insert<T: Eq>(bucket: &mut Bucket<T>, elem: T) -> bool {
    if bucket_contains(bucket, &elem) {
        return false;
    }
    bucket.push(elem);
    true
}

#[inline]
pub(crate) fn bucket_remove<T: Eq>(bucket: &mut Bucket<T>, elem: &T) -> bool {
    match bucket.iter().position(|e| e == elem) {
        Some(pos) => {
            bucket.swap_remove(pos);
            true
        }
        None => false,
    }
}

/// Single chained table with its element count
///
/// Used as-is by the sequential and coarse-grained sets, which serialize all
/// access externally.
#[derive(Debug)]
pub(crate) struct Table<T> {
    buckets: Vec<Bucket<T>>,
    size: usize,
}

impl<T: Eq> Table<T> {
    pub(crate) fn new(capacity: usize) -> SetResult<Self> {
        check_capacity(capacity)?;
        Ok(Self {
            buckets: alloc_slots(capacity, Vec::new)?,
            size: 0,
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn bucket(&self, hash: usize) -> &Bucket<T> {
        &self.buckets[hash % self.buckets.len()]
    }

    #[inline]
    fn bucket_mut(&mut self, hash: usize) -> &mut Bucket<T> {
        let capacity = self.buckets.len();
        &mut self.buckets[hash % capacity]
    }

    pub(crate) fn insert(&mut self, hash: usize, elem: T) -> bool {
        let inserted = bucket_insert(self.bucket_mut(hash), elem);
        if inserted {
            self.size += 1;
        }
        inserted
    }

    pub(crate) fn remove(&mut self, hash: usize, elem: &T) -> bool {
        let removed = bucket_remove(self.bucket_mut(hash), elem);
        if removed {
            self.size -= 1;
        }
        removed
    }

    pub(crate) fn contains(&self, hash: usize, elem: &T) -> bool {
        bucket_contains(self.bucket(hash), elem)
    }

    #[inline]
    pub(crate) fn is_overloaded(&self) -> bool {
        is_overloaded(self.size, self.capacity())
    }

    /// Rehash every element into a fresh table of twice the capacity
    ///
    /// The new bucket array and every chain in it are reserved before anything
    /// moves, so on failure the table is left untouched.
    pub(crate) fn grow(&mut self, hash: impl Fn(&T) -> usize) -> SetResult<usize> {
        let new_capacity = doubled(self.capacity())?;
        let indices = destinations(self.buckets.iter().flatten(), self.size, new_capacity, hash)?;
        let mut fresh: Vec<Bucket<T>> = alloc_chains(new_capacity, &indices)?;

        let elems = std::mem::take(&mut self.buckets).into_iter().flatten();
        for (elem, index) in elems.zip(indices) {
            fresh[index].push(elem);
        }

        self.buckets = fresh;
        Ok(new_capacity)
    }
}
