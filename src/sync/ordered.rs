/*!
 * Ordered Multi-Lock Guard
 * Acquires a whole lock array in ascending index order
 */

use parking_lot::{Mutex, MutexGuard};
use std::iter::Map;
use std::slice::IterMut;

/// Iterator over the values behind an [`OrderedGuard`]
pub type GuardedIterMut<'g, 'a, T> =
    Map<IterMut<'g, MutexGuard<'a, T>>, fn(&'g mut MutexGuard<'a, T>) -> &'g mut T>;

fn guarded_value<'g, T>(guard: &'g mut MutexGuard<'_, T>) -> &'g mut T {
    &mut **guard
}

/// RAII guard holding every lock of an array
///
/// # Deadlock Freedom
///
/// Locks are always taken from index 0 upward, so two threads acquiring the
/// same array (or any thread holding a single element of it) can never wait
/// on each other in a cycle. Guards are released in reverse order on every
/// exit path, including early returns from an abandoned resize.
///
/// # Example
///
/// ```
/// use concurrent_hashset::sync::OrderedGuard;
/// use parking_lot::Mutex;
///
/// let stripes: Vec<Mutex<u32>> = (0..4).map(Mutex::new).collect();
/// let mut all = OrderedGuard::lock_all(&stripes);
/// for value in all.iter_mut() {
///     *value += 1;
/// }
/// drop(all);
/// assert_eq!(*stripes[3].lock(), 4);
/// ```
pub struct OrderedGuard<'a, T> {
    guards: Vec<MutexGuard<'a, T>>,
}

impl<'a, T> OrderedGuard<'a, T> {
    /// Block until every lock in `locks` is held
    pub fn lock_all(locks: &'a [Mutex<T>]) -> Self {
        let mut guards = Vec::with_capacity(locks.len());
        for lock in locks {
            guards.push(lock.lock());
        }
        Self { guards }
    }

    /// Number of locks held
    #[inline]
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    /// Mutable access to each guarded value, in lock order
    pub fn iter_mut<'g>(&'g mut self) -> GuardedIterMut<'g, 'a, T> {
        self.guards.iter_mut().map(guarded_value as fn(&'g mut MutexGuard<'a, T>) -> &'g mut T)
    }
}

impl<T> Drop for OrderedGuard<'_, T> {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_holds_every_lock() {
        let locks: Vec<Mutex<usize>> = (0..8).map(Mutex::new).collect();
        let all = OrderedGuard::lock_all(&locks);

        assert_eq!(all.len(), 8);
        assert!(locks.iter().all(|lock| lock.try_lock().is_none()));

        drop(all);
        assert!(locks.iter().all(|lock| lock.try_lock().is_some()));
    }

    #[test]
    fn test_released_on_early_return() {
        fn abandon(locks: &[Mutex<usize>]) -> Option<usize> {
            let all = OrderedGuard::lock_all(locks);
            if all.len() > 1 {
                return None;
            }
            Some(all.len())
        }

        let locks: Vec<Mutex<usize>> = (0..3).map(Mutex::new).collect();
        assert_eq!(abandon(&locks), None);
        assert!(locks.iter().all(|lock| lock.try_lock().is_some()));
    }

    #[test]
    fn test_iter_mut_borrows_only_the_guard() {
        let locks: Vec<Mutex<String>> = (0..3).map(|i| Mutex::new(i.to_string())).collect();
        let mut all = OrderedGuard::lock_all(&locks);

        // Each call reborrows the guard, and the lock array outlives both
        for value in all.iter_mut() {
            value.push('!');
        }
        let joined: Vec<&mut String> = all.iter_mut().collect();
        assert_eq!(joined.len(), 3);
        assert_eq!(joined[2].as_str(), "2!");
        drop(all);

        assert_eq!(locks[0].lock().as_str(), "0!");
    }

    #[test]
    fn test_concurrent_lock_all_no_deadlock() {
        let locks: Arc<Vec<Mutex<usize>>> = Arc::new((0..16).map(|_| Mutex::new(0)).collect());
        let mut handles = vec![];

        for i in 0..8 {
            let locks = locks.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    if i % 2 == 0 {
                        let mut all = OrderedGuard::lock_all(&locks);
                        all.iter_mut().for_each(|v| *v += 1);
                    } else {
                        *locks[i].lock() += 1;
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let total: usize = locks.iter().map(|lock| *lock.lock()).sum();
        assert_eq!(total, 4 * 200 * 16 + 4 * 200);
    }
}
