/*!
 * Hash Set Implementations
 *
 * One contract, four locking disciplines:
 * - Sequential: no synchronization, the correctness reference
 * - Coarse-grained: one mutex serializes everything
 * - Striped: fixed stripe locks, all taken in order to resize
 * - Refinable: per-bucket locks that grow with the table, behind a resize RwLock
 *
 * # Resizing
 *
 * Every variant doubles its capacity once `size > LOAD_FACTOR * capacity`.
 * The concurrent variants decide to resize from an unsynchronized read of the
 * counters, then re-validate the capacity once the resize locks are held so
 * that exactly one of several racing threads performs each doubling.
 */

mod coarse;
mod refinable;
mod sequential;
mod striped;
mod table;

pub use coarse::CoarseGrainedSet;
pub use refinable::RefinableSet;
pub use sequential::SequentialSet;
pub use striped::StripedSet;
pub use table::LOAD_FACTOR;

use crate::config::SetKind;
use crate::errors::SetResult;

/// Operations every set variant provides with identical sequential semantics
pub trait Set<T> {
    /// Insert `elem` if absent
    ///
    /// Returns `Ok(true)` if inserted, `Ok(false)` if an equal element was
    /// already present. An error means a triggered resize could not allocate;
    /// the element stays inserted and the previous table stays in place.
    fn add(&self, elem: T) -> SetResult<bool>;

    /// Delete `elem` if present; returns whether it was removed
    fn remove(&self, elem: &T) -> bool;

    /// Membership test
    fn contains(&self, elem: &T) -> bool;

    /// Element count (a snapshot under concurrency)
    fn size(&self) -> usize;

    /// Current bucket count (a snapshot under concurrency)
    fn capacity(&self) -> usize;

    /// Which implementation this is
    fn kind(&self) -> SetKind;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
