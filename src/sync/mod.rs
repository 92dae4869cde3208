/*!
 * Lock-Based Synchronization Helpers
 *
 * - Ordered multi-lock acquisition (deadlock-free stripe-wide critical sections)
 */

mod ordered;

pub use ordered::{GuardedIterMut, OrderedGuard};
