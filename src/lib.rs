/*!
 * Concurrent Hash Set Library
 *
 * Four chained hash sets with identical semantics and increasingly
 * fine-grained locking: sequential, coarse-grained, striped, refinable.
 */

pub mod config;
pub mod errors;
pub mod logging;
pub mod set;
pub mod sync;

// Re-exports
pub use config::{SetConfig, SetKind};
pub use errors::{SetError, SetResult};
pub use logging::init_tracing;
pub use set::{CoarseGrainedSet, RefinableSet, SequentialSet, Set, StripedSet, LOAD_FACTOR};
