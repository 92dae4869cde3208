/*!
 * Hash Set Workload Driver
 *
 * Runs a mixed add/contains/remove workload against each set variant, then
 * checks the quiescent invariants and reports throughput.
 *
 * Environment variables:
 * - HASHSET_CONFIG: JSON `SetConfig` used as the base configuration
 * - HASHSET_KIND: run a single variant (default: all four)
 * - HASHSET_CAPACITY / HASHSET_STRIPES: sizing when no JSON config is given
 * - HASHSET_THREADS: worker threads (default: available parallelism)
 * - HASHSET_OPS: keys per worker (default: 100000)
 */

use concurrent_hashset::{init_tracing, Set, SetConfig, SetError, SetKind, SetResult, LOAD_FACTOR};
use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{error, info};

type DriverResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Driver settings resolved from the environment
struct Workload {
    base: SetConfig,
    kinds: Vec<SetKind>,
    threads: usize,
    keys_per_thread: u64,
}

fn env_or<T: FromStr>(name: &str, default: T) -> SetResult<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SetError::invalid(format!("{} has invalid value '{}'", name, raw))),
        Err(_) => Ok(default),
    }
}

impl Workload {
    fn from_env() -> SetResult<Self> {
        let mut base = match std::env::var("HASHSET_CONFIG") {
            Ok(json) => SetConfig::from_json(&json)?,
            Err(_) => SetConfig::default(),
        };
        base.initial_capacity = env_or("HASHSET_CAPACITY", base.initial_capacity)?;
        if let Ok(raw) = std::env::var("HASHSET_STRIPES") {
            base.stripes = Some(raw.trim().parse().map_err(|_| {
                SetError::invalid(format!("HASHSET_STRIPES has invalid value '{}'", raw))
            })?);
        }

        let kinds = match std::env::var("HASHSET_KIND") {
            Ok(raw) => vec![raw.parse()?],
            Err(_) => SetKind::ALL.to_vec(),
        };

        let default_threads = thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self::new(
            base,
            kinds,
            env_or("HASHSET_THREADS", default_threads)?,
            env_or("HASHSET_OPS", 100_000)?,
        )
    }

    /// Reject workloads whose key blocks would not fit in `u64`
    fn new(base: SetConfig, kinds: Vec<SetKind>, threads: usize, keys_per_thread: u64) -> SetResult<Self> {
        if threads == 0 {
            return Err(SetError::invalid("HASHSET_THREADS must be at least 1"));
        }
        let total_keys = (threads as u64).checked_mul(keys_per_thread);
        if total_keys.is_none() {
            return Err(SetError::invalid(format!(
                "{} threads x {} keys overflows the u64 key space",
                threads, keys_per_thread
            )));
        }

        Ok(Self {
            base,
            kinds,
            threads,
            keys_per_thread,
        })
    }

    /// Elements left after every block keeps only its odd offsets
    fn expected_size(&self) -> usize {
        self.threads * (self.keys_per_thread / 2) as usize
    }
}

/// Insert a block of keys, delete the even offsets, and verify membership
///
/// `first + len` must not overflow, which `Workload::new` guarantees.
fn run_block(set: &dyn Set<u64>, first: u64, len: u64) -> DriverResult<()> {
    for key in first..first + len {
        if !set.add(key)? {
            return Err(format!("key {} reported as already present", key).into());
        }
    }
    for key in (first..first + len).step_by(2) {
        if !set.remove(&key) {
            return Err(format!("key {} missing on remove", key).into());
        }
    }
    for key in first..first + len {
        let expected = (key - first) % 2 == 1;
        if set.contains(&key) != expected {
            return Err(format!("key {} membership is {}, expected {}", key, !expected, expected).into());
        }
    }
    Ok(())
}

fn run(kind: SetKind, workload: &Workload) -> DriverResult<()> {
    let config = SetConfig {
        kind,
        ..workload.base.clone()
    };
    let per_thread = workload.keys_per_thread;
    let start = Instant::now();

    let (size, capacity) = if kind.is_concurrent() {
        let set: Arc<dyn Set<u64> + Send + Sync> = Arc::from(config.build::<u64>()?);
        let handles: Vec<_> = (0..workload.threads as u64)
            .map(|t| {
                let set = set.clone();
                thread::spawn(move || run_block(&*set, t * per_thread, per_thread))
            })
            .collect();

        for handle in handles {
            handle
                .join()
                .map_err(|_| format!("{} worker panicked", kind))??;
        }
        (set.size(), set.capacity())
    } else {
        let set = config.build_local::<u64>()?;
        for t in 0..workload.threads as u64 {
            run_block(&*set, t * per_thread, per_thread)?;
        }
        (set.size(), set.capacity())
    };

    let elapsed = start.elapsed();
    let operations = workload.threads as f64 * per_thread as f64 * 2.5;
    let mops = operations / elapsed.as_secs_f64().max(f64::EPSILON) / 1e6;

    if size != workload.expected_size() {
        return Err(format!("{}: size {} != expected {}", kind, size, workload.expected_size()).into());
    }
    if size > LOAD_FACTOR * capacity {
        return Err(format!("{}: load factor exceeded ({} elements, {} buckets)", kind, size, capacity).into());
    }

    info!(
        kind = %kind,
        threads = workload.threads,
        keys_per_thread = per_thread,
        size,
        capacity,
        elapsed_ms = elapsed.as_millis() as u64,
        mops = %format!("{:.2}", mops),
        "workload complete"
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    init_tracing();

    let workload = Workload::from_env()?;
    info!(
        kinds = ?workload.kinds,
        threads = workload.threads,
        keys_per_thread = workload.keys_per_thread,
        initial_capacity = workload.base.initial_capacity,
        "Hash set driver starting"
    );

    let mut failures = 0;
    for kind in &workload.kinds {
        if let Err(e) = run(*kind, &workload) {
            error!(kind = %kind, error = %e, "workload failed");
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(format!("{} of {} workloads failed", failures, workload.kinds.len()).into());
    }
    Ok(())
}
