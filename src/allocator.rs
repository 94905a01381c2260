//! Sequential identifier allocation with optimistic, bounded retry.
//!
//! The allocator keeps no counter of its own. Every attempt recomputes the next number from
//! the greatest identifier currently stored under the namespace prefix, formats a candidate
//! and checks that nobody holds it yet. A taken candidate means another writer got there in
//! between, so the allocator backs off and tries again, up to `max_attempts` times.
//!
//! Resolving, probing and the caller's eventual insert are not atomic. Two allocators can
//! hand out the same candidate; the storage engine's unique insert ([`insert_new`]) is what
//! turns that race into a [`ShelfError::DuplicateKey`] instead of a shared identifier.
//!
//! [`insert_new`]: ../engine/trait.CatalogEngine.html#tymethod.insert_new
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, trace, warn};

use crate::engine::CatalogEngine;
use crate::identifier::{format_identifier, parse_suffix, SequenceNamespace};
use crate::{Result, ShelfError};

/// default number of resolve/probe cycles before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// default pause between two attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(10);

/// The storage reads the allocator needs.
///
/// Every [`CatalogEngine`] provides them through its ordered key index.
pub trait SequenceStore {
    /// returns the lexicographically greatest identifier starting with `prefix`
    fn max_identifier(&self, prefix: &str) -> Result<Option<String>>;

    /// returns true if some record currently holds exactly `identifier`
    fn exists(&self, identifier: &str) -> Result<bool>;
}

impl<E: CatalogEngine> SequenceStore for E {
    fn max_identifier(&self, prefix: &str) -> Result<Option<String>> {
        self.last_key_with_prefix(prefix)
    }

    fn exists(&self, identifier: &str) -> Result<bool> {
        self.contains(identifier)
    }
}

/// How long to wait after a candidate turned out to be taken.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Backoff {
    /// always wait the same amount of time
    Fixed(Duration),
    /// double the wait after every conflict, starting at `base` and capped at `max`, with a
    /// random jitter of up to half the current wait added on top
    Exponential {
        /// the wait after the first conflict
        base: Duration,
        /// upper bound of the wait before jitter
        max: Duration,
    },
    /// retry immediately
    None,
}

impl Backoff {
    /// the pause to take after the `attempt`-th conflict (1 based)
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let shift = attempt.saturating_sub(1).min(16);
                let delay = base.saturating_mul(1 << shift).min(max);
                let jitter_ceiling = u64::try_from(delay.as_micros() / 2).unwrap_or(u64::MAX);
                let jitter = if jitter_ceiling == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=jitter_ceiling)
                };
                delay.saturating_add(Duration::from_micros(jitter))
            }
            Backoff::None => Duration::from_millis(0),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(DEFAULT_BACKOFF)
    }
}

/// Tunables of an [`Allocator`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// resolve/probe cycles allowed per allocation, must be at least 1
    pub max_attempts: u32,
    /// pause between cycles
    pub backoff: Backoff,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

/// Produces identifiers that were unused at the time they were returned.
///
/// The allocator is stateless between calls, so one instance can be shared freely between
/// threads.
///
/// # Example
/// ```rust
/// use std::path::Path;
/// use shelf::{Allocator, KvStore, SequenceNamespace};
/// # fn main() -> shelf::Result<()> {
/// let store = KvStore::open(Path::new("."))?;
/// let ns = SequenceNamespace::new("IRO-2025-");
/// let id = Allocator::default().allocate(&store, &ns)?;
/// assert_eq!(id, "IRO-2025-000001");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Copy, Clone)]
pub struct Allocator {
    config: AllocatorConfig,
}

impl Allocator {
    /// creates an allocator with the given `config`
    pub fn new(config: AllocatorConfig) -> Self {
        Allocator { config }
    }

    /// the configuration this allocator runs with
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// returns an identifier in `namespace` that no record held when it was probed.
    ///
    /// The identifier is not reserved. Callers must insert it with a unique insert and be
    /// prepared for a [`ShelfError::DuplicateKey`] if a concurrent writer took it first.
    ///
    /// # Errors
    /// - storage errors from resolving or probing are returned as they are, without retry
    /// - [`ShelfError::AllocationExhausted`] once `max_attempts` candidates were all taken
    /// - [`ShelfError::CorruptIdentifier`] if the greatest stored identifier has no numeric suffix
    #[instrument(skip(self, store), fields(prefix = namespace.prefix()))]
    pub fn allocate<S: SequenceStore + ?Sized>(
        &self,
        store: &S,
        namespace: &SequenceNamespace,
    ) -> Result<String> {
        let mut attempts = 0;
        while attempts < self.config.max_attempts {
            let number = resolve_next(store, namespace)?;
            let candidate = format_identifier(namespace, number);
            if !probe(store, &candidate)? {
                debug!(%candidate, attempts, "allocated identifier");
                return Ok(candidate);
            }

            attempts += 1;
            debug!(%candidate, attempts, "candidate already taken, retrying");
            let delay = self.config.backoff.delay(attempts);
            if attempts < self.config.max_attempts && !delay.is_zero() {
                thread::sleep(delay);
            }
        }

        warn!(attempts, "identifier allocation exhausted");
        Err(ShelfError::AllocationExhausted {
            prefix: namespace.prefix().to_string(),
            attempts,
        })
    }
}

/// returns the number following the greatest identifier stored in `namespace`, or 1 if the
/// namespace is empty.
///
/// Storage errors are propagated unchanged.
pub fn resolve_next<S: SequenceStore + ?Sized>(store: &S, namespace: &SequenceNamespace) -> Result<u64> {
    match store.max_identifier(namespace.prefix())? {
        Some(max) => {
            let suffix = parse_suffix(namespace, &max).ok_or_else(|| ShelfError::CorruptIdentifier(max.clone()))?;
            trace!(%max, suffix, "resolved greatest identifier");
            suffix
                .checked_add(1)
                .ok_or(ShelfError::CorruptIdentifier(max))
        }
        None => Ok(1),
    }
}

/// returns true if `candidate` is currently held by a record
pub fn probe<S: SequenceStore + ?Sized>(store: &S, candidate: &str) -> Result<bool> {
    store.exists(candidate)
}
