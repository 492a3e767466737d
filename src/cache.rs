//! Thread-safe memoizing cache with per-key single-flight fills.

use core::borrow::Borrow;
use core::fmt;
use core::hash::Hash;
use std::collections::HashMap;
use std::sync::PoisonError;

cfg_if::cfg_if! {
    if #[cfg(feature = "check-loom")] {
        use loom::sync::{Arc, Mutex, MutexGuard};
    } else {
        use std::sync::{Arc, Mutex, MutexGuard};
    }
}

use tracing::{debug, trace};

/// Result of the last completed fill of an entry. `None` until a fill returns.
type Slot<V, E> = Option<Result<V, E>>;

/// Per-key cell. Its lock guards the slot and serializes fills for the key.
struct Entry<V, E> {
    slot: Mutex<Slot<V, E>>,
}

impl<V, E> Entry<V, E> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Locks the slot. A filler that panicked never wrote to the slot, so the guard is recovered
    /// from a poisoned lock as-is.
    fn lock(&self) -> MutexGuard<'_, Slot<V, E>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cache that remembers the result of `filler` for each key, forever.
///
/// On a miss, [`get`](Cache::get) calls the filler to compute the value. Concurrent lookups of the
/// same key share one fill: the caller that creates the entry runs the filler while holding the
/// entry's lock, and the others wait on that lock. Lookups of different keys only contend on the
/// table lock, which is never held while a filler runs.
///
/// Errors from the filler are returned verbatim. With `retry_errors` unset, an error is cached like
/// a value and the filler is never called again for that key. With `retry_errors` set, the next
/// lookup of the key calls the filler again, until it succeeds.
///
/// ```
/// use genericache::Cache;
///
/// let cache = Cache::new(|i: &u32| Ok::<_, ()>(format!("{} => {}", i, i + 5)), false);
/// assert_eq!(cache.get(1).as_deref(), Ok("1 => 6"));
/// assert_eq!(cache.get(2).as_deref(), Ok("2 => 7"));
/// ```
pub struct Cache<K, V, E, F> {
    table: Mutex<HashMap<K, Arc<Entry<V, E>>>>,
    filler: F,
    retry_errors: bool,
}

impl<K, V, E, F> Cache<K, V, E, F>
where
    K: Eq + Hash + Clone,
    V: Clone,
    E: Clone,
    F: Fn(&K) -> Result<V, E>,
{
    /// Creates an empty cache that calls `filler` on a miss, and again on a cached error if
    /// `retry_errors` is set.
    pub fn new(filler: F, retry_errors: bool) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            filler,
            retry_errors,
        }
    }

    /// Returns the cached result for `key`, calling the filler if there is none yet (or if the
    /// cached result is an error and errors are retried).
    ///
    /// Blocks while another thread is filling the same key. Never blocks on fills of other keys.
    pub fn get(&self, key: K) -> Result<V, E> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);

        let existing = table.get(&key).cloned();
        if let Some(entry) = existing {
            drop(table);

            // Waits for an in-flight fill, if any.
            let slot = entry.lock();
            match &*slot {
                Some(Ok(v)) => {
                    trace!("cache hit");
                    return Ok(v.clone());
                }
                Some(Err(e)) if !self.retry_errors => {
                    trace!("cache hit on stored error");
                    return Err(e.clone());
                }
                _ => {}
            }
            return self.fill(&key, slot);
        }

        // The new entry is locked before anyone else can see it in the table.
        let entry = Arc::new(Entry::new());
        let slot = entry.lock();
        table.insert(key.clone(), Arc::clone(&entry));
        drop(table);
        self.fill(&key, slot)
    }

    /// Runs the filler under the entry lock and stores its result.
    fn fill(&self, key: &K, mut slot: MutexGuard<'_, Slot<V, E>>) -> Result<V, E> {
        debug!(refill = slot.is_some(), "filling cache entry");
        let result = (self.filler)(key);
        if result.is_err() {
            debug!(retry_errors = self.retry_errors, "filler returned an error");
        }
        *slot = Some(result.clone());
        result
    }
}

impl<K, V, E, F> Cache<K, V, E, F>
where
    K: Eq + Hash,
{
    /// Returns whether errors returned by the filler are retried on the next lookup.
    pub fn retries_errors(&self) -> bool {
        self.retry_errors
    }

    /// Returns the number of keys looked up so far, including the ones still being filled.
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no key has been looked up yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether `key` has been looked up before. Never calls the filler.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl<K, V, E, F> fmt::Debug for Cache<K, V, E, F>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.len())
            .field("retry_errors", &self.retry_errors)
            .finish_non_exhaustive()
    }
}
