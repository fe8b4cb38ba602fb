//! Keyed single-flight memoization.
//!
//! At most one loader runs per key at any time. Callers arriving while a
//! load is outstanding block until it finishes and receive the same value or
//! the same error. Loads for other keys proceed independently; the internal
//! lock is never held while a loader runs.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use crate::error::{RegistryError, Result, SchemaError};

struct Flight<V> {
    outcome: Mutex<Option<Result<V>>>,
    done: Condvar,
}

impl<V: Clone> Flight<V> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn wait(&self) -> Result<V> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.done.wait(&mut outcome);
        }
    }

    fn complete(&self, result: Result<V>) {
        let mut outcome = self.outcome.lock();
        if outcome.is_none() {
            *outcome = Some(result);
        }
        self.done.notify_all();
    }
}

/// Completed values plus the loads currently in flight.
pub struct SingleFlight<K, V> {
    values: DashMap<K, V>,
    flights: Mutex<HashMap<K, Arc<Flight<V>>>>,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Completed value for `key`; never waits for an in-flight load
    pub fn get(&self, key: &K) -> Option<V> {
        self.values.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.values.contains_key(key)
    }

    /// Store `value` unless the key already holds one; returns the value the
    /// key ends up holding.
    pub fn insert_if_absent(&self, key: K, value: V) -> V {
        self.values.entry(key).or_insert(value).value().clone()
    }

    /// Return the value for `key`, running `load` if nobody has produced it
    /// yet and joining the outstanding load otherwise.
    pub fn get_or_try_load<F>(&self, key: &K, load: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let flight = {
            let mut flights = self.flights.lock();
            // a leader publishes before retiring its flight, so checking
            // again under the lock cannot miss a finished load
            if let Some(value) = self.get(key) {
                return Ok(value);
            }
            if let Some(flight) = flights.get(key).cloned() {
                drop(flights);
                return flight.wait();
            }
            let flight = Arc::new(Flight::new());
            flights.insert(key.clone(), Arc::clone(&flight));
            flight
        };

        let guard = LeaderGuard {
            owner: self,
            key,
            flight: &flight,
            finished: false,
        };
        let result = load().map(|value| self.insert_if_absent(key.clone(), value));
        guard.finish(result)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop every completed value. Loads in flight are unaffected.
    pub fn clear(&self) {
        self.values.clear();
    }

    fn retire(&self, key: &K) {
        self.flights.lock().remove(key);
    }
}

/// Retires the flight even if the loader unwinds, so waiters never hang.
struct LeaderGuard<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    owner: &'a SingleFlight<K, V>,
    key: &'a K,
    flight: &'a Flight<V>,
    finished: bool,
}

impl<K, V> LeaderGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn finish(mut self, result: Result<V>) -> Result<V> {
        self.finished = true;
        self.owner.retire(self.key);
        self.flight.complete(result.clone());
        result
    }
}

impl<K, V> Drop for LeaderGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        if !self.finished {
            self.owner.retire(self.key);
            self.flight.complete(Err(SchemaError::Registry(RegistryError::Unavailable(
                "schema load was abandoned".to_string(),
            ))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_loads_once_sequentially() {
        let flights: SingleFlight<String, u64> = SingleFlight::new();
        let calls = AtomicUsize::new(0);
        let key = "orders".to_string();

        for _ in 0..3 {
            let value = flights
                .get_or_try_load(&key, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .unwrap();
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_load() {
        let flights: SingleFlight<String, u64> = SingleFlight::new();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(8);
        let key = "orders".to_string();

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    barrier.wait();
                    let value = flights
                        .get_or_try_load(&key, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(50));
                            Ok(7)
                        })
                        .unwrap();
                    assert_eq!(value, 7);
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_callers_share_one_failure() {
        let flights: SingleFlight<String, u64> = SingleFlight::new();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(6);
        let key = "orders".to_string();

        let results: Vec<Result<u64>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..6)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        flights.get_or_try_load(&key, || {
                            calls.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(200));
                            Err(RegistryError::Unavailable("down".into()).into())
                        })
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results
            .iter()
            .all(|r| matches!(r, Err(SchemaError::Registry(RegistryError::Unavailable(_))))));
        assert!(!flights.contains(&key));
    }

    #[test]
    fn test_failure_is_not_cached() {
        let flights: SingleFlight<u32, u32> = SingleFlight::new();

        let err = flights
            .get_or_try_load(&1, || Err(RegistryError::Unavailable("down".into()).into()))
            .unwrap_err();
        assert!(matches!(err, SchemaError::Registry(_)));
        assert!(!flights.contains(&1));

        assert_eq!(flights.get_or_try_load(&1, || Ok(5)).unwrap(), 5);
    }

    #[test]
    fn test_first_value_wins() {
        let flights: SingleFlight<u32, &str> = SingleFlight::new();
        assert_eq!(flights.insert_if_absent(1, "first"), "first");
        assert_eq!(flights.insert_if_absent(1, "second"), "first");
        assert_eq!(flights.get_or_try_load(&1, || Ok("third")).unwrap(), "first");
    }

    #[test]
    fn test_panicking_leader_releases_key() {
        let flights: SingleFlight<u32, u32> = SingleFlight::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = flights.get_or_try_load(&9, || panic!("loader crashed"));
        }));
        assert!(outcome.is_err());
        assert_eq!(flights.get_or_try_load(&9, || Ok(3)).unwrap(), 3);
    }
}
