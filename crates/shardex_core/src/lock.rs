//! Async scope lock.
//!
//! A fixed table of binary slots. A scope maps to `hash(scope) % slots`;
//! unrelated scopes that share a slot are serialized, which is harmless.
//! A caller asking for several scopes waits until every slot it needs is
//! free and then takes them all at once, so two callers can never hold
//! parts of each other's sets.

use crate::shard::scope_hash;
use crate::types::ScopeKey;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

struct Slots {
    held: Mutex<Vec<bool>>,
    released: Notify,
}

/// Grants exclusive access to sets of scopes.
#[derive(Clone)]
pub struct ScopeLock {
    slots: Arc<Slots>,
}

impl ScopeLock {
    /// Creates a lock with `slot_count` slots (at least one).
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: Arc::new(Slots {
                held: Mutex::new(vec![false; slot_count.max(1)]),
                released: Notify::new(),
            }),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.held.lock().len()
    }

    /// Slot a scope maps to.
    #[must_use]
    pub fn slot_for(&self, scope: &ScopeKey) -> usize {
        let count = self.slot_count() as u64;
        (scope_hash(scope.as_bytes()) % count) as usize
    }

    /// Distinct slots of a set of scopes, ascending.
    pub fn slots_for<'k>(&self, scopes: impl IntoIterator<Item = &'k ScopeKey>) -> Vec<usize> {
        let count = self.slot_count() as u64;
        scopes
            .into_iter()
            .map(|scope| (scope_hash(scope.as_bytes()) % count) as usize)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of slots currently held.
    #[must_use]
    pub fn held(&self) -> usize {
        self.slots.held.lock().iter().filter(|held| **held).count()
    }

    /// Waits until every slot of `scopes` is free, then takes them together.
    ///
    /// An empty set is granted immediately. Dropping the returned future
    /// before it completes takes nothing.
    pub async fn acquire<'k>(&self, scopes: impl IntoIterator<Item = &'k ScopeKey>) -> ReleaseHandle {
        let wanted = self.slots_for(scopes);
        loop {
            let released = self.slots.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between still wakes us
            released.as_mut().enable();
            if self.try_take(&wanted) {
                tracing::trace!(slots = ?wanted, "scope lock granted");
                return ReleaseHandle::new(self.clone(), wanted);
            }
            released.await;
        }
    }

    /// Takes every slot of `scopes` if all are free right now.
    pub fn try_acquire<'k>(
        &self,
        scopes: impl IntoIterator<Item = &'k ScopeKey>,
    ) -> Option<ReleaseHandle> {
        let wanted = self.slots_for(scopes);
        self.try_take(&wanted)
            .then(|| ReleaseHandle::new(self.clone(), wanted))
    }

    fn try_take(&self, wanted: &[usize]) -> bool {
        let mut held = self.slots.held.lock();
        if wanted.iter().any(|slot| held[*slot]) {
            return false;
        }
        for slot in wanted {
            held[*slot] = true;
        }
        true
    }

    fn release(&self, slots: &[usize]) {
        {
            let mut held = self.slots.held.lock();
            for slot in slots {
                match held.get_mut(*slot) {
                    Some(flag) if *flag => *flag = false,
                    _ => tracing::warn!(slot, "released a scope lock slot that was not held"),
                }
            }
        }
        tracing::trace!(slots = ?slots, "scope lock released");
        self.slots.released.notify_waiters();
    }
}

impl fmt::Debug for ScopeLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeLock")
            .field("slots", &self.slot_count())
            .field("held", &self.held())
            .finish()
    }
}

/// Holds a set of lock slots. Releases them exactly once, on
/// [`ReleaseHandle::release`] or drop.
pub struct ReleaseHandle {
    lock: ScopeLock,
    slots: Vec<usize>,
    released: bool,
}

impl ReleaseHandle {
    fn new(lock: ScopeLock, slots: Vec<usize>) -> Self {
        Self {
            lock,
            slots,
            released: false,
        }
    }

    /// Slots held by this handle.
    #[must_use]
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }

    /// Returns `true` once the slots have been given back.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Gives the slots back. Later calls do nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.lock.release(&self.slots);
        }
    }
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("slots", &self.slots)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn scope(i: u32) -> ScopeKey {
        ScopeKey::from(i.to_be_bytes().to_vec())
    }

    /// Two scopes that land on different slots of `lock`.
    fn disjoint(lock: &ScopeLock) -> (ScopeKey, ScopeKey) {
        let a = scope(0);
        let b = (1..)
            .map(scope)
            .find(|b| lock.slot_for(b) != lock.slot_for(&a))
            .unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn acquire_and_release() {
        let lock = ScopeLock::new(16);
        let mut handle = lock.acquire([&scope(1)]).await;
        assert_eq!(lock.held(), 1);
        handle.release();
        handle.release();
        assert_eq!(lock.held(), 0);
        assert!(handle.is_released());
    }

    #[tokio::test]
    async fn empty_set_is_granted_immediately() {
        let lock = ScopeLock::new(4);
        let handle = lock.acquire(std::iter::empty()).await;
        assert!(handle.slots().is_empty());
    }

    #[tokio::test]
    async fn duplicate_scopes_take_one_slot() {
        let lock = ScopeLock::new(16);
        let a = scope(7);
        let handle = lock.acquire([&a, &a, &a]).await;
        assert_eq!(handle.slots().len(), 1);
    }

    #[tokio::test]
    async fn single_slot_aliases_every_scope() {
        let lock = ScopeLock::new(1);
        let _held = lock.acquire([&scope(1)]).await;
        assert!(lock.try_acquire([&scope(2)]).is_none());
    }

    #[tokio::test]
    async fn disjoint_scopes_do_not_block() {
        let lock = ScopeLock::new(64);
        let (a, b) = disjoint(&lock);
        let _first = lock.acquire([&a]).await;
        let second = timeout(Duration::from_millis(200), lock.acquire([&b])).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn waiter_wakes_on_drop() {
        let lock = ScopeLock::new(64);
        let a = scope(3);
        let first = lock.acquire([&a]).await;

        let waiter = {
            let lock = lock.clone();
            let a = a.clone();
            tokio::spawn(async move {
                let _handle = lock.acquire([&a]).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
        assert_eq!(lock.held(), 0);
    }

    #[tokio::test]
    async fn joint_acquire_takes_all_or_nothing() {
        let lock = ScopeLock::new(64);
        let (a, b) = disjoint(&lock);
        let holding_b = lock.acquire([&b]).await;

        let pending = {
            let lock = lock.clone();
            let (a, b) = (a.clone(), b.clone());
            tokio::spawn(async move { lock.acquire([&a, &b]).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter must not sit on `a` while it waits for `b`
        let only_a = lock.try_acquire([&a]);
        assert!(only_a.is_some());
        drop(only_a);

        drop(holding_b);
        let both = timeout(Duration::from_secs(2), pending).await.unwrap().unwrap();
        assert_eq!(both.slots().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn aliased_scopes_serialize_counter_updates() {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::sync::Arc;

        let lock = ScopeLock::new(8);
        let slot = lock.slot_for(&scope(0));
        let aliases: Vec<ScopeKey> = (0..)
            .map(scope)
            .filter(|s| lock.slot_for(s) == slot)
            .take(4)
            .collect();

        let counter = Arc::new(AtomicU64::new(0));
        let mut tasks = Vec::new();
        for i in 0..64 {
            let lock = lock.clone();
            let counter = Arc::clone(&counter);
            let key = aliases[i % aliases.len()].clone();
            tasks.push(tokio::spawn(async move {
                let _handle = lock.acquire([&key]).await;
                // Split read and write so unguarded updates would be lost
                let seen = counter.load(Ordering::SeqCst);
                tokio::task::yield_now().await;
                counter.store(seen + 1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 64);
        assert_eq!(lock.held(), 0);
    }

    #[tokio::test]
    async fn crossing_sets_never_deadlock() {
        let lock = ScopeLock::new(64);
        let (a, b) = disjoint(&lock);
        let mut tasks = Vec::new();
        for i in 0..50 {
            let lock = lock.clone();
            let (x, y) = if i % 2 == 0 {
                (a.clone(), b.clone())
            } else {
                (b.clone(), a.clone())
            };
            tasks.push(tokio::spawn(async move {
                let _handle = lock.acquire([&x, &y]).await;
                tokio::task::yield_now().await;
            }));
        }
        for task in tasks {
            timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
        }
        assert_eq!(lock.held(), 0);
    }
}
