//! Keyed single-flight call coalescing
//!
//! At most one call runs per key. Later callers for the same key attach to
//! the running call and observe its outcome. The slot is cleared when the
//! call finishes, whether it succeeded or failed.

use std::collections::HashMap;
use std::future::{Future, IntoFuture};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::{Error, Result};

/// Outcome shared between every waiter of one call
pub type SharedOutcome<T> = std::result::Result<T, Arc<Error>>;

type SharedCall<T> = Shared<BoxFuture<'static, SharedOutcome<T>>>;

struct Slot<T> {
    id: u64,
    call: SharedCall<T>,
}

struct Slots<T> {
    next_id: u64,
    by_key: HashMap<String, Slot<T>>,
}

/// Registry of in-flight calls keyed by a deterministic signature
pub struct SingleFlight<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                by_key: HashMap::new(),
            })),
        }
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &lock(&self.slots).by_key.len())
            .finish()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the in-flight call for `key`, or start one with `factory`
    ///
    /// The check and the registration happen under one lock, so two callers
    /// in the same scheduling turn cannot both start a call. `factory` runs
    /// under that lock and must not call back into this registry.
    ///
    /// The call is driven on its own task, so it completes (and frees its
    /// slot) even if every waiter is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn acquire<F, Fut>(&self, key: &str, factory: F) -> Pending<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let mut slots = lock(&self.slots);

        if let Some(slot) = slots.by_key.get(key) {
            tracing::debug!(key, "joining in-flight call");
            return Pending {
                call: slot.call.clone(),
                id: slot.id,
                joined: true,
            };
        }

        let id = slots.next_id;
        slots.next_id += 1;

        let registry = Arc::downgrade(&self.slots);
        let owned_key = key.to_string();
        let inner = factory();
        let call = async move {
            let outcome = inner.await.map_err(Arc::new);
            release(&registry, &owned_key, id);
            outcome
        }
        .boxed()
        .shared();

        slots.by_key.insert(
            key.to_string(),
            Slot {
                id,
                call: call.clone(),
            },
        );
        drop(slots);

        tracing::debug!(key, "started call");
        drop(tokio::spawn(call.clone()));

        Pending {
            call,
            id,
            joined: false,
        }
    }

    /// Number of calls currently in flight
    #[must_use]
    pub fn in_flight(&self) -> usize {
        lock(&self.slots).by_key.len()
    }

    /// Whether a call for `key` is in flight
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.slots).by_key.contains_key(key)
    }
}

/// Remove the slot for `key` if it still belongs to call `id`
fn release<T>(registry: &Weak<Mutex<Slots<T>>>, key: &str, id: u64) {
    let Some(slots) = registry.upgrade() else {
        return;
    };
    let mut slots = lock(&slots);
    if slots.by_key.get(key).is_some_and(|slot| slot.id == id) {
        slots.by_key.remove(key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to the eventual outcome of a coalesced call
pub struct Pending<T> {
    call: SharedCall<T>,
    id: u64,
    joined: bool,
}

impl<T> Pending<T> {
    /// Whether this handle attached to a call started by someone else
    #[must_use]
    pub const fn joined(&self) -> bool {
        self.joined
    }

    /// Identity of the underlying call; equal for every handle that shares it
    /// and never reused by this registry
    #[must_use]
    pub const fn call_id(&self) -> u64 {
        self.id
    }
}

impl<T> IntoFuture for Pending<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        self.call.map(|outcome| outcome.map_err(Error::Shared)).boxed()
    }
}
