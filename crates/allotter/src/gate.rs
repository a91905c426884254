//! Mutual exclusion for mutating operations.
//!
//! Two layers:
//! - [`Gate`]: one lock shared by every pool. Every load-mutate-replace cycle
//!   runs under it, so two allocations can never claim the same record and no
//!   pool file is ever written by two operations at once.
//! - [`InFlight`]: a set of `(identity, pool)` pairs with a request currently
//!   running. A second request for a pair that is already present is turned
//!   away before it reaches the gate. It only saves work; the gate alone is
//!   what keeps pools consistent.

use crate::{
    error::{Error, Result},
    identity::Identity,
    pool::PoolKey,
};
use parking_lot::{Mutex, MutexGuard};
use std::{collections::HashSet, sync::Arc};

/// The single cross-pool mutation lock.
///
/// Not reentrant: code running under a [`GateGuard`] must not call back into
/// anything that acquires the gate again.
#[derive(Debug, Default)]
pub struct Gate {
    lock: Mutex<()>,
}

/// Proof that the gate is held. Released on drop.
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the gate is free.
    pub fn enter(&self) -> GateGuard<'_> {
        GateGuard {
            _guard: self.lock.lock(),
        }
    }

    pub fn is_held(&self) -> bool {
        self.lock.is_locked()
    }
}

type Key = (Identity, PoolKey);

/// Registry of `(identity, pool)` pairs with a request in flight.
///
/// Cloning yields a handle to the same registry.
#[derive(Clone, Debug, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<Key>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `(identity, pool)` as in flight.
    ///
    /// Fails with [`Error::RequestInProgress`] when the pair is already
    /// marked. The mark is removed when the returned guard is dropped, on
    /// every exit path of the caller including unwinding.
    pub fn try_begin(&self, identity: Identity, pool: &PoolKey) -> Result<InFlightGuard> {
        let key = (identity, pool.clone());
        if !self.active.lock().insert(key.clone()) {
            #[cfg(feature = "tracing")]
            tracing::debug!(%identity, %pool, "duplicate request rejected");
            return Err(Error::RequestInProgress {
                identity,
                pool: pool.clone(),
            });
        }
        Ok(InFlightGuard {
            active: Arc::clone(&self.active),
            key: Some(key),
        })
    }

    pub fn contains(&self, identity: Identity, pool: &PoolKey) -> bool {
        self.active.lock().contains(&(identity, pool.clone()))
    }

    /// Number of requests currently marked.
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owned in-flight mark. Can be moved across tasks and threads.
#[must_use = "the in-flight mark is cleared as soon as the guard is dropped"]
#[derive(Debug)]
pub struct InFlightGuard {
    active: Arc<Mutex<HashSet<Key>>>,
    key: Option<Key>,
}

impl InFlightGuard {
    pub fn identity(&self) -> Option<Identity> {
        self.key.as_ref().map(|(identity, _)| *identity)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.active.lock().remove(&key);
        }
    }
}
