//! Durable storage of record pools.
//!
//! The engine only ever loads a whole pool and replaces a whole pool; there is
//! no row-level update primitive. Every mutation is therefore atomic from the
//! store's point of view, at the cost of O(pool size) work per mutation.

mod csv_store;
mod memory;
mod table;

pub use csv_store::*;
pub use memory::*;
pub(crate) use table::*;

use crate::{error::Result, pool::PoolSpec, record::Record};

/// Load/replace access to record pools.
///
/// Implementations must make [`PoolStore::replace`] all-or-nothing: a
/// concurrent [`PoolStore::load`] observes either the previous or the new
/// record set, never a mix.
pub trait PoolStore: Send + Sync {
    /// Returns the records of `pool` in storage order. A pool that was never
    /// written is empty.
    fn load(&self, pool: &PoolSpec) -> Result<Vec<Record>>;

    /// Overwrites the full record set of `pool`.
    fn replace(&self, pool: &PoolSpec, records: &[Record]) -> Result<()>;
}

impl<S: PoolStore + ?Sized> PoolStore for std::sync::Arc<S> {
    fn load(&self, pool: &PoolSpec) -> Result<Vec<Record>> {
        (**self).load(pool)
    }

    fn replace(&self, pool: &PoolSpec, records: &[Record]) -> Result<()> {
        (**self).replace(pool, records)
    }
}
