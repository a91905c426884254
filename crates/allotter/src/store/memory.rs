use super::PoolStore;
use crate::{
    error::Result,
    pool::{PoolKey, PoolSpec},
    record::Record,
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// A process-local store for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryPoolStore {
    pools: RwLock<HashMap<PoolKey, Vec<Record>>>,
}

impl MemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends unclaimed records with the given values to `pool`.
    pub fn seed<I, V>(&self, pool: &PoolKey, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.pools
            .write()
            .entry(pool.clone())
            .or_default()
            .extend(values.into_iter().map(Record::unclaimed));
    }

    /// Copy of the current records of `pool`.
    pub fn snapshot(&self, pool: &PoolKey) -> Vec<Record> {
        self.pools.read().get(pool).cloned().unwrap_or_default()
    }
}

impl PoolStore for MemoryPoolStore {
    fn load(&self, pool: &PoolSpec) -> Result<Vec<Record>> {
        Ok(self.snapshot(&pool.key))
    }

    fn replace(&self, pool: &PoolSpec, records: &[Record]) -> Result<()> {
        self.pools.write().insert(pool.key.clone(), records.to_vec());
        Ok(())
    }
}
