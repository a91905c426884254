//! Per-identity extra allowances.
//!
//! The ledger maps `(identity, pool)` to an `extra_limit` that is added to the
//! pool's base limit. Absent entries mean zero. Entries are overwritten, never
//! accumulated, and the engine only ever raises them.

use crate::{
    error::Result,
    identity::Identity,
    pool::{PoolKey, PoolSpec},
    store::Backing,
};
use std::{collections::BTreeMap, path::PathBuf};

const LEDGER_HEADER: [&str; 3] = ["identity", "pool", "extra_limit"];

type Entries = BTreeMap<(Identity, PoolKey), u64>;

/// One non-default ledger entry.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QuotaEntry {
    pub identity: Identity,
    pub pool: PoolKey,
    pub extra_limit: u64,
}

/// The extra-allowance ledger.
///
/// The file form has one `identity,pool,extra_limit` row per entry and is
/// rewritten in full on every change. Rows with an unparseable identity or
/// limit are dropped on load. Read-modify-write cycles are not synchronized
/// here; callers serialize writers (the engine does so under its gate).
#[derive(Debug)]
pub struct QuotaLedger {
    backing: Backing<Entries>,
}

impl QuotaLedger {
    /// A ledger persisted at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    /// A ledger that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::memory(),
        }
    }

    fn load(&self) -> Result<Entries> {
        self.backing.load(true, |rows| {
            rows.iter()
                .filter_map(|row| {
                    let identity = row.get(0)?.parse().ok()?;
                    let pool = PoolKey::new(row.get(1)?.trim());
                    let extra = row.get(2)?.trim().parse().ok()?;
                    Some(((identity, pool), extra))
                })
                .collect()
        })
    }

    /// The extra allowance of `identity` on `pool` (zero when absent).
    pub fn get_extra(&self, identity: Identity, pool: &PoolKey) -> Result<u64> {
        Ok(self
            .load()?
            .get(&(identity, pool.clone()))
            .copied()
            .unwrap_or(0))
    }

    /// Overwrites the extra allowance of `identity` on `pool`.
    pub fn set_extra(&self, identity: Identity, pool: &PoolKey, value: u64) -> Result<()> {
        let mut entries = self.load()?;
        entries.insert((identity, pool.clone()), value);
        self.backing.store(entries, Some(&LEDGER_HEADER), |entries| {
            entries
                .iter()
                .map(|((identity, pool), extra)| {
                    vec![identity.to_string(), pool.to_string(), extra.to_string()]
                })
                .collect()
        })
    }

    /// Base limit of `pool` plus the extra allowance of `identity`,
    /// saturating at `u64::MAX`.
    pub fn total_allowance(&self, identity: Identity, pool: &PoolSpec) -> Result<u64> {
        Ok(u64::from(pool.base_limit).saturating_add(self.get_extra(identity, &pool.key)?))
    }

    /// Every stored entry, ordered by identity then pool.
    pub fn entries(&self) -> Result<Vec<QuotaEntry>> {
        Ok(self
            .load()?
            .into_iter()
            .map(|((identity, pool), extra_limit)| QuotaEntry {
                identity,
                pool,
                extra_limit,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn absent_entries_default_to_zero() {
        let ledger = QuotaLedger::in_memory();
        assert_eq!(ledger.get_extra(Identity(1), &"vk".into()).unwrap(), 0);
        let spec = PoolSpec::new("vk", "VK", 250);
        assert_eq!(ledger.total_allowance(Identity(1), &spec).unwrap(), 250);
    }

    #[test]
    fn set_extra_overwrites() {
        let ledger = QuotaLedger::in_memory();
        let pool = PoolKey::from("ok");
        ledger.set_extra(Identity(3), &pool, 10).unwrap();
        ledger.set_extra(Identity(3), &pool, 4).unwrap();
        assert_eq!(ledger.get_extra(Identity(3), &pool).unwrap(), 4);
        assert_eq!(ledger.get_extra(Identity(4), &pool).unwrap(), 0);
    }

    #[test]
    fn allowance_saturates() {
        let ledger = QuotaLedger::in_memory();
        let spec = PoolSpec::new("vk", "VK", 250);
        ledger.set_extra(Identity(1), &spec.key, u64::MAX).unwrap();
        assert_eq!(ledger.total_allowance(Identity(1), &spec).unwrap(), u64::MAX);
    }

    #[test]
    fn file_ledger_drops_malformed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_limits.csv");
        fs::write(
            &path,
            "user_id,base_type,extra_limit\n12,telegram,50\nnobody,telegram,5\n13,email,lots\n14\n15,vk,7\n",
        )
        .unwrap();

        let ledger = QuotaLedger::open(&path);
        assert_eq!(
            ledger.entries().unwrap(),
            [
                QuotaEntry {
                    identity: Identity(12),
                    pool: "telegram".into(),
                    extra_limit: 50
                },
                QuotaEntry {
                    identity: Identity(15),
                    pool: "vk".into(),
                    extra_limit: 7
                },
            ]
        );
    }

    #[test]
    fn file_ledger_rewrites_in_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_limits.csv");
        let ledger = QuotaLedger::open(&path);
        ledger.set_extra(Identity(2), &"vk".into(), 250).unwrap();
        ledger.set_extra(Identity(1), &"ok".into(), 5).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "identity,pool,extra_limit\n1,ok,5\n2,vk,250\n"
        );
        assert_eq!(QuotaLedger::open(&path).get_extra(Identity(2), &"vk".into()).unwrap(), 250);
    }
}
