use crate::{
    error::Result,
    identity::{Identity, IdentityStatus},
    store::Backing,
};
use std::{collections::BTreeMap, path::PathBuf};

const STATUS_HEADER: [&str; 2] = ["identity", "status"];

type Statuses = BTreeMap<Identity, IdentityStatus>;

/// Identity eligibility book (`identity,status` rows, rewritten in full).
///
/// Rows with an unparseable identity or an unknown status are dropped on
/// load. Like the quota ledger, writers are serialized by the caller.
#[derive(Debug)]
pub struct StatusBook {
    backing: Backing<Statuses>,
}

impl StatusBook {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::File(path.into()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            backing: Backing::memory(),
        }
    }

    fn load(&self) -> Result<Statuses> {
        self.backing.load(true, |rows| {
            rows.iter()
                .filter_map(|row| Some((row.get(0)?.parse().ok()?, row.get(1)?.parse().ok()?)))
                .collect()
        })
    }

    fn save(&self, statuses: Statuses) -> Result<()> {
        self.backing.store(statuses, Some(&STATUS_HEADER), |statuses| {
            statuses
                .iter()
                .map(|(identity, status)| vec![identity.to_string(), status.to_string()])
                .collect()
        })
    }

    /// Current status, `None` for an identity never seen.
    pub fn get(&self, identity: Identity) -> Result<Option<IdentityStatus>> {
        Ok(self.load()?.get(&identity).copied())
    }

    pub fn set(&self, identity: Identity, status: IdentityStatus) -> Result<()> {
        let mut statuses = self.load()?;
        statuses.insert(identity, status);
        self.save(statuses)
    }

    pub fn is_approved(&self, identity: Identity) -> Result<bool> {
        Ok(self.get(identity)? == Some(IdentityStatus::Approved))
    }

    /// Every known identity with its status.
    pub fn entries(&self) -> Result<Vec<(Identity, IdentityStatus)>> {
        Ok(self.load()?.into_iter().collect())
    }
}
