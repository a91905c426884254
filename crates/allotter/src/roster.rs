use crate::{error::Result, identity::Identity, store::Backing};
use std::path::PathBuf;

/// A plain list of identities, one per line, in first-seen order.
///
/// Used for the manager roster and the visitor roster. Lines that do not
/// parse as an identity are ignored; duplicates collapse to the first one.
#[derive(Debug)]
pub struct IdRoster {
    backing: Backing<Vec<Identity>>,
}

impl IdRoster {
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

    /// Every identity on the roster.
    pub fn members(&self) -> Result<Vec<Identity>> {
        self.backing.load(false, |rows| {
            let mut members: Vec<Identity> = Vec::with_capacity(rows.len());
            for id in rows.iter().filter_map(|row| row.get(0)?.parse().ok()) {
                if !members.contains(&id) {
                    members.push(id);
                }
            }
            members
        })
    }

    pub fn contains(&self, identity: Identity) -> Result<bool> {
        Ok(self.members()?.contains(&identity))
    }

    /// Adds `identity` if absent. Returns `true` when the roster changed.
    pub fn add(&self, identity: Identity) -> Result<bool> {
        let mut members = self.members()?;
        if members.contains(&identity) {
            return Ok(false);
        }
        members.push(identity);
        self.backing.store(members, None, |members| {
            members.iter().map(|id| vec![id.to_string()]).collect()
        })?;
        Ok(true)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.members()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn add_is_idempotent() {
        let roster = IdRoster::in_memory();
        assert!(roster.is_empty().unwrap());
        assert!(roster.add(Identity(9)).unwrap());
        assert!(!roster.add(Identity(9)).unwrap());
        assert!(roster.add(Identity(3)).unwrap());
        assert_eq!(roster.members().unwrap(), [Identity(9), Identity(3)]);
    }

    #[test]
    fn file_roster_ignores_junk_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admins.txt");
        fs::write(&path, "100\n\nbob\n 200 \n100\n").unwrap();

        let roster = IdRoster::open(&path);
        assert_eq!(roster.members().unwrap(), [Identity(100), Identity(200)]);
        assert!(roster.contains(Identity(200)).unwrap());
        assert!(!roster.contains(Identity(300)).unwrap());

        roster.add(Identity(300)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "100\n200\n300\n");
    }
}
