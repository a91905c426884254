use super::{PoolStore, read_table, write_table};
use crate::{
    error::Result,
    pool::PoolSpec,
    record::{RECORD_HEADER, Record},
};
use std::path::{Path, PathBuf};

/// One CSV file per pool inside a data directory.
///
/// Files carry the header `Value, ClaimedBy, ClaimantLabel, ClaimedAtUTC`
/// followed by one row per record. Rows shorter than four columns are padded
/// with empty fields on load, which keeps hand-edited files usable.
#[derive(Clone, Debug)]
pub struct CsvPoolStore {
    root: PathBuf,
}

impl CsvPoolStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the file backing `pool`.
    pub fn path_for(&self, pool: &PoolSpec) -> PathBuf {
        self.root.join(&pool.file_name)
    }
}

impl PoolStore for CsvPoolStore {
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all, fields(pool = %pool.key)))]
    fn load(&self, pool: &PoolSpec) -> Result<Vec<Record>> {
        let rows = read_table(&self.path_for(pool), true)?;
        let column = |row: &csv::StringRecord, i: usize| row.get(i).unwrap_or_default().to_string();

        Ok(rows
            .iter()
            .map(|row| {
                Record::from_columns(
                    column(row, 0),
                    column(row, 1),
                    column(row, 2),
                    column(row, 3),
                )
            })
            .collect())
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all, fields(pool = %pool.key, rows = records.len())))]
    fn replace(&self, pool: &PoolSpec, records: &[Record]) -> Result<()> {
        write_table(
            &self.path_for(pool),
            Some(&RECORD_HEADER),
            records.iter().map(Record::to_columns),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use chrono::{TimeZone, Utc};
    use std::fs;

    #[test]
    fn missing_pool_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvPoolStore::new(dir.path());
        let spec = PoolSpec::new("telegram", "Telegram", 50);
        assert!(store.load(&spec).unwrap().is_empty());
    }

    #[test]
    fn replace_then_load_preserves_order_and_claims() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvPoolStore::new(dir.path());
        let spec = PoolSpec::new("email", "Email", 100);

        let mut claimed = Record::unclaimed("b@example.com");
        claimed.claim_for(
            Identity(99),
            "Bee, \"the\" user",
            Utc.with_ymd_and_hms(2025, 4, 1, 8, 30, 0).unwrap(),
        );
        let records = vec![
            Record::unclaimed("a@example.com"),
            claimed,
            Record::unclaimed("c@example.com"),
        ];
        store.replace(&spec, &records).unwrap();
        assert_eq!(store.load(&spec).unwrap(), records);

        let text = fs::read_to_string(store.path_for(&spec)).unwrap();
        assert!(text.starts_with("Value,ClaimedBy,ClaimantLabel,ClaimedAtUTC\n"));
        assert!(text.contains("2025.04.01 08:30:00"));
    }

    #[test]
    fn hand_written_short_rows_load_as_unclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvPoolStore::new(dir.path());
        let spec = PoolSpec::new("vk", "VK", 250);
        fs::write(
            store.path_for(&spec),
            "Value,ClaimedBy,ClaimantLabel,ClaimedAtUTC\nid1\nid2,,,\nid3,7,,2025.01.01 00:00:00\n",
        )
        .unwrap();

        let records = store.load(&spec).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].is_free());
        assert!(records[1].is_free());
        assert!(records[2].is_claimed_by(Identity(7)));
    }
}
