//! Whole-file CSV tables.
//!
//! Every durable file of the engine is a small CSV table that is read in full
//! and rewritten in full. Rewrites go to a sibling temporary file that is
//! synced and then renamed over the target, so readers never see a torn file.

use crate::error::{Error, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use parking_lot::Mutex;
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

/// Where a ledger-style table lives: on disk, re-read on every access so
/// hand edits are picked up, or in process memory.
#[derive(Debug)]
pub(crate) enum Backing<T> {
    File(PathBuf),
    Memory(Mutex<T>),
}

impl<T: Clone + Default> Backing<T> {
    pub(crate) fn memory() -> Self {
        Self::Memory(Mutex::new(T::default()))
    }

    /// Loads the current table, parsing file rows with `parse`.
    pub(crate) fn load(
        &self,
        has_header: bool,
        parse: impl FnOnce(Vec<StringRecord>) -> T,
    ) -> Result<T> {
        match self {
            Self::File(path) => read_table(path, has_header).map(parse),
            Self::Memory(table) => Ok(table.lock().clone()),
        }
    }

    /// Replaces the stored table with `value`, rendering file rows with
    /// `render`.
    pub(crate) fn store(
        &self,
        value: T,
        header: Option<&[&str]>,
        render: impl FnOnce(&T) -> Vec<Vec<String>>,
    ) -> Result<()> {
        match self {
            Self::File(path) => write_table(path, header, render(&value)),
            Self::Memory(table) => {
                *table.lock() = value;
                Ok(())
            }
        }
    }
}

/// Reads every data row of the table at `path`.
///
/// Returns an empty table when the file does not exist. Rows may have any
/// number of fields; interpreting short or malformed rows is up to the caller.
pub(crate) fn read_table(path: &Path, has_header: bool) -> Result<Vec<StringRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::storage(path, e)),
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(has_header)
        .flexible(true)
        .from_reader(file);

    reader
        .records()
        .collect::<core::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::storage(path, e))
}

/// Atomically replaces the table at `path` with `header` (if any) followed by
/// `rows`.
pub(crate) fn write_table<R, T>(
    path: &Path,
    header: Option<&[&str]>,
    rows: impl IntoIterator<Item = R>,
) -> Result<()>
where
    R: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let tmp = tmp_path(path);
    write_to(&tmp, header, rows).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::storage(path, e)
    })?;
    fs::rename(&tmp, path).map_err(|e| Error::storage(path, e))
}

fn write_to<R, T>(
    tmp: &Path,
    header: Option<&[&str]>,
    rows: impl IntoIterator<Item = R>,
) -> io::Result<()>
where
    R: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    if let Some(parent) = tmp.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_writer(File::create(tmp)?);
    if let Some(header) = header {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| io::Error::new(e.error().kind(), e.error().to_string()))?;
    file.sync_all()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let rows = read_table(&dir.path().join("nope.csv"), true).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn rewrite_replaces_content_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");

        write_table(&path, Some(&["a", "b"]), [["1", "2"], ["3", "4"]]).unwrap();
        write_table(&path, Some(&["a", "b"]), [["5", "6"]]).unwrap();

        let rows = read_table(&path, true).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "5");
        assert_eq!(&rows[0][1], "6");
        assert!(!dir.path().join("t.csv.tmp").exists());
    }

    #[test]
    fn quoting_survives_commas_and_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.csv");
        write_table(&path, None, [["a,b", "line\nbreak"]]).unwrap();
        let rows = read_table(&path, false).unwrap();
        assert_eq!(&rows[0][0], "a,b");
        assert_eq!(&rows[0][1], "line\nbreak");
    }

    #[test]
    fn short_rows_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.csv");
        fs::write(&path, "h1,h2,h3\nonly\nx,y,z\n").unwrap();
        let rows = read_table(&path, true).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 1);
    }
}
