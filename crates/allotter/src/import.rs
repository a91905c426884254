//! De-duplicating bulk import.
//!
//! Candidate values are normalized, compared case-insensitively against every
//! value already in the pool (claimed or not) and against earlier candidates
//! of the same batch, and the survivors are appended as unclaimed records.
//! First occurrence wins; later duplicates are dropped silently and only show
//! up in the aggregate `skipped` count.

use crate::{pool::PoolKey, record::Record};
use std::collections::HashSet;

/// Cell texts that are column titles rather than data. Compared after
/// normalization, case-insensitively.
pub const HEADER_WORDS: [&str; 4] = ["value", "значение", "контакт", "данные"];

/// A raw value as it arrives from an import document.
#[derive(Clone, Debug, PartialEq)]
pub enum Candidate {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl From<&str> for Candidate {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Candidate {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Candidate {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Candidate {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl Candidate {
    /// Normalizes the candidate into the text that will be stored.
    ///
    /// Floats that are mathematically integers lose their fractional part
    /// (`79990001122.0` becomes `79990001122`). Text is trimmed and a single
    /// leading `=` left behind by spreadsheet formula escaping is stripped.
    /// Returns `None` when nothing is left.
    pub fn normalize(&self) -> Option<String> {
        match self {
            Self::Text(s) => normalize_text(s).map(str::to_string),
            Self::Integer(n) => Some(n.to_string()),
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                Some(format!("{}", *f as i64))
            }
            Self::Float(f) => normalize_text(&f.to_string()).map(str::to_string),
        }
    }
}

/// Trims `raw` and strips one leading `=`. Returns `None` for an empty result.
pub fn normalize_text(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix('=').unwrap_or(trimmed);
    (!stripped.is_empty()).then_some(stripped)
}

/// Returns `true` when `value` is one of the [`HEADER_WORDS`].
pub fn is_header_word(value: &str) -> bool {
    let lower = value.to_lowercase();
    HEADER_WORDS.iter().any(|w| *w == lower)
}

/// Outcome of merging one batch into one pool.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImportSummary {
    pub pool: PoolKey,
    /// Candidates offered, before normalization.
    pub candidates: usize,
    /// New records appended to the pool.
    pub added: usize,
}

impl ImportSummary {
    /// Candidates that were dropped as empty or duplicate.
    pub fn skipped(&self) -> usize {
        self.candidates - self.added
    }
}

fn dedup_key(value: &str) -> String {
    value.to_lowercase()
}

/// Appends the distinct, previously unseen candidates to `records`.
///
/// Existing rows keep their order and claims. Returns the number of records
/// appended.
pub fn merge_candidates<I>(records: &mut Vec<Record>, candidates: I) -> usize
where
    I: IntoIterator<Item = Candidate>,
{
    let mut seen: HashSet<String> = records
        .iter()
        .filter_map(Record::normalized_value)
        .map(dedup_key)
        .collect();

    let before = records.len();
    for candidate in candidates {
        let Some(value) = candidate.normalize() else {
            continue;
        };
        // Compare the way the stored row will read back, so `==x` and `x`
        // collide and repeated imports stay idempotent.
        let Some(key) = normalize_text(&value).map(dedup_key) else {
            continue;
        };
        if seen.insert(key) {
            records.push(Record::unclaimed(value));
        }
    }
    records.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;
    use chrono::{TimeZone, Utc};

    fn texts(records: &[Record]) -> Vec<&str> {
        records.iter().map(Record::value).collect()
    }

    #[test]
    fn normalizes_spreadsheet_artifacts() {
        assert_eq!(Candidate::Float(79990001122.0).normalize().as_deref(), Some("79990001122"));
        assert_eq!(Candidate::Float(1.5).normalize().as_deref(), Some("1.5"));
        assert_eq!(Candidate::Integer(-3).normalize().as_deref(), Some("-3"));
        assert_eq!(Candidate::from("  =@handle ").normalize().as_deref(), Some("@handle"));
        assert_eq!(Candidate::from("==x").normalize().as_deref(), Some("=x"));
        assert_eq!(Candidate::from("   ").normalize(), None);
        assert_eq!(Candidate::from("=").normalize(), None);
    }

    #[test]
    fn case_insensitive_dedup_within_batch() {
        let mut records = Vec::new();
        let added = merge_candidates(
            &mut records,
            ["Foo", "foo", "FOO"].into_iter().map(Candidate::from),
        );
        assert_eq!(added, 1);
        assert_eq!(texts(&records), ["Foo"]);
    }

    #[test]
    fn dedup_against_claimed_and_unclaimed_rows() {
        let mut claimed = Record::unclaimed("Taken@Mail.ru");
        claimed.claim_for(
            Identity(1),
            "",
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        );
        let mut records = vec![claimed.clone(), Record::unclaimed("=free")];

        let added = merge_candidates(
            &mut records,
            ["taken@mail.ru", "FREE", "new"].into_iter().map(Candidate::from),
        );
        assert_eq!(added, 1);
        assert_eq!(texts(&records), ["Taken@Mail.ru", "=free", "new"]);
        assert_eq!(records[0], claimed);
    }

    #[test]
    fn repeating_an_import_adds_nothing() {
        let batch = || ["a", "b", " a ", "c"].into_iter().map(Candidate::from);
        let mut records = Vec::new();
        assert_eq!(merge_candidates(&mut records, batch()), 3);
        assert_eq!(merge_candidates(&mut records, batch()), 0);
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn double_escaped_values_collide_with_plain_ones() {
        let mut records = Vec::new();
        let batch = || ["==x", "x", "=="].into_iter().map(Candidate::from);
        assert_eq!(merge_candidates(&mut records, batch()), 1);
        assert_eq!(texts(&records), ["=x"]);
        assert_eq!(merge_candidates(&mut records, batch()), 0);
    }

    #[test]
    fn header_words_are_recognized() {
        assert!(is_header_word("Value"));
        assert!(is_header_word("КОНТАКТ"));
        assert!(!is_header_word("values"));
    }

    #[test]
    fn summary_reports_skipped() {
        let summary = ImportSummary {
            pool: "vk".into(),
            candidates: 10,
            added: 7,
        };
        assert_eq!(summary.skipped(), 3);
    }
}
