//! Records and claims.
//!
//! A [`Record`] is one allocatable row of a pool. Its claim fields are kept in
//! their persisted text form so rows that were edited by hand survive a
//! load/replace cycle byte for byte; typed views are parsed on demand.

use crate::{
    identity::Identity,
    import::normalize_text,
    time::{format_claim_time, parse_claim_time},
};
use chrono::{DateTime, Utc};

/// Header row of every pool file and of every full-pool export sheet.
pub const RECORD_HEADER: [&str; 4] = ["Value", "ClaimedBy", "ClaimantLabel", "ClaimedAtUTC"];

/// The permanent association of a record with an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Claim {
    by: String,
    label: String,
    at: String,
}

impl Claim {
    pub fn new(identity: Identity, label: &str, at: DateTime<Utc>) -> Self {
        Self {
            by: identity.to_string(),
            label: label.to_string(),
            at: format_claim_time(at),
        }
    }

    /// Rebuilds a claim from the three stored columns.
    pub fn from_raw(by: String, label: String, at: String) -> Self {
        Self { by, label, at }
    }

    /// The claimant, or `None` when the stored id is not a valid identity.
    pub fn identity(&self) -> Option<Identity> {
        self.by.parse().ok()
    }

    pub fn is_held_by(&self, identity: Identity) -> bool {
        self.identity() == Some(identity)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn claimed_at(&self) -> Option<DateTime<Utc>> {
        parse_claim_time(&self.at)
    }

    pub fn raw_by(&self) -> &str {
        &self.by
    }

    pub fn raw_at(&self) -> &str {
        &self.at
    }
}

/// One row of a pool.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Record {
    value: String,
    claim: Option<Claim>,
}

impl Record {
    /// A fresh, unclaimed record.
    pub fn unclaimed(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            claim: None,
        }
    }

    /// Builds a record from the four stored columns. A row is claimed exactly
    /// when its `ClaimedBy` column is non-empty.
    pub fn from_columns(value: String, by: String, label: String, at: String) -> Self {
        let claim = if by.trim().is_empty() {
            None
        } else {
            Some(Claim::from_raw(by, label, at))
        };
        Self { value, claim }
    }

    /// The value exactly as stored.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The value as handed out: trimmed with a spreadsheet `=` prefix removed.
    /// `None` when nothing is left.
    pub fn normalized_value(&self) -> Option<&str> {
        normalize_text(&self.value)
    }

    pub fn claim(&self) -> Option<&Claim> {
        self.claim.as_ref()
    }

    pub fn is_claimed(&self) -> bool {
        self.claim.is_some()
    }

    /// An unclaimed record with a usable value. Unclaimed rows whose value
    /// normalizes to nothing are never handed out and are not free supply.
    pub fn is_free(&self) -> bool {
        self.claim.is_none() && self.normalized_value().is_some()
    }

    pub fn is_claimed_by(&self, identity: Identity) -> bool {
        self.claim.as_ref().is_some_and(|c| c.is_held_by(identity))
    }

    /// Claims the record. Claims are write-once; an already claimed record
    /// is left untouched and `false` is returned.
    pub(crate) fn claim_for(&mut self, identity: Identity, label: &str, at: DateTime<Utc>) -> bool {
        if self.claim.is_some() {
            return false;
        }
        self.claim = Some(Claim::new(identity, label, at));
        true
    }

    /// The four columns in file order.
    pub fn to_columns(&self) -> [&str; 4] {
        match &self.claim {
            Some(claim) => [
                self.value.as_str(),
                claim.by.as_str(),
                claim.label.as_str(),
                claim.at.as_str(),
            ],
            None => [self.value.as_str(), "", "", ""],
        }
    }
}
