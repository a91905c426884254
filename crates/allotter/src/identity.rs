use core::{fmt, num::ParseIntError, str::FromStr};

/// An opaque requester identity.
///
/// Identities are the numeric account ids handed over by the transport layer.
/// They are persisted as decimal text in every ledger, roster and pool file.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Identity(pub i64);

impl Identity {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Identity {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl From<i64> for Identity {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

/// Eligibility of an identity to request allocations.
///
/// An identity with no entry is unknown. The lifecycle is
/// `unknown -> Pending -> Approved | Banned`, and a moderator can move an
/// identity between `Banned` and `Approved` in either direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum IdentityStatus {
    Pending,
    Approved,
    Banned,
}

impl IdentityStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Banned => "banned",
        }
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a status string is none of `pending`, `approved`, `banned`.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
#[error("unknown identity status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for IdentityStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "banned" => Ok(Self::Banned),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_parses_trimmed_decimal_text() {
        assert_eq!(" 42 ".parse::<Identity>().unwrap(), Identity(42));
        assert_eq!("-100370".parse::<Identity>().unwrap(), Identity(-100370));
        assert!("abc".parse::<Identity>().is_err());
        assert!("".parse::<Identity>().is_err());
    }

    #[test]
    fn status_text_is_stable() {
        for status in [
            IdentityStatus::Pending,
            IdentityStatus::Approved,
            IdentityStatus::Banned,
        ] {
            assert_eq!(status.as_str().parse::<IdentityStatus>().unwrap(), status);
        }
        assert_eq!(
            "frozen".parse::<IdentityStatus>(),
            Err(UnknownStatus("frozen".into()))
        );
        assert_eq!(
            UnknownStatus("frozen".into()).to_string(),
            "unknown identity status `frozen`"
        );
    }
}
