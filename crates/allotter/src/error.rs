//! Error types for the allocation engine.
//!
//! This module defines the central `Error` enum, which captures every
//! reportable failure of the engine and its service facade. Business outcomes
//! of allocation and import (an exhausted quota, a pool without enough free
//! records, duplicate candidates) are *not* errors; they are returned as typed
//! reports by the operations themselves.
//!
//! ## Error Cases
//! - `StorageUnavailable`: a durable read or write failed. Fatal to the current
//!   operation and never retried automatically.
//! - `UnknownPool`: the caller named a pool the catalog does not define.
//! - `NotAuthorized`: the identity is not approved, or is not a manager for a
//!   manager-only operation.
//! - `MalformedInput`: an import document is missing required structure.
//! - `RequestInProgress`: a request for the same (identity, pool) pair is
//!   already in flight.
//! - `ServiceShutdown`: a request arrived while the service was shutting down.
//! - `ChannelError`: an internal communication failure between tasks.
//! - `Export`: a spreadsheet document could not be produced.

use crate::{identity::Identity, pool::PoolKey};
use std::{io, path::PathBuf};

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the allocation engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A pool, ledger or roster file could not be read or written.
    #[error("storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The pool key is not part of the configured catalog.
    #[error("unknown pool: {key}")]
    UnknownPool { key: String },

    /// The identity may not perform the requested operation.
    #[error("identity {identity} is not authorized: {reason}")]
    NotAuthorized { identity: Identity, reason: String },

    /// The import document is unusable as a whole.
    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    /// A request for the same identity and pool has not finished yet.
    #[error("request already in progress for {identity} on {pool}")]
    RequestInProgress { identity: Identity, pool: PoolKey },

    /// The service is in the process of shutting down.
    #[error("service is shutting down")]
    ServiceShutdown,

    /// Internal channel send/receive failure.
    #[error("channel error: {context}")]
    ChannelError { context: String },

    /// A spreadsheet export could not be assembled.
    #[error("export failed: {reason}")]
    Export { reason: String },
}

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: impl Into<io::Error>) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            source: source.into(),
        }
    }

    /// Returns `true` when retrying the same call later may succeed without any
    /// intervention (the duplicate-request guard was hit).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RequestInProgress { .. })
    }
}

impl From<calamine::XlsxError> for Error {
    fn from(err: calamine::XlsxError) -> Self {
        Self::MalformedInput {
            reason: err.to_string(),
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for Error {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        Self::Export {
            reason: err.to_string(),
        }
    }
}
