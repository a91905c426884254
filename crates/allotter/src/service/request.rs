use crate::{
    allocate::Allocation,
    engine::{SheetImport, UnlockReport},
    error::Result,
    gate::InFlightGuard,
    identity::{Identity, IdentityStatus},
    import::{Candidate, ImportSummary},
    pool::PoolKey,
    workbook::Workbook,
};
use tokio::sync::oneshot;

/// One unit of gated work handed to a worker.
///
/// Every variant carries a `response` channel the worker answers on once the
/// engine call has run to completion. A request whose caller went away is
/// still executed.
#[derive(Debug)]
pub enum WorkRequest {
    Allocate {
        pool: PoolKey,
        identity: Identity,
        label: String,
        /// Released once the allocation has been persisted (or failed).
        guard: InFlightGuard,
        response: oneshot::Sender<Result<Allocation>>,
    },
    Import {
        pool: PoolKey,
        candidates: Vec<Candidate>,
        response: oneshot::Sender<Result<ImportSummary>>,
    },
    ImportAll {
        workbook: Workbook,
        response: oneshot::Sender<Result<Vec<SheetImport>>>,
    },
    Unlock {
        identity: Identity,
        response: oneshot::Sender<Result<UnlockReport>>,
    },
    SetExtra {
        identity: Identity,
        pool: PoolKey,
        value: u64,
        response: oneshot::Sender<Result<()>>,
    },
    SetStatus {
        identity: Identity,
        status: IdentityStatus,
        response: oneshot::Sender<Result<()>>,
    },
    Unban {
        identity: Identity,
        response: oneshot::Sender<Result<bool>>,
    },
    AddManager {
        actor: Identity,
        identity: Identity,
        response: oneshot::Sender<Result<bool>>,
    },
    RequestAccess {
        identity: Identity,
        response: oneshot::Sender<Result<IdentityStatus>>,
    },
    RecordVisit {
        identity: Identity,
        response: oneshot::Sender<Result<bool>>,
    },
    ClearAll {
        response: oneshot::Sender<Result<usize>>,
    },
    /// Signal a worker to stop after acknowledging.
    Shutdown { response: oneshot::Sender<()> },
}
