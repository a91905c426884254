//! Async facade over the [`Engine`].
//!
//! [`Service`] is what a transport layer talks to. It adds three things on top
//! of the engine:
//!
//! - Offload. Gated mutations are queued to a pool of worker tasks, which run
//!   the blocking engine call on tokio's blocking pool. Reads (statistics,
//!   exports, lookups) go straight to the blocking pool without queueing.
//! - The in-flight guard. A second allocation for an `(identity, pool)` pair
//!   that is still being served fails fast with
//!   [`Error::RequestInProgress`].
//! - Manager authorization. Manager-only operations take the acting identity
//!   and fail with [`Error::NotAuthorized`] unless it is on the manager
//!   roster.

use crate::{
    allocate::Allocation,
    engine::{Engine, IdentityExport, SheetImport, UnlockReport},
    error::{Error, Result},
    gate::InFlight,
    identity::{Identity, IdentityStatus},
    import::{Candidate, ImportSummary},
    pool::PoolKey,
    service::{
        pool::WorkerPool,
        request::WorkRequest,
        worker::{blocking, worker_loop},
    },
    stats::StatsReport,
    store::{CsvPoolStore, PoolStore},
    telemetry,
    workbook::Workbook,
};
use core::time::Duration;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Sizing of a [`Service`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceConfig {
    /// Worker tasks feeding the engine.
    pub num_workers: usize,
    /// Requests each worker queues before senders wait.
    pub queue_depth: usize,
    /// How long shutdown waits for in-flight allocations.
    pub shutdown_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            num_workers: 1,
            queue_depth: 16,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

/// Async, cloneable handle to a running engine.
pub struct Service<S = CsvPoolStore> {
    engine: Arc<Engine<S>>,
    in_flight: InFlight,
    worker_pool: Arc<WorkerPool>,
}

impl<S> Clone for Service<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            in_flight: self.in_flight.clone(),
            worker_pool: Arc::clone(&self.worker_pool),
        }
    }
}

impl<S> core::fmt::Debug for Service<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Service")
            .field("engine", &self.engine)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl<S: PoolStore + 'static> Service<S> {
    /// Wraps `engine` and spawns the worker tasks.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, or when `num_workers` or
    /// `queue_depth` is zero.
    pub fn new(engine: Engine<S>, config: &ServiceConfig) -> Self {
        assert!(config.num_workers > 0, "num_workers must be > 0");
        let engine = Arc::new(engine);
        let in_flight = InFlight::new();

        let mut workers = Vec::with_capacity(config.num_workers);
        for worker_id in 0..config.num_workers {
            let (tx, rx) = mpsc::channel(config.queue_depth);
            workers.push(tx);
            tokio::spawn(worker_loop(worker_id, rx, Arc::clone(&engine)));
        }

        let worker_pool = WorkerPool::new(
            workers,
            CancellationToken::new(),
            config.shutdown_timeout,
            in_flight.clone(),
        );

        Self {
            engine,
            in_flight,
            worker_pool: Arc::new(worker_pool),
        }
    }

    pub fn engine(&self) -> &Arc<Engine<S>> {
        &self.engine
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    async fn dispatch<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<T>>) -> WorkRequest,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.worker_pool.send_to_next_worker(request(tx)).await?;
        rx.await.map_err(|_| Error::ChannelError {
            context: "worker dropped the response".to_string(),
        })?
    }

    async fn authorize(&self, actor: Identity) -> Result<()> {
        if blocking(&self.engine, move |e| e.is_manager(actor)).await? {
            Ok(())
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!(%actor, "manager operation refused");
            Err(Error::NotAuthorized {
                identity: actor,
                reason: "not a manager".to_string(),
            })
        }
    }

    // === Requester operations ===

    /// Allocates the remaining allowance of `identity` in `pool`.
    ///
    /// # Errors
    ///
    /// - [`Error::RequestInProgress`] while another allocation for the same
    ///   identity and pool is being served.
    /// - [`Error::NotAuthorized`] unless the identity is approved.
    /// - [`Error::UnknownPool`], [`Error::StorageUnavailable`],
    ///   [`Error::ServiceShutdown`].
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, pool, label), fields(pool = %pool)))]
    pub async fn allocate(
        &self,
        pool: &PoolKey,
        identity: Identity,
        label: &str,
    ) -> Result<Allocation> {
        self.engine.catalog().get(pool)?;
        let guard = self.in_flight.try_begin(identity, pool).inspect_err(|_| {
            telemetry::increment_inflight_rejections();
        })?;

        self.dispatch(|response| WorkRequest::Allocate {
            pool: pool.clone(),
            identity,
            label: label.to_string(),
            guard,
            response,
        })
        .await
    }

    /// Registers `identity` as pending unless it already has a status.
    pub async fn request_access(&self, identity: Identity) -> Result<IdentityStatus> {
        self.dispatch(|response| WorkRequest::RequestAccess { identity, response })
            .await
    }

    /// Notes a visit of `identity`. Returns `true` on first sight.
    pub async fn record_visit(&self, identity: Identity) -> Result<bool> {
        self.dispatch(|response| WorkRequest::RecordVisit { identity, response })
            .await
    }

    pub async fn get_status(&self, identity: Identity) -> Result<Option<IdentityStatus>> {
        blocking(&self.engine, move |e| e.get_status(identity)).await
    }

    pub async fn get_stats(&self) -> Result<StatsReport> {
        blocking(&self.engine, |e| e.get_stats()).await
    }

    pub async fn visitor_count(&self) -> Result<usize> {
        blocking(&self.engine, |e| e.visitor_count()).await
    }

    pub async fn is_manager(&self, identity: Identity) -> Result<bool> {
        blocking(&self.engine, move |e| e.is_manager(identity)).await
    }

    pub async fn managers(&self) -> Result<Vec<Identity>> {
        blocking(&self.engine, |e| e.managers()).await
    }

    /// Extra and total allowance of `identity` in `pool`.
    pub async fn allowance(&self, identity: Identity, pool: &PoolKey) -> Result<(u64, u64)> {
        let pool = pool.clone();
        blocking(&self.engine, move |e| {
            Ok((
                e.get_extra_limit(identity, &pool)?,
                e.total_allowance(identity, &pool)?,
            ))
        })
        .await
    }

    // === Manager operations ===

    pub async fn import(
        &self,
        actor: Identity,
        pool: &PoolKey,
        candidates: Vec<Candidate>,
    ) -> Result<ImportSummary> {
        self.authorize(actor).await?;
        self.engine.catalog().get(pool)?;
        self.dispatch(|response| WorkRequest::Import {
            pool: pool.clone(),
            candidates,
            response,
        })
        .await
    }

    /// Imports the first column of the first sheet of an xlsx document.
    pub async fn import_xlsx(
        &self,
        actor: Identity,
        pool: &PoolKey,
        bytes: Vec<u8>,
    ) -> Result<ImportSummary> {
        self.authorize(actor).await?;
        let workbook = parse_xlsx(bytes).await?;
        let sheet = workbook.first_sheet().ok_or_else(|| Error::MalformedInput {
            reason: "workbook has no sheets".to_string(),
        })?;
        let candidates = sheet.first_column_candidates();
        self.engine.catalog().get(pool)?;
        self.dispatch(|response| WorkRequest::Import {
            pool: pool.clone(),
            candidates,
            response,
        })
        .await
    }

    /// Imports every sheet of an xlsx document into the pool its name maps
    /// to.
    pub async fn import_all_xlsx(
        &self,
        actor: Identity,
        bytes: Vec<u8>,
    ) -> Result<Vec<SheetImport>> {
        self.authorize(actor).await?;
        let workbook = parse_xlsx(bytes).await?;
        self.dispatch(|response| WorkRequest::ImportAll { workbook, response })
            .await
    }

    pub async fn export_all(&self, actor: Identity) -> Result<Workbook> {
        self.authorize(actor).await?;
        blocking(&self.engine, |e| e.export_all()).await
    }

    pub async fn export_for_identity(
        &self,
        actor: Identity,
        identity: Identity,
    ) -> Result<IdentityExport> {
        self.authorize(actor).await?;
        blocking(&self.engine, move |e| e.export_for_identity(identity)).await
    }

    pub async fn set_status(
        &self,
        actor: Identity,
        identity: Identity,
        status: IdentityStatus,
    ) -> Result<()> {
        self.authorize(actor).await?;
        self.dispatch(|response| WorkRequest::SetStatus {
            identity,
            status,
            response,
        })
        .await
    }

    pub async fn set_extra_limit(
        &self,
        actor: Identity,
        identity: Identity,
        pool: &PoolKey,
        value: u64,
    ) -> Result<()> {
        self.authorize(actor).await?;
        self.engine.catalog().get(pool)?;
        self.dispatch(|response| WorkRequest::SetExtra {
            identity,
            pool: pool.clone(),
            value,
            response,
        })
        .await
    }

    /// Lifts the ban of `identity`. Returns `false` when it was not banned.
    pub async fn unban(&self, actor: Identity, identity: Identity) -> Result<bool> {
        self.authorize(actor).await?;
        self.dispatch(|response| WorkRequest::Unban { identity, response })
            .await
    }

    /// Adds `identity` to the manager roster.
    ///
    /// While the roster is empty anyone may add the first manager. The roster
    /// check runs on the worker under the engine gate, so concurrent
    /// bootstraps cannot both succeed.
    pub async fn add_manager(&self, actor: Identity, identity: Identity) -> Result<bool> {
        self.dispatch(|response| WorkRequest::AddManager {
            actor,
            identity,
            response,
        })
        .await
    }

    pub async fn unlock(&self, actor: Identity, identity: Identity) -> Result<UnlockReport> {
        self.authorize(actor).await?;
        self.dispatch(|response| WorkRequest::Unlock { identity, response })
            .await
    }

    pub async fn clear_all_pools(&self, actor: Identity) -> Result<usize> {
        self.authorize(actor).await?;
        self.dispatch(|response| WorkRequest::ClearAll { response })
            .await
    }

    /// Stops accepting work, drains in-flight allocations and stops the
    /// workers.
    pub async fn shutdown(&self) -> Result<()> {
        self.worker_pool.shutdown().await
    }
}

async fn parse_xlsx(bytes: Vec<u8>) -> Result<Workbook> {
    tokio::task::spawn_blocking(move || Workbook::from_xlsx(&bytes))
        .await
        .map_err(|e| Error::ChannelError {
            context: format!("xlsx parse task failed: {e}"),
        })?
}
