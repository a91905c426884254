//! Asynchronous worker pool for gated engine calls.
//!
//! [`WorkerPool`] owns the sending halves of the worker channels. Work is
//! distributed round-robin; since every request ends up serialized on the
//! engine gate anyway, more workers only buy queueing capacity and let
//! non-conflicting reads of one request overlap with another's wait.

use crate::{
    error::{Error, Result},
    gate::InFlight,
    service::request::WorkRequest,
};
use core::time::Duration;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::{
    sync::{mpsc, oneshot},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;

/// Per-worker wait for a shutdown acknowledgement.
const ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// A cooperative pool of asynchronous workers that process [`WorkRequest`]s.
#[derive(Debug)]
pub struct WorkerPool {
    workers: Vec<mpsc::Sender<WorkRequest>>,
    next_worker: AtomicUsize,
    accepting: AtomicBool,
    shutdown_token: CancellationToken,
    shutdown_timeout: Duration,
    in_flight: InFlight,
}

impl WorkerPool {
    pub fn new(
        workers: Vec<mpsc::Sender<WorkRequest>>,
        shutdown_token: CancellationToken,
        shutdown_timeout: Duration,
        in_flight: InFlight,
    ) -> Self {
        Self {
            workers,
            next_worker: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            shutdown_token,
            shutdown_timeout,
            in_flight,
        }
    }

    /// Returns the index of the next worker to receive work (round-robin).
    pub fn next_worker_index(&self) -> usize {
        self.next_worker.fetch_add(1, Ordering::Relaxed) % self.workers.len()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire) && !self.shutdown_token.is_cancelled()
    }

    /// Sends a [`WorkRequest`] to the next worker in the pool.
    ///
    /// # Errors
    ///
    /// - [`Error::ServiceShutdown`] once shutdown has begun.
    /// - [`Error::ChannelError`] if the worker's channel is closed.
    pub async fn send_to_next_worker(&self, request: WorkRequest) -> Result<()> {
        if !self.is_accepting() {
            return Err(Error::ServiceShutdown);
        }

        let worker_idx = self.next_worker_index();
        let worker = &self.workers[worker_idx];

        worker
            .send(request)
            .await
            .map_err(|_| Error::ChannelError {
                context: format!("Worker {worker_idx} channel closed"),
            })
    }

    /// Gracefully shuts down all workers in the pool.
    ///
    /// - Refuses new requests.
    /// - Waits up to the configured timeout for in-flight allocations.
    /// - Cancels the shared [`CancellationToken`].
    /// - Sends a [`WorkRequest::Shutdown`] to each worker and waits for the
    ///   acknowledgements.
    pub async fn shutdown(&self) -> Result<()> {
        // === Phase 0: Stop accepting new requests ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new requests");
        if !self.accepting.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        // === Phase 1: Wait for in-flight allocations to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Draining in-flight allocations ({} active)",
            self.in_flight.len()
        );
        let drain_result = timeout(self.shutdown_timeout, async {
            while !self.in_flight.is_empty() {
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await;

        match drain_result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight allocations drained");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} allocations still active)",
                    self.in_flight.len()
                );
            }
        }

        // === Phase 2: Cancel ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling via shutdown token");
        self.shutdown_token.cancel();

        // === Phase 3: Notify workers to shut down ===
        let mut shutdown_handles = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            if let Err(_e) = worker.send(WorkRequest::Shutdown { response: tx }).await {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to send shutdown to worker {i}: {_e}");
            } else {
                shutdown_handles.push((i, rx));
            }
        }

        let acks = shutdown_handles.into_iter().map(|(_i, rx)| async move {
            match timeout(ACK_TIMEOUT, rx).await {
                Ok(Ok(())) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!("Worker {_i} shutdown acknowledged");
                }
                Ok(Err(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_i} returned error: {_e}");
                }
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {_i} shutdown timed out");
                }
            }
        });

        futures::future::join_all(acks).await;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool shutdown complete");

        Ok(())
    }
}
