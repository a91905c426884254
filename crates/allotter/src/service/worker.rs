use crate::{
    engine::Engine,
    error::{Error, Result},
    service::request::WorkRequest,
    store::PoolStore,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Runs `f` against the engine on the blocking thread pool.
pub(crate) async fn blocking<S, T, F>(engine: &Arc<Engine<S>>, f: F) -> Result<T>
where
    S: PoolStore + 'static,
    T: Send + 'static,
    F: FnOnce(&Engine<S>) -> Result<T> + Send + 'static,
{
    let engine = Arc::clone(engine);
    tokio::task::spawn_blocking(move || f(&engine))
        .await
        .map_err(|e| Error::ChannelError {
            context: format!("blocking engine task failed: {e}"),
        })?
}

fn respond<T>(_worker_id: usize, response: oneshot::Sender<T>, value: T) {
    if response.send(value).is_err() {
        #[cfg(feature = "tracing")]
        tracing::debug!("Worker {_worker_id}: caller went away before the response");
    }
}

/// Worker task processing [`WorkRequest`] messages one at a time.
///
/// The engine call of each request runs on the blocking pool while the worker
/// awaits it, so a worker never has more than one request in progress.
/// Requests queued on the channel before a [`WorkRequest::Shutdown`] are
/// still served.
pub async fn worker_loop<S>(
    worker_id: usize,
    mut rx: mpsc::Receiver<WorkRequest>,
    engine: Arc<Engine<S>>,
) where
    S: PoolStore + 'static,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Some(work) = rx.recv().await {
        match work {
            WorkRequest::Allocate {
                pool,
                identity,
                label,
                guard,
                response,
            } => {
                let result =
                    blocking(&engine, move |e| e.allocate(&pool, identity, &label)).await;
                drop(guard);
                respond(worker_id, response, result);
            }
            WorkRequest::Import {
                pool,
                candidates,
                response,
            } => {
                let result = blocking(&engine, move |e| e.import(&pool, candidates)).await;
                respond(worker_id, response, result);
            }
            WorkRequest::ImportAll { workbook, response } => {
                let result = blocking(&engine, move |e| e.import_all_sheets(&workbook)).await;
                respond(worker_id, response, result);
            }
            WorkRequest::Unlock { identity, response } => {
                let result = blocking(&engine, move |e| e.unlock(identity)).await;
                respond(worker_id, response, result);
            }
            WorkRequest::SetExtra {
                identity,
                pool,
                value,
                response,
            } => {
                let result =
                    blocking(&engine, move |e| e.set_extra_limit(identity, &pool, value)).await;
                respond(worker_id, response, result);
            }
            WorkRequest::SetStatus {
                identity,
                status,
                response,
            } => {
                let result = blocking(&engine, move |e| e.set_status(identity, status)).await;
                respond(worker_id, response, result);
            }
            WorkRequest::Unban { identity, response } => {
                let result = blocking(&engine, move |e| e.unban(identity)).await;
                respond(worker_id, response, result);
            }
            WorkRequest::AddManager {
                actor,
                identity,
                response,
            } => {
                let result = blocking(&engine, move |e| e.add_manager_as(actor, identity)).await;
                respond(worker_id, response, result);
            }
            WorkRequest::RequestAccess { identity, response } => {
                let result = blocking(&engine, move |e| e.request_access(identity)).await;
                respond(worker_id, response, result);
            }
            WorkRequest::RecordVisit { identity, response } => {
                let result = blocking(&engine, move |e| e.record_visit(identity)).await;
                respond(worker_id, response, result);
            }
            WorkRequest::ClearAll { response } => {
                let result = blocking(&engine, |e| e.clear_all_pools()).await;
                respond(worker_id, response, result);
            }
            WorkRequest::Shutdown { response } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}
