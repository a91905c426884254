//! Async service facade and worker coordination.
//!
//! ## Structure
//!
//! - [`handler`] - the [`Service`] entry point and its configuration.
//! - [`pool`] - the round-robin [`WorkerPool`] with graceful shutdown.
//! - [`worker`] - the per-worker request loop.
//! - [`request`] - the [`WorkRequest`] messages exchanged with workers.

pub mod handler;
pub mod pool;
pub mod request;
pub mod worker;

pub use handler::{Service, ServiceConfig};
pub use pool::WorkerPool;
pub use request::WorkRequest;
