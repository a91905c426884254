mod allocate;
mod engine;
mod error;
mod gate;
mod identity;
mod import;
mod pool;
mod quota;
mod record;
mod roster;
pub mod service;
mod stats;
mod status;
mod store;
pub mod telemetry;
mod time;
mod workbook;

pub use crate::allocate::*;
pub use crate::engine::*;
pub use crate::error::*;
pub use crate::gate::*;
pub use crate::identity::*;
pub use crate::import::*;
pub use crate::pool::*;
pub use crate::quota::*;
pub use crate::record::*;
pub use crate::roster::*;
pub use crate::service::{Service, ServiceConfig};
pub use crate::stats::*;
pub use crate::status::*;
pub use crate::store::*;
pub use crate::time::*;
pub use crate::workbook::*;
