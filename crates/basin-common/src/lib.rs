//! basin-common: shared identifiers, error type, configuration, and
//! cancellation primitives used across the basingraph workspace.

mod cancel;
mod config;
mod error;
pub mod id;

pub use cancel::{CancelFlag, CANCEL_CHECK_STRIDE};
pub use config::EngineConfig;
pub use error::{BasinError, BasinResult};
pub use id::{CycleId, NodeId, PageId};
