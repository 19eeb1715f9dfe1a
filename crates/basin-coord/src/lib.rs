//! basin-coord: drives a run plan end to end.
//!
//! Phases A→C execute per N sequentially within the process to bound peak
//! memory; basin/branch materialization for selected cycles fans out over a
//! bounded worker pool; the multiplex join runs once all layers are in.
//! Per-N artifacts are written atomically, so a restart can skip any N whose
//! outputs already exist and still pass a schema check.

mod controller;
mod plan;
mod task;
mod worker;

pub use controller::{Controller, RunSummary};
pub use plan::{CycleSelection, RunPlan};
pub use task::{Task, TaskId, TaskPriority, TaskQueue, TaskResult};
pub use worker::WorkerPool;
