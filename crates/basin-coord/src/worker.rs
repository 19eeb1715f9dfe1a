//! Worker pool: threads that drain the task queue and execute jobs.
//!
//! The fan-out phase pre-loads the queue, so workers exit when the queue
//! runs dry (or cancellation trips). Results come back ordered by task id,
//! keeping completion order out of the outputs.

use std::sync::{Arc, Mutex};
use std::thread;

use basin_common::CancelFlag;

use crate::task::{Task, TaskQueue, TaskResult};

/// Callback invoked by a worker for each task.
pub type TaskHandler = dyn Fn(Task) -> TaskResult + Send + Sync + 'static;

pub struct WorkerPool;

impl WorkerPool {
    /// Execute every queued task on `num_workers` threads and collect the
    /// results. Blocks until the queue is drained or cancellation trips.
    pub fn execute(
        num_workers: usize,
        queue: Arc<TaskQueue>,
        cancel: &CancelFlag,
        handler: Arc<TaskHandler>,
    ) -> Vec<TaskResult> {
        let results: Arc<Mutex<Vec<TaskResult>>> = Arc::new(Mutex::new(Vec::new()));
        let mut workers = Vec::with_capacity(num_workers.max(1));

        for worker_id in 0..num_workers.max(1) {
            let q = Arc::clone(&queue);
            let h = Arc::clone(&handler);
            let r = Arc::clone(&results);
            let c = cancel.clone();

            let handle = thread::Builder::new()
                .name(format!("basin-worker-{worker_id}"))
                .spawn(move || {
                    while !c.is_cancelled() {
                        let Some(task) = q.try_pop() else { break };
                        let result = h(task);
                        r.lock().unwrap().push(result);
                    }
                })
                .expect("failed to spawn worker thread");

            workers.push(handle);
        }

        for handle in workers {
            let _ = handle.join();
        }

        let mut results = Arc::try_unwrap(results)
            .map(|m| m.into_inner().unwrap())
            .unwrap_or_default();
        results.sort_by_key(|r| r.task_id().0);
        results
    }
}
