//! Task queue: priority-ordered basin materialization jobs.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Instant;

use basin_common::{BasinError, CycleId};

/// Unique identifier for a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(pub u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Allocate the next globally unique task ID.
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Task priority level. Large basins go first so the pool stays packed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    Low = 0,
    Normal = 1,
    High = 2,
}

/// One per-cycle materialization job at a fixed N.
pub struct Task {
    pub id: TaskId,
    pub n: u32,
    pub cycle: CycleId,
    pub cycle_page: i64,
    pub priority: TaskPriority,
    pub submitted_at: Instant,
}

impl Task {
    pub fn new(n: u32, cycle: CycleId, cycle_page: i64, priority: TaskPriority) -> Self {
        Self {
            id: TaskId::next(),
            n,
            cycle,
            cycle_page,
            priority,
            submitted_at: Instant::now(),
        }
    }
}

/// Result of executing a task.
pub enum TaskResult {
    Success {
        task_id: TaskId,
        cycle_page: i64,
        truncated: bool,
    },
    Error {
        task_id: TaskId,
        cycle_page: i64,
        error: BasinError,
    },
}

impl TaskResult {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Success { task_id, .. } | Self::Error { task_id, .. } => *task_id,
        }
    }
}

/// Wrapper for priority ordering in the binary heap.
struct PrioritizedTask {
    task: Task,
}

impl PartialEq for PrioritizedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.id == other.task.id
    }
}

impl Eq for PrioritizedTask {}

impl PartialOrd for PrioritizedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then earlier submission time.
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.task.submitted_at.cmp(&self.task.submitted_at))
    }
}

/// Thread-safe priority task queue.
///
/// Tasks are dequeued in priority order (High > Normal > Low). Within the
/// same priority, earlier submissions are dequeued first. The fan-out phase
/// pre-loads the queue before workers start, so popping never blocks.
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<PrioritizedTask>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
        }
    }

    /// Submit a task to the queue.
    pub fn push(&self, task: Task) {
        let mut heap = self.heap.lock().unwrap();
        heap.push(PrioritizedTask { task });
    }

    /// Pop the highest-priority task, or `None` if the queue is empty.
    pub fn try_pop(&self) -> Option<Task> {
        let mut heap = self.heap.lock().unwrap();
        heap.pop().map(|p| p.task)
    }

    /// Number of pending tasks.
    pub fn len(&self) -> usize {
        self.heap.lock().unwrap().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.heap.lock().unwrap().is_empty()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_task(priority: TaskPriority, cycle: u32) -> Task {
        Task::new(5, CycleId(cycle), cycle as i64 * 10, priority)
    }

    #[test]
    fn task_id_auto_increment() {
        let id1 = TaskId::next();
        let id2 = TaskId::next();
        assert!(id2.0 > id1.0);
    }

    #[test]
    fn task_id_display() {
        let id = TaskId(42);
        assert_eq!(id.to_string(), "task-42");
    }

    #[test]
    fn queue_push_and_pop() {
        let q = TaskQueue::new();
        q.push(make_task(TaskPriority::Normal, 7));
        assert_eq!(q.len(), 1);
        assert!(!q.is_empty());

        let task = q.try_pop().unwrap();
        assert_eq!(task.cycle, CycleId(7));
        assert!(q.is_empty());
    }

    #[test]
    fn queue_empty_returns_none() {
        let q = TaskQueue::new();
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn queue_priority_ordering() {
        let q = TaskQueue::new();

        q.push(make_task(TaskPriority::Low, 1));
        q.push(make_task(TaskPriority::Normal, 2));
        q.push(make_task(TaskPriority::High, 3));

        assert_eq!(q.try_pop().unwrap().cycle, CycleId(3));
        assert_eq!(q.try_pop().unwrap().cycle, CycleId(2));
        assert_eq!(q.try_pop().unwrap().cycle, CycleId(1));
    }

    #[test]
    fn queue_same_priority_fifo() {
        let q = TaskQueue::new();

        q.push(make_task(TaskPriority::Normal, 1));
        // Small delay to ensure different timestamps.
        std::thread::sleep(std::time::Duration::from_millis(1));
        q.push(make_task(TaskPriority::Normal, 2));

        assert_eq!(q.try_pop().unwrap().cycle, CycleId(1));
        assert_eq!(q.try_pop().unwrap().cycle, CycleId(2));
    }

    #[test]
    fn priority_ordering_enum() {
        assert!(TaskPriority::High > TaskPriority::Normal);
        assert!(TaskPriority::Normal > TaskPriority::Low);
    }
}
