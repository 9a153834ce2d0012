use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the pipeline's task-processing counters.
///
/// Intended for tests and benchmarks. The counters are updated while the
/// pipeline is running, so a snapshot taken concurrently with live traffic
/// is only a point-in-time approximation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Tasks processed in total.
    pub task_processed_total: u64,
    /// Tasks processed synchronously inside `schedule` / `schedule_and_wait`.
    pub task_processed_in_place: u64,
    /// Tasks processed inside `process_frame_and_tasks`.
    pub task_processed_in_frame: u64,
    /// Times an in-flight task-processing pass yielded to a frame.
    pub preemptions: u64,
    /// Calls made to `TaskScheduler::schedule_task_processing`.
    pub scheduler_calls: u64,
    /// Calls made to `TaskScheduler::cancel_task_processing`.
    pub scheduler_cancellations: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) task_processed_total: AtomicU64,
    pub(crate) task_processed_in_place: AtomicU64,
    pub(crate) task_processed_in_frame: AtomicU64,
    pub(crate) preemptions: AtomicU64,
    pub(crate) scheduler_calls: AtomicU64,
    pub(crate) scheduler_cancellations: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            task_processed_total: self.task_processed_total.load(Ordering::Relaxed),
            task_processed_in_place: self.task_processed_in_place.load(Ordering::Relaxed),
            task_processed_in_frame: self.task_processed_in_frame.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            scheduler_calls: self.scheduler_calls.load(Ordering::Relaxed),
            scheduler_cancellations: self.scheduler_cancellations.load(Ordering::Relaxed),
        }
    }
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}
