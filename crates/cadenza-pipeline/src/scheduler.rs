use std::sync::atomic::{AtomicU8, Ordering};

use cadenza_core::time::Nanos;

/// Deferred-execution service the pipeline relies on for asynchronous task
/// processing, since it owns no thread of its own.
///
/// One scheduler instance serves one pipeline. The pipeline makes no
/// assumption about which thread the scheduled invocation arrives on, but
/// `schedule_task_processing` must not call back into
/// [`Pipeline::process_tasks`] synchronously: the pipeline holds its
/// scheduler lock across the call.
///
/// Cancellation is best effort. A cancelled invocation may still be
/// delivered; the pipeline tolerates it.
///
/// [`Pipeline::process_tasks`]: crate::pipeline::Pipeline::process_tasks
pub trait TaskScheduler: Send + Sync + 'static {
    /// Asks for `process_tasks` to be invoked at approximately
    /// `deadline_ns` on the pipeline's clock.
    fn schedule_task_processing(&self, deadline_ns: Nanos);

    /// Asks for a previously scheduled invocation to be revoked.
    fn cancel_task_processing(&self);
}

/// Lifecycle of the asynchronous task-processing invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessingState {
    NotScheduled,
    Scheduled,
    Running,
}

const PROC_NOT_SCHEDULED: u8 = 0;
const PROC_SCHEDULED: u8 = 1;
const PROC_RUNNING: u8 = 2;

impl ProcessingState {
    fn as_u8(self) -> u8 {
        match self {
            Self::NotScheduled => PROC_NOT_SCHEDULED,
            Self::Scheduled => PROC_SCHEDULED,
            Self::Running => PROC_RUNNING,
        }
    }
}

#[derive(Debug)]
pub(crate) struct AtomicProcessingState(AtomicU8);

impl AtomicProcessingState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(PROC_NOT_SCHEDULED))
    }

    pub(crate) fn store(&self, state: ProcessingState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    pub(crate) fn transition(&self, from: ProcessingState, to: ProcessingState) -> bool {
        self.0
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
