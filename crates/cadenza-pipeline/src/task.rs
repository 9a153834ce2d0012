use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_utils::sync::Unparker;
use parking_lot::Mutex;

use crate::error::PipelineError;

/// Called once when a task finishes, from the thread that processed it and
/// while that thread still holds the pipeline. Submitting another task from
/// inside the handler is safe; waiting for one is not.
pub type CompletionHandler = Box<dyn FnOnce(Arc<PipelineTask>) + Send + 'static>;

/// Submission lifecycle of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Constructed, not yet submitted.
    New,
    /// Submitted and somewhere in the pipeline.
    Scheduled,
    /// Executed. The record is immutable and owned by the submitter again;
    /// it may be resubmitted, which restarts the cycle.
    Finished,
}

const STATE_NEW: u8 = 0;
const STATE_SCHEDULED: u8 = 1;
const STATE_FINISHED: u8 = 2;

#[derive(Default)]
struct CompletionSlot {
    waiter: Option<Unparker>,
    handler: Option<CompletionHandler>,
}

/// A unit of asynchronous control work, executed serially on the pipeline.
///
/// The record is allocated by the submitter and shared with the pipeline
/// through an [`Arc`]. What the task *does* is carried as an opaque payload
/// that the pipeline backend downcasts in its `process_task` hook.
pub struct PipelineTask {
    state: AtomicU8,
    success: AtomicBool,
    completion: Mutex<CompletionSlot>,
    payload: Mutex<Box<dyn Any + Send>>,
}

impl PipelineTask {
    pub fn new(payload: impl Any + Send) -> Self {
        Self {
            state: AtomicU8::new(STATE_NEW),
            success: AtomicBool::new(false),
            completion: Mutex::new(CompletionSlot::default()),
            payload: Mutex::new(Box::new(payload)),
        }
    }

    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::Acquire) {
            STATE_NEW => TaskState::New,
            STATE_SCHEDULED => TaskState::Scheduled,
            _ => TaskState::Finished,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_FINISHED
    }

    /// Whether the task executed successfully. Meaningful only once
    /// [`is_finished`](Self::is_finished) has been observed.
    pub fn succeeded(&self) -> bool {
        self.success.load(Ordering::Acquire)
    }

    /// Runs `f` on the payload if it is a `P`.
    pub fn with_payload<P: Any, R>(&self, f: impl FnOnce(&mut P) -> R) -> Option<R> {
        let mut payload = self.payload.lock();
        payload.downcast_mut::<P>().map(f)
    }

    /// Claims the record for a new submission and installs the completion
    /// slot. Allowed from `New` and from `Finished` (reuse); a record that
    /// is already `Scheduled` is rejected untouched.
    pub(crate) fn begin_submission(
        &self,
        waiter: Option<Unparker>,
        handler: Option<CompletionHandler>,
    ) -> Result<(), PipelineError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == STATE_SCHEDULED {
                return Err(PipelineError::AlreadyScheduled);
            }
            match self.state.compare_exchange(
                current,
                STATE_SCHEDULED,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        // The record is not yet visible in the pending queue, so the slot
        // is exclusively ours here.
        let mut slot = self.completion.lock();
        slot.waiter = waiter;
        slot.handler = handler;
        Ok(())
    }

    /// Completion protocol: result first, then the finished marker, then
    /// notifications. After the finished store the submitter owns the
    /// record again, so the slot is emptied beforehand.
    pub(crate) fn complete(this: &Arc<Self>, success: bool) {
        let (waiter, handler) = {
            let mut slot = this.completion.lock();
            (slot.waiter.take(), slot.handler.take())
        };
        this.success.store(success, Ordering::Release);
        this.state.store(STATE_FINISHED, Ordering::Release);
        if let Some(waiter) = waiter {
            waiter.unpark();
        }
        if let Some(handler) = handler {
            handler(Arc::clone(this));
        }
    }
}

impl fmt::Debug for PipelineTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineTask")
            .field("state", &self.state())
            .field("success", &self.success.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
