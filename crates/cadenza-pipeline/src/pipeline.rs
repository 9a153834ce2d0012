use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cadenza_core::seqcell::SeqCell;
use cadenza_core::time::{Clock, Nanos};
use crossbeam_utils::sync::Parker;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::SchedulingConfig;
use crate::error::PipelineError;
use crate::frame::{Frame, StreamSpec};
use crate::queue::PendingQueue;
use crate::scheduler::{AtomicProcessingState, ProcessingState, TaskScheduler};
use crate::stats::{bump, Stats, StatsCounters};
use crate::task::{CompletionHandler, PipelineTask};
use crate::timing::{TaskTiming, DEADLINE_UNSET};

/// Operations the embedding pipeline supplies.
///
/// Both hooks run with the pipeline serialized: at any instant at most one
/// of them is active, on whichever thread currently drives the pipeline.
pub trait PipelineBackend: Send + 'static {
    /// Transforms one frame or sub-frame of interleaved samples. Returns
    /// whether processing succeeded.
    fn process_frame(&mut self, samples: &mut [f32]) -> bool;

    /// Executes one control task. Returns whether the task succeeded.
    fn process_task(&mut self, task: &PipelineTask) -> bool;
}

/// Where a task got executed, for the statistics.
#[derive(Clone, Copy)]
enum TaskSite {
    InPlace,
    InFrame,
    Interframe,
}

/// State owned by whichever thread holds the pipeline.
struct PipelineInner<B> {
    backend: B,
    /// End of the currently open in-frame task window.
    subframe_tasks_deadline: Nanos,
    /// Samples processed since the last in-frame task window, accumulated
    /// across frames so that tiny frames do not open a window each time.
    samples_processed: usize,
    enough_samples_to_process_tasks: bool,
}

/// Serializes latency-critical frame processing and asynchronous control
/// tasks on one pipeline, without owning a thread.
///
/// Frames enter through [`process_frame_and_tasks`], driven by the caller's
/// audio clock, and always win: every other operation backs off as soon as
/// it observes a pending frame. Tasks enter through [`schedule`] /
/// [`schedule_and_wait`] from any thread and are executed in the gaps, in
/// place when the pipeline is idle and the next predicted frame is far
/// enough away, between sub-frames of a large frame, or asynchronously via
/// the user-supplied [`TaskScheduler`] invoking [`process_tasks`].
///
/// [`schedule`]: Self::schedule
/// [`schedule_and_wait`]: Self::schedule_and_wait
/// [`process_frame_and_tasks`]: Self::process_frame_and_tasks
/// [`process_tasks`]: Self::process_tasks
pub struct Pipeline<C: Clock, B: PipelineBackend> {
    clock: C,
    timing: TaskTiming,
    scheduler: Arc<dyn TaskScheduler>,

    /// Guards all mutable pipeline state; held across exactly one frame,
    /// sub-frame, or task at a time.
    inner: Mutex<PipelineInner<B>>,
    /// Serializes calls into the external scheduler.
    scheduler_mutex: Mutex<()>,

    queue: PendingQueue,
    /// Tasks submitted and not yet popped for execution.
    pending_tasks: AtomicUsize,
    /// Frame calls currently inside `process_frame_and_tasks`. Non-zero
    /// means a frame wants the pipeline and everyone else yields.
    pending_frames: AtomicUsize,
    processing_state: AtomicProcessingState,
    /// Predicted start of the next frame, readable without locks.
    next_frame_deadline: SeqCell,
    stats: StatsCounters,
}

impl<C: Clock, B: PipelineBackend> Pipeline<C, B> {
    pub fn new(
        backend: B,
        clock: C,
        scheduler: Arc<dyn TaskScheduler>,
        config: &SchedulingConfig,
        spec: StreamSpec,
    ) -> Self {
        debug_assert!(spec.is_valid(), "invalid stream spec: {spec:?}");
        Self {
            clock,
            timing: TaskTiming::new(config, spec),
            scheduler,
            inner: Mutex::new(PipelineInner {
                backend,
                subframe_tasks_deadline: DEADLINE_UNSET,
                samples_processed: 0,
                enough_samples_to_process_tasks: false,
            }),
            scheduler_mutex: Mutex::new(()),
            queue: PendingQueue::new(),
            pending_tasks: AtomicUsize::new(0),
            pending_frames: AtomicUsize::new(0),
            processing_state: AtomicProcessingState::new(),
            next_frame_deadline: SeqCell::new(DEADLINE_UNSET),
            stats: StatsCounters::default(),
        }
    }

    /// Submits a task for execution.
    ///
    /// Never blocks on the pipeline. If the pipeline is idle and the
    /// current time is inside a task window, the task is executed on the
    /// calling thread before this returns; otherwise execution is deferred
    /// to an in-frame window or to the external scheduler. `handler`, if
    /// given, runs once on the thread that executes the task.
    pub fn schedule(
        &self,
        task: Arc<PipelineTask>,
        handler: Option<CompletionHandler>,
    ) -> Result<(), PipelineError> {
        self.submit(task, None, handler)
    }

    /// Submits a task and blocks until it finishes. Returns whether the
    /// backend reported success.
    ///
    /// Must not be called from a completion handler or from inside a
    /// backend hook: the task could only be executed by the very thread
    /// that would be blocked.
    pub fn schedule_and_wait(&self, task: Arc<PipelineTask>) -> Result<bool, PipelineError> {
        let parker = Parker::new();
        self.submit(Arc::clone(&task), Some(parker.unparker().clone()), None)?;
        while !task.is_finished() {
            parker.park();
        }
        Ok(task.succeeded())
    }

    /// Processes some of the pending tasks, if any.
    ///
    /// Intended to be invoked by the external scheduler in response to
    /// [`TaskScheduler::schedule_task_processing`]. Never blocks on the
    /// pipeline: it backs off on contention and yields to frames, re-arming
    /// the scheduler for whatever work remains. Late invocations after a
    /// cancellation are harmless.
    pub fn process_tasks(&self) {
        self.processing_state.store(ProcessingState::Running);

        match self.inner.try_lock() {
            Some(mut inner) => loop {
                if self.pending_frames.load(Ordering::SeqCst) > 0 {
                    bump(&self.stats.preemptions);
                    trace!("task processing preempted by a pending frame");
                    break;
                }
                if self.pending_tasks.load(Ordering::SeqCst) == 0 {
                    break;
                }
                let now = self.clock.now_ns();
                if !self
                    .timing
                    .interframe_allowed(now, self.next_frame_deadline.load())
                {
                    break;
                }
                let Some(task) = self.pop_task() else {
                    break;
                };
                self.execute_task(&mut inner, task, TaskSite::Interframe);
            },
            None => trace!("pipeline busy, task processing backs off"),
        }

        // The exit decision must not be skipped on contention: leaving the
        // Running claim behind with no one re-arming would strand pending
        // tasks. The critical section is tiny, so block here.
        let _guard = self.scheduler_mutex.lock();
        if self.pending_tasks.load(Ordering::SeqCst) > 0
            && self.pending_frames.load(Ordering::SeqCst) == 0
        {
            if self
                .processing_state
                .transition(ProcessingState::Running, ProcessingState::Scheduled)
            {
                self.arm_scheduler_locked();
            }
        } else {
            self.processing_state
                .transition(ProcessingState::Running, ProcessingState::NotScheduled);
        }
    }

    /// Processes one frame, interleaving pending tasks where the precise
    /// scheduling policy permits.
    ///
    /// The one entry point that may block on the pipeline: it announces
    /// itself through the pending-frame counter, which makes every
    /// concurrent task processor abort within one task. Returns whether the
    /// backend processed the whole frame successfully.
    pub fn process_frame_and_tasks(&self, frame: &mut Frame) -> bool {
        self.pending_frames.fetch_add(1, Ordering::SeqCst);
        self.cancel_async_task_processing();

        let mut inner = self.inner.lock();
        let success = if self.timing.precise() {
            self.process_frame_precise(&mut inner, frame)
        } else {
            inner.backend.process_frame(frame.samples_mut())
        };
        if !success {
            warn!(samples = frame.num_samples(), "frame processing failed");
        }
        self.pending_frames.fetch_sub(1, Ordering::SeqCst);
        drop(inner);

        if self.pending_tasks.load(Ordering::SeqCst) > 0 {
            self.schedule_async_task_processing(true);
        }
        success
    }

    /// Tasks submitted and not yet taken for execution.
    pub fn num_pending_tasks(&self) -> usize {
        self.pending_tasks.load(Ordering::SeqCst)
    }

    /// Concurrent `process_frame_and_tasks` calls currently in flight.
    pub fn num_pending_frames(&self) -> usize {
        self.pending_frames.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Stats {
        self.stats.snapshot()
    }

    fn submit(
        &self,
        task: Arc<PipelineTask>,
        waiter: Option<crossbeam_utils::sync::Unparker>,
        handler: Option<CompletionHandler>,
    ) -> Result<(), PipelineError> {
        task.begin_submission(waiter, handler)?;
        self.pending_tasks.fetch_add(1, Ordering::SeqCst);
        self.queue.push(task);

        self.try_process_tasks_in_place();

        if self.pending_tasks.load(Ordering::SeqCst) > 0 {
            self.schedule_async_task_processing(false);
        }
        Ok(())
    }

    /// The in-place fast path: if the pipeline is free, no frame is asking
    /// for it, and the clock is inside an interframe task window, drain
    /// tasks right on the submitter's thread.
    fn try_process_tasks_in_place(&self) {
        if self.pending_frames.load(Ordering::SeqCst) > 0 {
            return;
        }
        let Some(mut inner) = self.inner.try_lock() else {
            return;
        };
        loop {
            if self.pending_frames.load(Ordering::SeqCst) > 0 {
                break;
            }
            let now = self.clock.now_ns();
            if !self
                .timing
                .interframe_allowed(now, self.next_frame_deadline.load())
            {
                break;
            }
            let Some(task) = self.pop_task() else {
                break;
            };
            self.execute_task(&mut inner, task, TaskSite::InPlace);
        }
    }

    fn process_frame_precise(&self, inner: &mut PipelineInner<B>, frame: &mut Frame) -> bool {
        let frame_start = self.clock.now_ns();
        let deadline = self.timing.frame_deadline(frame_start, frame.num_samples());
        self.next_frame_deadline.store(deadline);

        let samples = frame.samples_mut();
        let mut pos = 0;
        while pos < samples.len() {
            let len = (samples.len() - pos).min(self.timing.max_samples_between_tasks);
            if !inner.backend.process_frame(&mut samples[pos..pos + len]) {
                return false;
            }
            pos += len;

            inner.samples_processed += len;
            if inner.samples_processed >= self.timing.min_samples_between_tasks {
                inner.enough_samples_to_process_tasks = true;
            }
            // Task windows exist between sub-frames only; work pending at
            // the end of the frame is picked up by the exit re-arm.
            if pos < samples.len() && self.pending_tasks.load(Ordering::SeqCst) > 0 {
                self.process_subframe_tasks(inner, deadline);
            }
        }
        true
    }

    fn process_subframe_tasks(&self, inner: &mut PipelineInner<B>, frame_deadline: Nanos) {
        if !inner.enough_samples_to_process_tasks {
            return;
        }
        let now = self.clock.now_ns();
        if !self.timing.subframe_allowed(now, frame_deadline) {
            return;
        }
        inner.subframe_tasks_deadline = self.timing.inframe_window_end(now);
        loop {
            // Our own frame accounts for one; a second one means another
            // clock-driver thread is waiting.
            if self.pending_frames.load(Ordering::SeqCst) > 1 {
                break;
            }
            let now = self.clock.now_ns();
            if now >= inner.subframe_tasks_deadline
                || !self.timing.subframe_allowed(now, frame_deadline)
            {
                break;
            }
            let Some(task) = self.pop_task() else {
                break;
            };
            self.execute_task(inner, task, TaskSite::InFrame);
        }
        inner.samples_processed = 0;
        inner.enough_samples_to_process_tasks = false;
    }

    fn pop_task(&self) -> Option<Arc<PipelineTask>> {
        let task = self.queue.pop()?;
        self.pending_tasks.fetch_sub(1, Ordering::SeqCst);
        Some(task)
    }

    fn execute_task(&self, inner: &mut PipelineInner<B>, task: Arc<PipelineTask>, site: TaskSite) {
        let success = inner.backend.process_task(&task);
        if !success {
            debug!(?task, "pipeline task failed");
        }
        bump(&self.stats.task_processed_total);
        match site {
            TaskSite::InPlace => bump(&self.stats.task_processed_in_place),
            TaskSite::InFrame => bump(&self.stats.task_processed_in_frame),
            TaskSite::Interframe => {}
        }
        PipelineTask::complete(&task, success);
    }

    /// Arms the external scheduler unless a frame claimed priority or the
    /// work is already covered. Lock-free callers pass `wait = false` and
    /// bail on scheduler-lock contention: whoever holds the lock re-reads
    /// the pending counters and makes an equivalent decision.
    fn schedule_async_task_processing(&self, wait: bool) {
        if self.pending_frames.load(Ordering::SeqCst) > 0 {
            return;
        }
        let guard = if wait {
            Some(self.scheduler_mutex.lock())
        } else {
            self.scheduler_mutex.try_lock()
        };
        let Some(_guard) = guard else {
            trace!("scheduler lock contended, deferring to its holder");
            return;
        };
        if self.pending_frames.load(Ordering::SeqCst) > 0
            || self.pending_tasks.load(Ordering::SeqCst) == 0
        {
            return;
        }
        if self
            .processing_state
            .transition(ProcessingState::NotScheduled, ProcessingState::Scheduled)
        {
            self.arm_scheduler_locked();
        }
    }

    /// Caller holds `scheduler_mutex` and has already moved
    /// `processing_state` to `Scheduled`.
    fn arm_scheduler_locked(&self) {
        let now = self.clock.now_ns();
        let deadline = self
            .timing
            .async_processing_deadline(now, self.next_frame_deadline.load());
        bump(&self.stats.scheduler_calls);
        debug!(deadline, "scheduling asynchronous task processing");
        self.scheduler.schedule_task_processing(deadline);
    }

    fn cancel_async_task_processing(&self) {
        let _guard = self.scheduler_mutex.lock();
        if self
            .processing_state
            .transition(ProcessingState::Scheduled, ProcessingState::NotScheduled)
        {
            bump(&self.stats.scheduler_cancellations);
            trace!("cancelling asynchronous task processing");
            self.scheduler.cancel_task_processing();
        }
    }
}
