use std::sync::Arc;

use crossbeam_queue::SegQueue;

use crate::task::PipelineTask;

/// Multi-producer queue of pending task records.
///
/// Any thread may push; only the thread holding the pipeline mutex pops.
/// The queue holds shared references and never completes tasks itself.
/// `pop` returning `None` is not proof that no work is pending anywhere in
/// the pipeline; the coordinator's pending-task counter is the source of
/// truth, and poppers back off and let the pusher arrange processing.
#[derive(Default)]
pub(crate) struct PendingQueue {
    inner: SegQueue<Arc<PipelineTask>>,
}

impl PendingQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    pub(crate) fn push(&self, task: Arc<PipelineTask>) {
        self.inner.push(task);
    }

    pub(crate) fn pop(&self) -> Option<Arc<PipelineTask>> {
        self.inner.pop()
    }
}
