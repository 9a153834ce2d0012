use std::time::Duration;

/// Tuning for how task processing is interleaved with frame processing.
///
/// The durations are converted once at pipeline construction into sample
/// and nanosecond constants for the configured stream layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingConfig {
    /// Enables sub-frame splitting and the timed task windows. When
    /// disabled, frame and task processing simply compete for the pipeline.
    pub enable_precise_task_scheduling: bool,

    /// Minimum audio span processed between two in-frame task windows.
    /// Suppresses task windows after tiny frames to amortize overhead.
    pub min_frame_length_between_tasks: Duration,

    /// Maximum sub-frame span. Frames longer than this are split so that
    /// pending tasks get a chance between the pieces.
    pub max_frame_length_between_tasks: Duration,

    /// Upper bound on the time spent processing tasks inside a single
    /// in-frame window.
    pub max_inframe_task_processing: Duration,

    /// Full width of the exclusion window centered on each predicted frame
    /// start, during which task processing must not begin.
    pub task_processing_prohibited_interval: Duration,

    /// Pessimistic per-task execution bound used for window admission. A
    /// task is only started if this much time still fits before the next
    /// exclusion window.
    pub expected_task_processing_time: Duration,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            enable_precise_task_scheduling: true,
            min_frame_length_between_tasks: Duration::from_micros(200),
            max_frame_length_between_tasks: Duration::from_millis(1),
            max_inframe_task_processing: Duration::from_micros(20),
            task_processing_prohibited_interval: Duration::from_micros(200),
            expected_task_processing_time: Duration::from_micros(10),
        }
    }
}
