//! Deadline model for precise task scheduling.
//!
//! Everything here is a pure function of the configuration, the stream
//! layout, and timestamps, so the admission policy is testable without any
//! concurrency in play.

use cadenza_core::time::{duration_to_nanos, nanos_to_samples, samples_to_nanos, Nanos};

use crate::config::SchedulingConfig;
use crate::frame::StreamSpec;

/// Sentinel for "no frame observed yet".
pub(crate) const DEADLINE_UNSET: Nanos = Nanos::MIN;

/// Sample and nanosecond constants derived once at construction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TaskTiming {
    precise: bool,
    sample_rate: u32,
    channels: u16,
    /// Minimum interleaved samples between two in-frame task windows.
    pub(crate) min_samples_between_tasks: usize,
    /// Maximum interleaved samples per sub-frame.
    pub(crate) max_samples_between_tasks: usize,
    /// Half-width of the exclusion window around each predicted frame start.
    no_task_proc_half_interval: Nanos,
    /// Pessimistic per-task execution bound.
    expected_task_cost: Nanos,
    /// Budget of a single in-frame task window.
    max_inframe_processing: Nanos,
}

impl TaskTiming {
    pub(crate) fn new(config: &SchedulingConfig, spec: StreamSpec) -> Self {
        let channels = spec.channels.max(1) as usize;
        let min_samples =
            nanos_to_samples(
                duration_to_nanos(config.min_frame_length_between_tasks),
                spec.sample_rate,
                spec.channels,
            );
        // At least one audio frame per sub-frame, aligned to whole frames,
        // so the splitter always makes progress.
        let max_samples = nanos_to_samples(
            duration_to_nanos(config.max_frame_length_between_tasks),
            spec.sample_rate,
            spec.channels,
        )
        .max(channels)
            / channels
            * channels;

        Self {
            precise: config.enable_precise_task_scheduling,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            min_samples_between_tasks: min_samples,
            max_samples_between_tasks: max_samples,
            no_task_proc_half_interval: duration_to_nanos(
                config.task_processing_prohibited_interval,
            ) / 2,
            expected_task_cost: duration_to_nanos(config.expected_task_processing_time),
            max_inframe_processing: duration_to_nanos(config.max_inframe_task_processing),
        }
    }

    pub(crate) fn precise(&self) -> bool {
        self.precise
    }

    /// Predicted start of the next frame, given where this one started.
    pub(crate) fn frame_deadline(&self, frame_start: Nanos, samples: usize) -> Nanos {
        frame_start.saturating_add(samples_to_nanos(samples, self.sample_rate, self.channels))
    }

    /// Whether a task may start between frames at `now`.
    ///
    /// Allowed when one task comfortably fits before the exclusion window
    /// of the next predicted frame, or when that prediction has already
    /// passed by more than the half-interval (the driver is late or has
    /// stopped; a real frame still preempts through the pending counter).
    pub(crate) fn interframe_allowed(&self, now: Nanos, deadline: Nanos) -> bool {
        if !self.precise || deadline == DEADLINE_UNSET {
            return true;
        }
        now.saturating_add(self.expected_task_cost) <= deadline - self.no_task_proc_half_interval
            || now >= deadline.saturating_add(self.no_task_proc_half_interval)
    }

    /// Whether a task may start between sub-frames at `now`, with the
    /// current frame predicted to end at `deadline`.
    pub(crate) fn subframe_allowed(&self, now: Nanos, deadline: Nanos) -> bool {
        if deadline == DEADLINE_UNSET {
            return false;
        }
        now.saturating_add(self.expected_task_cost) <= deadline - self.no_task_proc_half_interval
    }

    /// End of an in-frame task window opening at `now`.
    pub(crate) fn inframe_window_end(&self, now: Nanos) -> Nanos {
        now.saturating_add(self.max_inframe_processing)
    }

    /// Ideal absolute time for the next asynchronous `process_tasks`
    /// invocation: the midpoint of what remains of the current interframe
    /// window, or just past the exclusion window when inside it.
    pub(crate) fn async_processing_deadline(&self, now: Nanos, deadline: Nanos) -> Nanos {
        if !self.precise || deadline == DEADLINE_UNSET {
            return now;
        }
        let window_close = deadline - self.no_task_proc_half_interval;
        if now.saturating_add(self.expected_task_cost) <= window_close {
            now + (window_close - now) / 2
        } else if now < deadline.saturating_add(self.no_task_proc_half_interval) {
            deadline.saturating_add(self.no_task_proc_half_interval)
        } else {
            now
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{TaskTiming, DEADLINE_UNSET};
    use crate::config::SchedulingConfig;
    use crate::frame::StreamSpec;

    fn timing(config: &SchedulingConfig) -> TaskTiming {
        TaskTiming::new(config, StreamSpec::new(48_000, 2))
    }

    #[test]
    fn derived_sample_constants() {
        let t = timing(&SchedulingConfig::default());
        // 200 us at 48 kHz stereo is 9.6 audio frames, floored to 9.
        assert_eq!(t.min_samples_between_tasks, 18);
        // 1 ms is 48 frames.
        assert_eq!(t.max_samples_between_tasks, 96);
    }

    #[test]
    fn subframe_size_is_frame_aligned_and_nonzero() {
        let mut config = SchedulingConfig::default();
        config.max_frame_length_between_tasks = Duration::ZERO;
        let t = TaskTiming::new(&config, StreamSpec::new(48_000, 6));
        assert_eq!(t.max_samples_between_tasks, 6);
    }

    #[test]
    fn interframe_admission_respects_the_exclusion_window() {
        let mut config = SchedulingConfig::default();
        config.task_processing_prohibited_interval = Duration::from_millis(1);
        config.expected_task_processing_time = Duration::from_micros(100);
        let t = timing(&config);

        let deadline = 10_000_000; // 10 ms
        assert!(t.interframe_allowed(0, deadline));
        assert!(t.interframe_allowed(9_400_000, deadline));
        // One task no longer fits before the window opens.
        assert!(!t.interframe_allowed(9_450_000, deadline));
        // Inside the window.
        assert!(!t.interframe_allowed(10_000_000, deadline));
        // Past it: the prediction is stale, tasks must not starve.
        assert!(t.interframe_allowed(10_500_000, deadline));
        // No frame seen yet.
        assert!(t.interframe_allowed(0, DEADLINE_UNSET));
    }

    #[test]
    fn subframe_admission_has_no_reopen_past_the_deadline() {
        let mut config = SchedulingConfig::default();
        config.task_processing_prohibited_interval = Duration::from_millis(1);
        config.expected_task_processing_time = Duration::from_micros(100);
        let t = timing(&config);

        let deadline = 10_000_000;
        assert!(t.subframe_allowed(0, deadline));
        assert!(!t.subframe_allowed(9_450_000, deadline));
        assert!(!t.subframe_allowed(10_500_000, deadline));
        assert!(!t.subframe_allowed(0, DEADLINE_UNSET));
    }

    #[test]
    fn imprecise_mode_always_admits_interframe_work() {
        let mut config = SchedulingConfig::default();
        config.enable_precise_task_scheduling = false;
        let t = timing(&config);
        assert!(t.interframe_allowed(9_999_999, 10_000_000));
        assert_eq!(t.async_processing_deadline(123, 10_000_000), 123);
    }

    #[test]
    fn async_deadline_targets_the_window_midpoint() {
        let mut config = SchedulingConfig::default();
        config.task_processing_prohibited_interval = Duration::from_millis(1);
        let t = timing(&config);

        let deadline = 10_000_000;
        // Window closes at 9.5 ms; from t=0 the midpoint is 4.75 ms.
        assert_eq!(t.async_processing_deadline(0, deadline), 4_750_000);
        // Inside the exclusion window: right after it.
        assert_eq!(t.async_processing_deadline(9_800_000, deadline), 10_500_000);
        // Stale prediction: immediately.
        assert_eq!(t.async_processing_deadline(11_000_000, deadline), 11_000_000);
        assert_eq!(t.async_processing_deadline(42, DEADLINE_UNSET), 42);
    }
}
