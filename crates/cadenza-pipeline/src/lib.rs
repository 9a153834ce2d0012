#![deny(clippy::wildcard_imports)]

//! Frame/task arbitration core for real-time audio pipelines.
//!
//! A pipeline processes two kinds of work, strictly serialized: clock-driven
//! **frames** of samples that must run as close to real time as possible,
//! and asynchronous control **tasks** (reconfigurations, attachments,
//! queries) submitted from arbitrary threads. The pipeline owns no thread;
//! all processing happens inside the entry points, on the caller's thread.
//!
//! Frames always win. A pending frame is announced through an atomic
//! counter, and every other operation observes it and backs off, so the
//! frame acquires the pipeline within at most one in-flight task.
//!
//! Tasks are processed around frames. With precise task scheduling enabled
//! (the default), large frames are split into sub-frames and tasks run in
//! short windows between them, and between frames as long as the next
//! predicted frame start is comfortably far away. When the pipeline is idle
//! a submitted task is executed in place on the submitter's thread. Work
//! that cannot run immediately is handed to a user-supplied
//! [`TaskScheduler`], which calls back into [`Pipeline::process_tasks`] at a
//! hinted time near the middle of the next inter-frame gap.
//!
//! Submission is lock-free: `schedule` and `process_tasks` never wait for
//! the pipeline, they only `try_lock` and retreat.

pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod scheduler;
pub mod stats;
pub mod task;

mod queue;
mod timing;


pub use config::SchedulingConfig;
pub use error::PipelineError;
pub use frame::{Frame, StreamSpec};
pub use pipeline::{Pipeline, PipelineBackend};
pub use scheduler::TaskScheduler;
pub use stats::Stats;
pub use task::{CompletionHandler, PipelineTask, TaskState};
