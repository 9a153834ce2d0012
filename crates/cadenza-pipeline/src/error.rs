use thiserror::Error;

/// Errors surfaced by the submission entry points.
///
/// Execution failures are not errors at this level: a task whose backend
/// hook fails still completes, with [`PipelineTask::succeeded`] returning
/// `false`.
///
/// [`PipelineTask::succeeded`]: crate::task::PipelineTask::succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The task was submitted while a previous submission is still in
    /// flight. The record is left untouched.
    #[error("task is already scheduled")]
    AlreadyScheduled,
    /// Reserved. Tasks cannot be cancelled once submitted.
    #[error("task was cancelled")]
    Cancelled,
}
