use crate::{cycle::CycleState, handle::ExecutionError};
use std::io;
use thiserror::Error;

/// Errors surfaced by a computation cycle.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CycleError {
    /// An operation was called in the wrong lifecycle state. Programmer
    /// error; never retried.
    #[error("cycle state must be one of {expected:?}, but is {actual}")]
    InvalidState {
        expected: &'static [CycleState],
        actual: CycleState,
    },
    /// `compute_delta` was given a previous cycle that has not finished.
    #[error("state of previous cycle must be {}, but is {actual}", CycleState::Finished)]
    PreviousCycleState { actual: CycleState },
    /// Execution was interrupted before every configuration completed.
    #[error("execution interrupted before completion")]
    Interrupted,
    /// A submitted sub-graph failed as a whole.
    #[error("unable to execute dependency graph of calculation configuration {configuration}")]
    Execution {
        configuration: String,
        #[source]
        source: ExecutionError,
    },
    /// Writing a diagnostic cache dump failed.
    #[error("writing cache of calculation configuration {configuration} to file failed")]
    CacheDump {
        configuration: String,
        #[source]
        source: io::Error,
    },
}
