//! Error taxonomy for the batching and device layers.

use std::alloc::LayoutError;
use thiserror::Error;

/// Failures raised by a device while allocating or moving memory.
///
/// Every variant is fatal for the run: accelerator memory exhaustion is not
/// remedied by asking again, so nothing in this crate retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("invalid allocation layout: {0}")]
    InvalidLayout(String),

    #[error("device returned a null allocation for {0} bytes")]
    NullAllocation(usize),
}

impl From<LayoutError> for DeviceError {
    fn from(err: LayoutError) -> Self {
        DeviceError::InvalidLayout(err.to_string())
    }
}

/// Outcome of a unit of work that did not produce a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(String),

    #[error("task hit a fatal error: {0}")]
    Fatal(String),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task was dropped before it reported a result")]
    Dropped,
}

impl TaskError {
    /// Whether the failure must end the run whatever the failure policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Fatal(_))
    }
}

impl From<Error> for TaskError {
    fn from(err: Error) -> Self {
        match err {
            Error::Task(task) => task,
            err if err.is_fatal() => TaskError::Fatal(err.to_string()),
            err => TaskError::Failed(err.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("device fault: {0}")]
    Device(#[from] DeviceError),

    #[error("reshape to {requested} elements exceeds buffer capacity of {capacity}")]
    Capacity { requested: usize, capacity: usize },

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("worker pool is shut down and refuses new work")]
    PoolClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must end the run.
    ///
    /// Task-level failures are contained to their completion handle and left to
    /// the caller's failure policy unless the task itself hit a fatal error;
    /// everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Task(task) => task.is_fatal(),
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
