use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use uuid::Uuid;
use crate::error::TaskError;

/// # TaskHandle
///
/// Completion handle for one unit of work submitted to a
/// [`WorkerPool`](super::WorkerPool).
///
/// Awaiting the handle yields the task's value, or the [`TaskError`] the
/// worker attached to it. Dropping the handle does not cancel the task.
pub struct TaskHandle<T> {
    id: Uuid,
    receiver: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(id: Uuid, receiver: oneshot::Receiver<Result<T, TaskError>>) -> Self {
        Self { id, receiver }
    }

    /// Identifier shared with the worker's log lines for this task.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Dropped)))
    }
}
