use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;
use crate::error::{Result, TaskError};
use super::handle::TaskHandle;
use super::WorkerContext;

type Work = Box<dyn FnOnce(WorkerContext) -> BoxFuture<'static, ()> + Send>;

/// # Job
///
/// A queued unit of work paired with the channel its outcome is reported on.
///
/// The closure runs on whichever worker dequeues it, with that worker's
/// [`WorkerContext`]. Errors and panics are caught here and delivered to the
/// [`TaskHandle`], so a failing job never takes its worker down.
pub(crate) struct Job {
    id: Uuid,
    work: Work,
}

impl Job {
    pub(crate) fn new<F, Fut, R>(task: F) -> (Self, TaskHandle<R>)
    where
        F: FnOnce(WorkerContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Send + 'static,
    {
        let id = Uuid::new_v4();
        let (sender, receiver) = oneshot::channel();
        let work: Work = Box::new(move |context: WorkerContext| {
            async move {
                let worker = context.index();
                let outcome = AssertUnwindSafe(async move { task(context).await })
                    .catch_unwind()
                    .await;
                let result = match outcome {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(TaskError::from(err)),
                    Err(panic) => Err(TaskError::Panicked(panic_message(panic.as_ref()))),
                };
                if let Err(err) = &result {
                    debug!(task = %id, worker, %err, "task did not complete");
                }
                // Nobody listening is fine: the caller chose not to observe this task.
                let _ = sender.send(result);
            }
            .boxed()
        });
        (Self { id, work }, TaskHandle::new(id, receiver))
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) async fn run(self, context: WorkerContext) {
        (self.work)(context).await
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::device::{HostDevice, Stream};
    use crate::error::Error;

    fn context() -> WorkerContext {
        WorkerContext::new(0, Stream::new(Arc::new(HostDevice::new())))
    }

    #[tokio::test]
    async fn test_job_reports_value() {
        let (job, handle) = Job::new(|ctx| async move { Ok(ctx.index() + 41) });
        assert_eq!(job.id(), handle.id());
        job.run(context()).await;
        assert_eq!(handle.await, Ok(41));
    }

    #[tokio::test]
    async fn test_job_reports_error() {
        let (job, handle) = Job::new(|_| async move {
            Err::<(), _>(Error::Task(TaskError::Failed("empty batch".into())))
        });
        job.run(context()).await;
        assert_eq!(handle.await, Err(TaskError::Failed("empty batch".into())));
    }

    #[tokio::test]
    async fn test_job_catches_panic() {
        let (job, handle) = Job::new(|_| async move {
            if true {
                panic!("kernel exploded");
            }
            Ok(())
        });
        job.run(context()).await;
        assert_eq!(handle.await, Err(TaskError::Panicked("kernel exploded".into())));
    }

    #[tokio::test]
    async fn test_job_without_listener_still_runs() {
        let (job, handle) = Job::new(|_| async move { Ok(()) });
        drop(handle);
        job.run(context()).await;
    }
}
