//! Fixed-size pool of workers draining a bounded FIFO queue.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use crate::device::{DeviceAllocator, Stream};
use crate::error::{Error, Result};
use super::handle::TaskHandle;
use super::job::Job;

/// Per-worker execution state handed to every task the worker runs.
///
/// Each worker owns one [`Stream`] for its whole lifetime, so device work
/// issued by concurrent tasks never shares a command queue.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    index: usize,
    stream: Stream,
}

impl WorkerContext {
    pub fn new(index: usize, stream: Stream) -> Self {
        Self { index, stream }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn stream(&self) -> &Stream {
        &self.stream
    }
}

/// # WorkerPool
///
/// Runs submitted tasks on a fixed number of workers.
///
/// Tasks wait in a bounded queue and are dequeued strictly in submission
/// order; with more than one worker they complete in any order. When the
/// queue is full [`enqueue`](Self::enqueue) waits for room, which is the
/// producer's backpressure.
///
/// # Example
///
/// ```ignore
/// let pool = WorkerPool::new(Arc::new(HostDevice::new()), 4, 8);
/// let handle = pool.enqueue(|ctx| async move { Ok(ctx.index()) }).await?;
/// let worker = handle.await?;
/// pool.shutdown().await;
/// ```
pub struct WorkerPool {
    /// `None` once the pool stops accepting work
    sender: Option<mpsc::Sender<Job>>,

    /// Handles to the spawned worker tasks, drained by shutdown
    workers: Vec<JoinHandle<()>>,

    /// Flag indicating whether the pool still accepts work
    running: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawns the workers, each with its own stream on the device.
    ///
    /// # Parameters
    ///
    /// * `device` - The device every worker's [`Stream`] is created on.
    /// * `workers` - Number of workers; zero is treated as one.
    /// * `queue_depth` - Tasks allowed to wait for a worker before
    ///   [`enqueue`](Self::enqueue) blocks; zero is treated as one.
    ///
    /// # Returns
    ///
    /// A running pool that accepts work until it is closed.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(device: Arc<dyn DeviceAllocator>, workers: usize, queue_depth: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        let queue = Arc::new(Mutex::new(receiver));

        let handles = (0..workers)
            .map(|index| {
                let context = WorkerContext::new(index, Stream::new(device.clone()));
                tokio::spawn(worker_loop(context, queue.clone()))
            })
            .collect();

        info!(workers, queue_depth, device = device.name(), "worker pool started");
        Self {
            sender: Some(sender),
            workers: handles,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queues a task behind those already submitted.
    ///
    /// Waits while the queue is full.
    ///
    /// # Parameters
    ///
    /// * `task` - Called on the worker that dequeues it with that worker's
    ///   [`WorkerContext`]. Errors and panics in the returned future are
    ///   reported on the handle and never stop the worker.
    ///
    /// # Returns
    ///
    /// The task's [`TaskHandle`], or [`Error::PoolClosed`] once the pool has
    /// been closed.
    pub async fn enqueue<F, Fut, R>(&self, task: F) -> Result<TaskHandle<R>>
    where
        F: FnOnce(WorkerContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
        R: Send + 'static,
    {
        let sender = self.sender.as_ref().ok_or(Error::PoolClosed)?;
        let (job, handle) = Job::new(task);
        let id = job.id();
        sender.send(job).await.map_err(|_| Error::PoolClosed)?;
        debug!(task = %id, "task queued");
        Ok(handle)
    }

    /// Stop accepting work. Tasks already queued still run.
    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.sender.take();
    }

    /// Close the pool and wait until every queued task has finished.
    pub async fn shutdown(mut self) {
        self.close();
        for worker in self.workers.drain(..) {
            if let Err(err) = worker.await {
                error!(%err, "worker exited abnormally");
            }
        }
        info!("worker pool drained");
    }
}

impl Drop for WorkerPool {
    /// Closes the queue; workers finish what is queued in the background.
    fn drop(&mut self) {
        self.close();
    }
}

async fn worker_loop(context: WorkerContext, queue: Arc<Mutex<mpsc::Receiver<Job>>>) {
    debug!(worker = context.index(), stream = %context.stream().id(), "worker started");
    loop {
        // Holding the lock across recv keeps dequeue order FIFO across workers.
        let job = { queue.lock().await.recv().await };
        let Some(job) = job else {
            break;
        };
        job.run(context.clone()).await;
    }
    debug!(worker = context.index(), "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time;
    use crate::device::HostDevice;
    use crate::error::TaskError;

    fn pool(workers: usize, queue_depth: usize) -> WorkerPool {
        WorkerPool::new(Arc::new(HostDevice::new()), workers, queue_depth)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_runs_tasks_and_returns_results() {
        let pool = pool(2, 4);
        let handles = futures::future::join_all(
            (0..6).map(|i| pool.enqueue(move |_| async move { Ok(i * 10) })),
        )
        .await;
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.unwrap().await, Ok(i * 10));
        }
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_worker_runs_in_submission_order() {
        let pool = pool(1, 16);
        let order = Arc::new(std::sync::Mutex::new(vec![]));
        for i in 0..10 {
            let order = order.clone();
            pool.enqueue(move |_| async move {
                order.lock().unwrap().push(i);
                Ok(())
            })
            .await
            .unwrap();
        }
        pool.shutdown().await;
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failing_task_leaves_pool_usable() {
        let pool = pool(1, 4);

        let failed = pool
            .enqueue(|_| async move { Err::<(), _>(Error::Task(TaskError::Failed("simulated fault".into()))) })
            .await
            .unwrap();
        let panicked = pool
            .enqueue(|_| async move {
                if true {
                    panic!("simulated panic");
                }
                Ok(())
            })
            .await
            .unwrap();
        let next = pool.enqueue(|_| async move { Ok("still alive") }).await.unwrap();

        assert_eq!(failed.await, Err(TaskError::Failed("simulated fault".into())));
        assert_eq!(panicked.await, Err(TaskError::Panicked("simulated panic".into())));
        assert_eq!(next.await, Ok("still alive"));
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded_by_worker_count() {
        let pool = pool(2, 16);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let (active, peak) = (active.clone(), peak.clone());
            pool.enqueue(move |_| async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        }
        pool.shutdown().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_drains_queued_tasks() {
        let pool = pool(2, 32);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let done = done.clone();
            pool.enqueue(move |_| async move {
                time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        }
        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn test_closed_pool_refuses_work() {
        let mut pool = pool(1, 1);
        pool.close();
        assert!(!pool.is_running());
        let refused = pool.enqueue(|_| async move { Ok(()) }).await;
        assert!(matches!(refused, Err(Error::PoolClosed)));
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_each_worker_has_its_own_stream() {
        let pool = pool(3, 8);
        let (release, gate) = tokio::sync::watch::channel(false);
        let mut handles = vec![];
        for _ in 0..3 {
            let mut gate = gate.clone();
            handles.push(
                pool.enqueue(move |ctx| async move {
                    // Hold every worker busy so each task lands on a different one.
                    let _ = gate.wait_for(|open| *open).await;
                    Ok((ctx.index(), ctx.stream().id()))
                })
                .await
                .unwrap(),
            );
        }
        time::sleep(Duration::from_millis(50)).await;
        release.send(true).unwrap();

        let mut indices = HashSet::new();
        let mut streams = HashSet::new();
        for handle in handles {
            let (index, stream) = handle.await.unwrap();
            indices.insert(index);
            streams.insert(stream);
        }
        assert_eq!(indices.len(), 3);
        assert_eq!(streams.len(), 3);
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_queue_applies_backpressure() {
        let pool = pool(1, 1);
        let (release, gate) = oneshot::channel::<()>();

        let blocker = pool
            .enqueue(move |_| async move {
                let _ = gate.await;
                Ok(())
            })
            .await
            .unwrap();
        let queued = pool.enqueue(|_| async move { Ok(()) }).await.unwrap();
        time::sleep(Duration::from_millis(20)).await;

        let blocked = time::timeout(
            Duration::from_millis(50),
            pool.enqueue(|_| async move { Ok(()) }),
        )
        .await;
        assert!(blocked.is_err(), "enqueue should wait while the queue is full");

        release.send(()).unwrap();
        assert_eq!(blocker.await, Ok(()));
        assert_eq!(queued.await, Ok(()));
        pool.shutdown().await;
    }
}
