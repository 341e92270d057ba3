//! The decoder loop: input stream → scheduler → pool → ordered output.

use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncBufRead;
use tracing::info;
use crate::context::Context;
use crate::error::Result;
use crate::pool::WorkerPool;
use crate::scheduler::BatchScheduler;
use crate::translation::{RunSummary, TranslationDispatcher};

/// Translate every line of `reader` and write the results through the
/// context's output collector in input order.
///
/// Returns once the input is exhausted and every task has been drained and
/// observed. A fatal error, or any task failure under the abort policy,
/// aborts the run: reading stops at the next dispatch and that error is
/// returned.
///
/// # Panics
///
/// Must be called from within a Tokio runtime.
pub async fn run<R>(context: Arc<Context>, reader: R) -> Result<RunSummary>
where
    R: AsyncBufRead + Unpin,
{
    let started = Instant::now();
    let config = context.config();
    let scheduler_config = config.scheduler()?;
    let pool = WorkerPool::new(context.device().clone(), config.workers, config.queue_depth());
    let dispatcher = TranslationDispatcher::new(context.clone(), pool);
    let mut scheduler = BatchScheduler::new(scheduler_config, dispatcher)?;

    info!(
        mini_batch = scheduler_config.mini_size,
        maxi_batch = scheduler_config.maxi_size,
        workers = config.workers,
        "reading input"
    );
    let sentences = scheduler.read_lines(reader).await?;
    let dispatcher = scheduler.finish().await?;
    let mut summary = dispatcher.finish().await?;

    summary.sentences = sentences;
    summary.missing = context.output().finish(sentences).await?;
    info!(
        sentences = summary.sentences,
        mini_batches = summary.mini_batches,
        failed = summary.failed_tasks,
        elapsed = ?started.elapsed(),
        "translation finished"
    );
    Ok(summary)
}
