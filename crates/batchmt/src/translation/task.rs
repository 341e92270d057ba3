use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, warn};
use uuid::Uuid;
use crate::config::FailurePolicy;
use crate::context::Context;
use crate::error::{Error, Result, TaskError};
use crate::pool::{panic_message, TaskHandle, WorkerContext, WorkerPool};
use crate::scheduler::Dispatch;
use crate::sentence::SentenceBatch;

/// One unit of work: a mini-batch it owns and the run context it shares.
pub struct TranslationTask {
    context: Arc<Context>,
    batch: SentenceBatch,
}

impl TranslationTask {
    pub fn new(context: Arc<Context>, batch: SentenceBatch) -> Self {
        Self { context, batch }
    }

    pub fn batch(&self) -> &SentenceBatch {
        &self.batch
    }

    /// Translate the batch on `worker` and hand each output to the collector
    /// under its sentence index. Returns the number of sentences translated.
    ///
    /// Does no work once the run has been aborted. A failure is applied to
    /// the run before it is returned: fatal errors, and any failure under
    /// [`FailurePolicy::Abort`], abort the run; other failures under
    /// [`FailurePolicy::Log`] give each of the batch's sentences an empty line.
    pub async fn run(self, worker: WorkerContext) -> Result<usize> {
        if let Some(err) = self.context.aborted() {
            return Err(err.clone().into());
        }

        let outcome = AssertUnwindSafe(self.translate(&worker)).catch_unwind().await;
        let err = match outcome {
            Ok(Ok(translated)) => return Ok(translated),
            Ok(Err(err)) => TaskError::from(err),
            Err(panic) => TaskError::Panicked(panic_message(panic.as_ref())),
        };

        match (err.is_fatal(), self.context.failure_policy()) {
            (false, FailurePolicy::Log) => {
                for index in self.batch.indices() {
                    self.context.output().skip(index).await?;
                }
            }
            _ => self.context.abort(err.clone()),
        }
        Err(err.into())
    }

    async fn translate(&self, worker: &WorkerContext) -> Result<usize> {
        let outputs = self.context.translator().translate(worker, &self.batch).await?;
        if outputs.len() != self.batch.len() {
            return Err(Error::Task(TaskError::Failed(format!(
                "translator returned {} outputs for {} sentences",
                outputs.len(),
                self.batch.len()
            ))));
        }
        for (sentence, text) in self.batch.iter().zip(outputs) {
            self.context.output().add(sentence.index(), text).await?;
        }
        Ok(self.batch.len())
    }
}

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Sentences read from the input.
    pub sentences: usize,
    /// Sentences whose task completed.
    pub translated: usize,
    /// Mini-batches dispatched.
    pub mini_batches: usize,
    /// Tasks that failed under the log-and-continue policy.
    pub failed_tasks: usize,
    /// Input indices that never produced output.
    pub missing: Vec<usize>,
}

/// Scheduler target that turns each mini-batch into a [`TranslationTask`] on
/// the worker pool and keeps its completion handle.
pub struct TranslationDispatcher {
    context: Arc<Context>,
    pool: WorkerPool,
    pending: Vec<TaskHandle<usize>>,
}

impl TranslationDispatcher {
    pub fn new(context: Arc<Context>, pool: WorkerPool) -> Self {
        Self {
            context,
            pool,
            pending: vec![],
        }
    }

    /// Tasks dispatched and not yet observed.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Drain the pool, then observe every task under the failure policy.
    ///
    /// Fatal task errors always end the run; other failures end it only under
    /// [`FailurePolicy::Abort`]. Every handle is awaited before returning so no
    /// failure goes unlogged.
    pub async fn finish(self) -> Result<RunSummary> {
        let Self { context, pool, pending } = self;
        pool.shutdown().await;

        let policy = context.failure_policy();
        let mut summary = RunSummary {
            mini_batches: pending.len(),
            ..RunSummary::default()
        };
        let mut first_failure: Option<TaskError> = None;

        for handle in pending {
            let id = handle.id();
            match handle.await {
                Ok(translated) => summary.translated += translated,
                Err(err) => {
                    summary.failed_tasks += 1;
                    report_failure(id, &err, policy);
                    if (err.is_fatal() || policy == FailurePolicy::Abort) && first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        match first_failure {
            Some(err) => Err(err.into()),
            None => Ok(summary),
        }
    }
}

fn report_failure(id: Uuid, err: &TaskError, policy: FailurePolicy) {
    match (err.is_fatal(), policy) {
        (false, FailurePolicy::Log) => warn!(task = %id, %err, "translation task failed, continuing"),
        _ => error!(task = %id, %err, "translation task failed"),
    }
}

#[async_trait]
impl Dispatch for TranslationDispatcher {
    async fn dispatch(&mut self, mini_batch: SentenceBatch) -> Result<()> {
        if let Some(err) = self.context.aborted() {
            return Err(err.clone().into());
        }
        let task = TranslationTask::new(self.context.clone(), mini_batch);
        let handle = self.pool.enqueue(move |worker| task.run(worker)).await?;
        self.pending.push(handle);
        Ok(())
    }
}
