use async_trait::async_trait;
use crate::error::Result;
use crate::pool::WorkerContext;
use crate::sentence::SentenceBatch;

/// The numeric model behind a translation task.
///
/// Implementations receive one mini-batch at a time together with the
/// context of the worker running it, and must issue all device work on that
/// worker's stream. They are shared by every worker.
///
/// # Example
///
/// ```ignore
/// struct Upper;
///
/// #[async_trait]
/// impl Translator for Upper {
///     async fn translate(&self, _worker: &WorkerContext, batch: &SentenceBatch) -> Result<Vec<String>> {
///         Ok(batch.iter().map(|s| s.to_string().to_uppercase()).collect())
///     }
/// }
/// ```
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate every sentence of `batch`.
    ///
    /// # Returns
    ///
    /// One output line per sentence, in batch order.
    async fn translate(&self, worker: &WorkerContext, batch: &SentenceBatch) -> Result<Vec<String>>;
}
