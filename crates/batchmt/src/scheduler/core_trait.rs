use async_trait::async_trait;
use crate::error::Result;
use crate::sentence::SentenceBatch;

/// Destination for the mini-batches a [`BatchScheduler`](super::BatchScheduler) cuts.
///
/// Each call hands over exclusive ownership of one mini-batch. An error stops
/// the scheduler and is returned to whoever drove it.
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// #[async_trait]
/// impl Dispatch for Printer {
///     async fn dispatch(&mut self, mini_batch: SentenceBatch) -> Result<()> {
///         println!("{:?}", mini_batch.indices());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Dispatch: Send {
    async fn dispatch(&mut self, mini_batch: SentenceBatch) -> Result<()>;
}

/// Collects mini-batches in dispatch order.
#[async_trait]
impl Dispatch for Vec<SentenceBatch> {
    async fn dispatch(&mut self, mini_batch: SentenceBatch) -> Result<()> {
        self.push(mini_batch);
        Ok(())
    }
}
