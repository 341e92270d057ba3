use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;
use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::sentence::{Sentence, SentenceBatch};
use super::core_trait::Dispatch;

/// Running totals of what a scheduler has processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub sentences: usize,
    pub mini_batches: usize,
    pub maxi_batches: usize,
}

/// # BatchScheduler
///
/// Turns an arbitrarily ordered sentence stream into length-homogeneous
/// mini-batches.
///
/// Sentences accumulate in a maxi-batch. Once it holds `maxi_size`
/// sentences it is stably sorted by length and cut from the front into
/// mini-batches of at most `mini_size`, each handed to the [`Dispatch`]
/// target before the next maxi-batch begins. [`flush`](Self::flush) does the
/// same for a partial maxi-batch at end of input, so every sentence is
/// dispatched exactly once.
///
/// Batching only reorders work. Every sentence keeps its input index, which
/// is what output consumers use to restore input order.
///
/// The scheduler runs on the producer and is not shared.
pub struct BatchScheduler<D> {
    config: SchedulerConfig,
    maxi_batch: SentenceBatch,
    dispatcher: D,
    next_index: usize,
    stats: SchedulerStats,
}

impl<D: Dispatch> BatchScheduler<D> {
    pub fn new(config: SchedulerConfig, dispatcher: D) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            maxi_batch: SentenceBatch::with_capacity(config.maxi_size),
            dispatcher,
            next_index: 0,
            stats: SchedulerStats::default(),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Sentences buffered in the current maxi-batch.
    pub fn pending(&self) -> usize {
        self.maxi_batch.len()
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Buffers a sentence and dispatches the maxi-batch once it is full.
    ///
    /// # Parameters
    ///
    /// * `sentence` - The next input sentence. Its index is kept as given and
    ///   later [`submit_line`](Self::submit_line) calls continue after it.
    ///
    /// # Returns
    ///
    /// `Ok(())` once the sentence is buffered, or the dispatch target's error
    /// if a full maxi-batch could not be handed off.
    pub async fn submit(&mut self, sentence: Sentence) -> Result<()> {
        self.next_index = self.next_index.max(sentence.index() + 1);
        self.maxi_batch.push(sentence);
        self.stats.sentences += 1;
        if self.maxi_batch.len() >= self.config.maxi_size {
            self.dispatch_maxi_batch().await?;
        }
        Ok(())
    }

    /// Tokenize `line` as the next sentence in arrival order. Returns its index.
    pub async fn submit_line(&mut self, line: &str) -> Result<usize> {
        let index = self.next_index;
        self.submit(Sentence::new(index, line)).await?;
        Ok(index)
    }

    /// Submits every line of a reader until end of input.
    ///
    /// Lines end at `\n` or `\r\n`. Bytes that are not valid UTF-8 are
    /// replaced with U+FFFD rather than failing the run.
    ///
    /// # Parameters
    ///
    /// * `reader` - Line-oriented input, one sentence per line.
    ///
    /// # Returns
    ///
    /// The number of lines read, or the first read or dispatch error.
    pub async fn read_lines<R>(&mut self, mut reader: R) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut buf = Vec::new();
        let mut count = 0;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }
            self.submit_line(&String::from_utf8_lossy(&buf)).await?;
            count += 1;
        }
        Ok(count)
    }

    /// Dispatch whatever is buffered, even below `maxi_size`.
    pub async fn flush(&mut self) -> Result<()> {
        if self.maxi_batch.is_empty() {
            return Ok(());
        }
        self.dispatch_maxi_batch().await
    }

    /// Flush and hand back the dispatch target.
    pub async fn finish(mut self) -> Result<D> {
        self.flush().await?;
        debug!(
            sentences = self.stats.sentences,
            mini_batches = self.stats.mini_batches,
            maxi_batches = self.stats.maxi_batches,
            "scheduler finished"
        );
        Ok(self.dispatcher)
    }

    async fn dispatch_maxi_batch(&mut self) -> Result<()> {
        let mut maxi_batch = std::mem::replace(
            &mut self.maxi_batch,
            SentenceBatch::with_capacity(self.config.maxi_size),
        );
        maxi_batch.sort_by_length(self.config.sort_order);
        debug!(
            sentences = maxi_batch.len(),
            longest = maxi_batch.max_len(),
            "dispatching maxi-batch"
        );
        self.stats.maxi_batches += 1;

        while !maxi_batch.is_empty() {
            let mini_batch = maxi_batch.take_mini_batch(self.config.mini_size);
            debug!(sentences = mini_batch.len(), longest = mini_batch.max_len(), "dispatching mini-batch");
            self.dispatcher.dispatch(mini_batch).await?;
            self.stats.mini_batches += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sentence(index: usize, len: usize) -> Sentence {
        Sentence::from_tokens(index, (0..len).map(|t| format!("t{t}")).collect())
    }

    fn lengths(batch: &SentenceBatch) -> Vec<usize> {
        batch.iter().map(Sentence::len).collect()
    }

    fn scheduler(mini: usize, maxi: usize) -> BatchScheduler<Vec<SentenceBatch>> {
        BatchScheduler::new(SchedulerConfig::new(mini, maxi).unwrap(), vec![]).unwrap()
    }

    #[tokio::test]
    async fn test_full_maxi_batch_is_sorted_and_sliced() {
        let mut scheduler = scheduler(2, 4);
        for (i, len) in [5, 1, 3, 2].into_iter().enumerate() {
            scheduler.submit(sentence(i, len)).await.unwrap();
        }

        // Both mini-batches go out as soon as the fourth sentence arrives.
        assert_eq!(scheduler.pending(), 0);
        let dispatched = scheduler.dispatcher();
        assert_eq!(dispatched.len(), 2);
        assert_eq!(lengths(&dispatched[0]), vec![1, 2]);
        assert_eq!(lengths(&dispatched[1]), vec![3, 5]);
        assert_eq!(dispatched[0].indices(), vec![1, 3]);
        assert_eq!(dispatched[1].indices(), vec![2, 0]);
    }

    #[tokio::test]
    async fn test_nothing_dispatched_below_maxi_size() {
        let mut scheduler = scheduler(2, 4);
        for i in 0..3 {
            scheduler.submit(sentence(i, 1)).await.unwrap();
        }
        assert!(scheduler.dispatcher().is_empty());
        assert_eq!(scheduler.pending(), 3);
    }

    #[tokio::test]
    async fn test_exactly_maxi_size_then_end_of_input() {
        let mut scheduler = scheduler(2, 5);
        for (i, len) in [4, 4, 2, 9, 1].into_iter().enumerate() {
            scheduler.submit(sentence(i, len)).await.unwrap();
        }
        let dispatched = scheduler.finish().await.unwrap();
        let sizes: Vec<_> = dispatched.iter().map(SentenceBatch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(lengths(&dispatched[0]), vec![1, 2]);
        assert_eq!(lengths(&dispatched[1]), vec![4, 4]);
        assert_eq!(dispatched[1].indices(), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_flush_below_maxi_size() {
        let mut scheduler = scheduler(2, 8);
        for i in 0..5 {
            scheduler.submit(sentence(i, 5 - i)).await.unwrap();
        }
        assert!(scheduler.dispatcher().is_empty());
        let dispatched = scheduler.finish().await.unwrap();
        let sizes: Vec<_> = dispatched.iter().map(SentenceBatch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_flush_of_empty_scheduler_dispatches_nothing() {
        let mut scheduler = scheduler(3, 3);
        scheduler.flush().await.unwrap();
        assert!(scheduler.dispatcher().is_empty());
        assert_eq!(scheduler.stats().maxi_batches, 0);
    }

    #[tokio::test]
    async fn test_mini_larger_than_maxi_yields_one_batch_per_cycle() {
        let mut scheduler = scheduler(10, 3);
        for i in 0..7 {
            scheduler.submit(sentence(i, 1)).await.unwrap();
        }
        let dispatched = scheduler.finish().await.unwrap();
        let sizes: Vec<_> = dispatched.iter().map(SentenceBatch::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[tokio::test]
    async fn test_read_lines_assigns_arrival_indices() {
        let input: &[u8] = b"a b c\nd\n\ne f\n";
        let mut scheduler = scheduler(2, 2);
        let read = scheduler.read_lines(input).await.unwrap();
        assert_eq!(read, 4);

        let stats = scheduler.stats();
        assert_eq!(stats.sentences, 4);
        assert_eq!(stats.maxi_batches, 2);
        assert_eq!(stats.mini_batches, 2);

        let dispatched = scheduler.finish().await.unwrap();
        assert_eq!(dispatched[0].indices(), vec![1, 0]);
        assert_eq!(dispatched[1].indices(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_read_lines_survives_invalid_utf8_and_crlf() {
        let input: &[u8] = b"ok line\r\nbad \xff\xfe byte\nlast";
        let mut scheduler = scheduler(1, 1);
        assert_eq!(scheduler.read_lines(input).await.unwrap(), 3);

        let dispatched = scheduler.finish().await.unwrap();
        let texts: Vec<String> = dispatched.iter().flat_map(|b| b.iter().map(|s| s.to_string())).collect();
        assert_eq!(texts, vec!["ok line", "bad \u{FFFD}\u{FFFD} byte", "last"]);
    }

    #[tokio::test]
    async fn test_submit_line_continues_after_explicit_indices() {
        let mut scheduler = scheduler(1, 10);
        scheduler.submit(sentence(4, 1)).await.unwrap();
        assert_eq!(scheduler.submit_line("next").await.unwrap(), 5);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = SchedulerConfig { mini_size: 0, maxi_size: 4, sort_order: Default::default() };
        assert!(matches!(BatchScheduler::new(config, Vec::<SentenceBatch>::new()), Err(Error::Config(_))));
    }

    struct Refusing;

    #[async_trait::async_trait]
    impl Dispatch for Refusing {
        async fn dispatch(&mut self, _mini_batch: SentenceBatch) -> Result<()> {
            Err(Error::PoolClosed)
        }
    }

    #[tokio::test]
    async fn test_dispatch_error_stops_the_scheduler() {
        let mut scheduler = BatchScheduler::new(SchedulerConfig::new(1, 1).unwrap(), Refusing).unwrap();
        assert!(matches!(scheduler.submit(sentence(0, 1)).await, Err(Error::PoolClosed)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(100))]

            #[test]
            fn prop_every_sentence_dispatched_exactly_once(
                lens in prop::collection::vec(0usize..12, 0..60),
                mini in 1usize..8,
                maxi in 1usize..20,
            ) {
                let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
                let dispatched = runtime.block_on(async {
                    let mut scheduler = scheduler(mini, maxi);
                    for (i, len) in lens.iter().enumerate() {
                        scheduler.submit(sentence(i, *len)).await.unwrap();
                    }
                    scheduler.finish().await.unwrap()
                });

                let mut seen: Vec<(usize, usize)> = dispatched
                    .iter()
                    .flat_map(|batch| batch.iter().map(|s| (s.index(), s.len())))
                    .collect();
                seen.sort();
                let expected: Vec<(usize, usize)> = lens.iter().copied().enumerate().collect();
                prop_assert_eq!(seen, expected);

                for batch in &dispatched {
                    prop_assert!(!batch.is_empty());
                    prop_assert!(batch.len() <= mini);
                    let lengths = lengths(batch);
                    prop_assert!(lengths.windows(2).all(|w| w[0] <= w[1]));
                }
            }
        }
    }
}
