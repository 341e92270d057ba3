use std::collections::BTreeMap;
use std::io::Write;
use tokio::sync::Mutex;
use tracing::warn;
use crate::error::Result;

struct OutputState {
    next: usize,
    pending: BTreeMap<usize, String>,
    sink: Box<dyn Write + Send>,
    written: usize,
    skipped: Vec<usize>,
}

impl OutputState {
    fn drain_ready(&mut self) -> Result<()> {
        while let Some(text) = self.pending.remove(&self.next) {
            writeln!(self.sink, "{text}")?;
            self.next += 1;
            self.written += 1;
        }
        Ok(())
    }
}

/// Writes translations in input order regardless of completion order.
///
/// Outputs arrive keyed by sentence index from whichever task finishes
/// first; each is held until every lower index has been written.
pub struct OutputCollector {
    state: Mutex<OutputState>,
}

impl OutputCollector {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            state: Mutex::new(OutputState {
                next: 0,
                pending: BTreeMap::new(),
                sink: Box::new(sink),
                written: 0,
                skipped: vec![],
            }),
        }
    }

    /// Record the translation of sentence `index`, writing every output that
    /// is now next in line.
    pub async fn add(&self, index: usize, text: String) -> Result<()> {
        let mut state = self.state.lock().await;
        if index < state.next || state.pending.contains_key(&index) {
            warn!(index, "duplicate output ignored");
            return Ok(());
        }
        state.pending.insert(index, text);
        state.drain_ready()?;
        state.sink.flush()?;
        Ok(())
    }

    /// Give sentence `index` an empty line in place of a translation, so the
    /// output keeps one line per input line and later outputs are not held
    /// back. The index is reported as missing by [`finish`](Self::finish).
    /// Does nothing if the sentence already has output.
    pub async fn skip(&self, index: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        if index < state.next || state.pending.contains_key(&index) {
            return Ok(());
        }
        state.skipped.push(index);
        state.pending.insert(index, String::new());
        state.drain_ready()?;
        state.sink.flush()?;
        Ok(())
    }

    /// Lines written so far.
    pub async fn written(&self) -> usize {
        self.state.lock().await.written
    }

    /// End of run for `total` input sentences.
    ///
    /// Anything still held behind a gap is written in index order. Returns
    /// the indices that never received a translation, skipped ones included.
    pub async fn finish(&self, total: usize) -> Result<Vec<usize>> {
        let mut state = self.state.lock().await;
        let mut missing = vec![];
        while state.next < total || !state.pending.is_empty() {
            let next = state.next;
            match state.pending.remove(&next) {
                Some(text) => {
                    writeln!(state.sink, "{text}")?;
                    state.written += 1;
                }
                None => missing.push(next),
            }
            state.next += 1;
        }
        state.sink.flush()?;
        missing.append(&mut state.skipped);
        missing.sort_unstable();
        if !missing.is_empty() {
            warn!(count = missing.len(), "sentences without output");
        }
        Ok(missing)
    }
}
