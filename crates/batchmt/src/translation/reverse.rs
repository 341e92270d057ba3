use async_trait::async_trait;
use tracing::trace;
use crate::device::{IMatrix, Shape};
use crate::error::{Error, Result, TaskError};
use crate::pool::WorkerContext;
use crate::sentence::SentenceBatch;
use super::core_trait::Translator;

const PAD: u32 = u32::MAX;

/// Stand-in model that emits every sentence with its tokens reversed.
///
/// It goes through the device the way a real model's input stage does: the
/// batch becomes a padded `positions x sentences` matrix on the worker's
/// stream, which is reshaped, flattened and read back before decoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReverseTranslator;

impl ReverseTranslator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Translator for ReverseTranslator {
    async fn translate(&self, worker: &WorkerContext, batch: &SentenceBatch) -> Result<Vec<String>> {
        let width = batch.len();
        let max_len = batch.max_len();
        if max_len == 0 {
            return Ok(vec![String::new(); width]);
        }

        // Row r, column c holds the source position emitted at step r for sentence c.
        let host: Vec<u32> = (0..max_len)
            .flat_map(|r| {
                batch.iter().map(move |s| match r < s.len() {
                    true => (s.len() - 1 - r) as u32,
                    false => PAD,
                })
            })
            .collect();

        let mut positions = IMatrix::new(worker.stream());
        positions.resize_zeroed(Shape::new(max_len, width))?;
        positions.copy_from_host(&host)?;
        positions.reshape(Shape::new4(max_len, 1, 1, width))?;
        positions.reshape_flatten();
        trace!(worker = worker.index(), buffer = %positions.debug(false)?, "positions on device");
        let positions = positions.copy_to_host()?;

        batch
            .iter()
            .enumerate()
            .map(|(c, sentence)| {
                (0..sentence.len())
                    .map(|r| {
                        let pos = positions[r * width + c];
                        sentence.tokens().get(pos as usize).map(String::as_str).ok_or_else(|| {
                            Error::Task(TaskError::Failed(format!(
                                "sentence {} has no token at position {pos}",
                                sentence.index()
                            )))
                        })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(|tokens| tokens.join(" "))
            })
            .collect()
    }
}
