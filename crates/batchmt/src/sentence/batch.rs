use std::cmp::Reverse;
use super::sentence::Sentence;

/// Direction for [`SentenceBatch::sort_by_length`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// An ordered collection of sentences.
///
/// Order is scheduling order, not input order. A sentence lives in exactly one
/// batch at a time: [`take_mini_batch`](Self::take_mini_batch) moves sentences
/// out rather than copying them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentenceBatch {
    sentences: Vec<Sentence>,
}

impl SentenceBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sentences: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sentence: Sentence) {
        self.sentences.push(sentence);
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sentence> {
        self.sentences.iter()
    }

    pub fn get(&self, i: usize) -> Option<&Sentence> {
        self.sentences.get(i)
    }

    /// Stable sort by token count; equal lengths keep their relative order.
    pub fn sort_by_length(&mut self, order: SortOrder) {
        match order {
            SortOrder::Ascending => self.sentences.sort_by_key(Sentence::len),
            SortOrder::Descending => self.sentences.sort_by_key(|s| Reverse(s.len())),
        }
    }

    /// Remove up to `n` sentences from the front and return them as a new batch.
    pub fn take_mini_batch(&mut self, n: usize) -> SentenceBatch {
        let take = n.min(self.sentences.len());
        Self {
            sentences: self.sentences.drain(..take).collect(),
        }
    }

    /// Token count of the longest sentence, 0 for an empty batch.
    pub fn max_len(&self) -> usize {
        self.sentences.iter().map(Sentence::len).max().unwrap_or(0)
    }

    /// Input indices in batch order.
    pub fn indices(&self) -> Vec<usize> {
        self.sentences.iter().map(Sentence::index).collect()
    }
}

impl FromIterator<Sentence> for SentenceBatch {
    fn from_iter<I: IntoIterator<Item = Sentence>>(iter: I) -> Self {
        Self {
            sentences: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for SentenceBatch {
    type Item = Sentence;
    type IntoIter = std::vec::IntoIter<Sentence>;

    fn into_iter(self) -> Self::IntoIter {
        self.sentences.into_iter()
    }
}

impl<'a> IntoIterator for &'a SentenceBatch {
    type Item = &'a Sentence;
    type IntoIter = std::slice::Iter<'a, Sentence>;

    fn into_iter(self) -> Self::IntoIter {
        self.sentences.iter()
    }
}
