use std::fmt;

/// One input line: its 0-based position in the input stream and its tokens.
///
/// The index is assigned in arrival order and never changes; it is how output
/// is put back in input order after batching has reordered the work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentence {
    index: usize,
    tokens: Vec<String>,
}

impl Sentence {
    /// Tokenize `line` on whitespace.
    pub fn new(index: usize, line: &str) -> Self {
        Self {
            index,
            tokens: line.split_whitespace().map(str::to_owned).collect(),
        }
    }

    pub fn from_tokens(index: usize, tokens: Vec<String>) -> Self {
        Self { index, tokens }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Token count.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for Sentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(" "))
    }
}
