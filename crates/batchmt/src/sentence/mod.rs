//! Input units and the ordered collections they are scheduled in.

mod batch;
mod sentence;

pub use batch::{SentenceBatch, SortOrder};
pub use sentence::Sentence;
