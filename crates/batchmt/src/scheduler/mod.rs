//! # Two-level batching
//!
//! [`BatchScheduler`] accumulates a maxi-batch, sorts it by sentence length
//! and slices it into mini-batches for a [`Dispatch`] target.

mod batcher;
mod core_trait;

pub use batcher::{BatchScheduler, SchedulerStats};
pub use core_trait::Dispatch;
