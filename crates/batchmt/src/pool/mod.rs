//! # Worker pool
//!
//! Decouples batch production from batch consumption.
//!
//! * [`WorkerPool`] - fixed worker count, bounded FIFO queue, drain-on-shutdown.
//! * [`TaskHandle`] - awaitable completion of one queued task.
//! * [`WorkerContext`] - what a task gets from the worker running it,
//!   including that worker's device stream.

mod handle;
mod job;
mod worker;

pub(crate) use job::panic_message;
pub use handle::TaskHandle;
pub use worker::{WorkerContext, WorkerPool};
