//! # batchmt
//!
//! Serving-time core of a batched sentence-translation engine.
//!
//! ## Overview
//!
//! An unbounded stream of input sentences is regrouped into fixed-size,
//! length-homogeneous work units and translated concurrently on a worker
//! pool, while the numeric state of each translation lives in growable
//! device buffers.
//!
//! ```text
//! input lines ─▶ BatchScheduler ─▶ WorkerPool ─▶ TranslationTask ─▶ OutputCollector
//!                (maxi → sort → mini)             (DeviceBuffer on the
//!                                                  worker's Stream)
//! ```
//!
//! ## Architecture
//!
//! ### Two-level batching
//!
//! [`scheduler::BatchScheduler`] buffers a *maxi-batch* of sentences, sorts
//! it by length and cuts it into *mini-batches*. Sentences of similar length
//! share a mini-batch, so fixed-shape kernels waste little work on padding.
//! Each sentence keeps its input index; [`translation::OutputCollector`] uses
//! it to write output in input order.
//!
//! ### Worker pool
//!
//! [`pool::WorkerPool`] runs tasks on a fixed number of workers fed by a
//! bounded FIFO queue. Each worker owns one device [`device::Stream`]. A failed
//! or panicking task is reported on its [`pool::TaskHandle`] and the worker
//! moves on.
//!
//! ### Device buffers
//!
//! [`device::DeviceBuffer`] is a 4-D tensor over a single device allocation
//! whose capacity only grows, so repeated resizes across decoding steps stop
//! reallocating once the largest shape has been seen.
//!
//! ### Run context
//!
//! [`context::Context`] bundles configuration, device, translator and output
//! collector. It is built once and shared by reference with every task.
//!
//! ## Errors
//!
//! Configuration errors, device faults and capacity violations are fatal.
//! A fatal task error aborts the run through [`context::Context::abort`]:
//! queued tasks skip their work and no further input is read. Other task
//! failures follow the configured [`config::FailurePolicy`].

pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod scheduler;
pub mod sentence;
pub mod translation;

pub use error::{Error, Result};
pub use pipeline::run;
