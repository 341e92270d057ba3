//! Run configuration.
//!
//! ```text
//! DecoderConfig (command line)
//!   ├─ SchedulerConfig (mini/maxi batch sizes, sort order)
//!   ├─ worker pool sizing (workers, queue depth)
//!   ├─ device (optional memory limit)
//!   └─ failure policy, logging
//! ```

use std::path::PathBuf;
use clap::{Parser, ValueEnum};
use crate::error::{Error, Result};
use crate::sentence::SortOrder;

/// How the run reacts to a translation task that fails without a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FailurePolicy {
    /// Log the failure, count it, and keep going.
    Log,
    /// End the run with the first failure.
    #[default]
    Abort,
}

/// Batch sizing for [`BatchScheduler`](crate::scheduler::BatchScheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Upper bound on sentences per dispatched mini-batch.
    pub mini_size: usize,
    /// Sentences buffered before a sort-and-slice cycle.
    pub maxi_size: usize,
    pub sort_order: SortOrder,
}

impl SchedulerConfig {
    pub fn new(mini_size: usize, maxi_size: usize) -> Result<Self> {
        let config = Self {
            mini_size,
            maxi_size,
            sort_order: SortOrder::Ascending,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_sort_order(self, sort_order: SortOrder) -> Self {
        Self { sort_order, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mini_size == 0 {
            return Err(Error::Config("mini-batch must be a positive integer".into()));
        }
        if self.maxi_size == 0 {
            return Err(Error::Config("maxi-batch must be a positive integer".into()));
        }
        Ok(())
    }
}

/// Command-line configuration of the decoder.
#[derive(Debug, Clone, Parser)]
#[command(name = "batchmt-decoder")]
#[command(about = "Translate stdin line by line with maxi/mini-batch scheduling", long_about = None)]
pub struct DecoderConfig {
    /// Sentences per mini-batch handed to one translation task
    #[arg(long, default_value_t = 1)]
    pub mini_batch: usize,

    /// Sentences read ahead and sorted by length before slicing into mini-batches
    #[arg(long, default_value_t = 1)]
    pub maxi_batch: usize,

    /// Number of concurrent translation workers
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    /// Mini-batches allowed to wait for a worker; 0 means twice the worker count
    #[arg(long, default_value_t = 0)]
    pub queue_depth: usize,

    /// Read input from this file instead of stdin
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// What to do when a translation task fails
    #[arg(long, value_enum, default_value_t = FailurePolicy::Abort)]
    pub failure_policy: FailurePolicy,

    /// Cap on device memory in bytes; unlimited when omitted
    #[arg(long)]
    pub device_memory: Option<usize>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            mini_batch: 1,
            maxi_batch: 1,
            workers: 1,
            queue_depth: 0,
            input: None,
            failure_policy: FailurePolicy::Abort,
            device_memory: None,
            log_level: "info".to_string(),
        }
    }
}

impl DecoderConfig {
    /// Reject settings that would make batching impossible. Runs before any
    /// input is read.
    pub fn validate(&self) -> Result<()> {
        self.scheduler()?;
        if self.workers == 0 {
            return Err(Error::Config("workers must be a positive integer".into()));
        }
        Ok(())
    }

    pub fn scheduler(&self) -> Result<SchedulerConfig> {
        SchedulerConfig::new(self.mini_batch, self.maxi_batch)
    }

    /// Effective pool queue depth.
    pub fn queue_depth(&self) -> usize {
        match self.queue_depth {
            0 => self.workers.max(1) * 2,
            depth => depth,
        }
    }
}
