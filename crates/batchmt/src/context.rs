//! Shared state of one decoding run.

use std::sync::{Arc, OnceLock};
use tracing::error;
use crate::config::{DecoderConfig, FailurePolicy};
use crate::device::DeviceAllocator;
use crate::error::{Result, TaskError};
use crate::translation::{OutputCollector, Translator};

/// Everything a translation task needs besides its own mini-batch.
///
/// Built once at startup and shared as `Arc<Context>`. After construction
/// only the output collector and the abort slot change.
pub struct Context {
    config: DecoderConfig,
    device: Arc<dyn DeviceAllocator>,
    translator: Arc<dyn Translator>,
    output: OutputCollector,
    /// First error that ended the run, set at most once
    abort: OnceLock<TaskError>,
}

impl Context {
    /// Validates `config` so bad settings fail before any batching starts.
    pub fn new(
        config: DecoderConfig,
        device: Arc<dyn DeviceAllocator>,
        translator: Arc<dyn Translator>,
        output: OutputCollector,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            device,
            translator,
            output,
            abort: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn DeviceAllocator> {
        &self.device
    }

    pub fn translator(&self) -> &Arc<dyn Translator> {
        &self.translator
    }

    pub fn output(&self) -> &OutputCollector {
        &self.output
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.config.failure_policy
    }

    /// Ends the run: tasks not yet started skip translation and the
    /// dispatcher refuses new mini-batches. Only the first error is kept.
    pub fn abort(&self, err: TaskError) {
        let message = err.to_string();
        if self.abort.set(err).is_ok() {
            error!(err = %message, "aborting run");
        }
    }

    /// The error that ended the run, if any.
    pub fn aborted(&self) -> Option<&TaskError> {
        self.abort.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostDevice;
    use crate::error::Error;
    use crate::translation::ReverseTranslator;

    #[test]
    fn test_invalid_config_fails_construction() {
        let config = DecoderConfig { mini_batch: 0, ..DecoderConfig::default() };
        let built = Context::new(
            config,
            Arc::new(HostDevice::new()),
            Arc::new(ReverseTranslator),
            OutputCollector::new(std::io::sink()),
        );
        assert!(matches!(built, Err(Error::Config(_))));
    }

    #[test]
    fn test_exposes_policy() {
        let config = DecoderConfig { failure_policy: FailurePolicy::Log, ..DecoderConfig::default() };
        let context = Context::new(
            config,
            Arc::new(HostDevice::new()),
            Arc::new(ReverseTranslator),
            OutputCollector::new(std::io::sink()),
        )
        .unwrap();
        assert_eq!(context.failure_policy(), FailurePolicy::Log);
        assert_eq!(context.device().name(), "host");
    }

    #[test]
    fn test_abort_keeps_first_error() {
        let context = Context::new(
            DecoderConfig::default(),
            Arc::new(HostDevice::new()),
            Arc::new(ReverseTranslator),
            OutputCollector::new(std::io::sink()),
        )
        .unwrap();
        assert!(context.aborted().is_none());

        context.abort(TaskError::Fatal("device lost".into()));
        context.abort(TaskError::Failed("later".into()));
        assert_eq!(context.aborted(), Some(&TaskError::Fatal("device lost".into())));
    }
}
