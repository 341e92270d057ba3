//! Decoder entry point.
//!
//! Reads one sentence per line from stdin (or `--input`), translates with
//! maxi/mini-batch scheduling, and prints translations to stdout in input
//! order. Logs go to stderr.
//!
//! ```bash
//! cargo run --bin batchmt-decoder -- --mini-batch 16 --maxi-batch 256 --workers 4 < input.txt
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use clap::Parser;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use batchmt::config::DecoderConfig;
use batchmt::context::Context;
use batchmt::device::{DeviceAllocator, HostDevice};
use batchmt::translation::{OutputCollector, ReverseTranslator, RunSummary};

#[tokio::main]
async fn main() -> ExitCode {
    let config = DecoderConfig::parse();
    init_logging(&config.log_level);

    match decode(config).await {
        Ok(summary) => {
            if !summary.missing.is_empty() {
                warn!(missing = ?summary.missing, "some sentences were not translated");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(%err, fatal = err.is_fatal(), "decoding failed");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn decode(config: DecoderConfig) -> batchmt::Result<RunSummary> {
    config.validate()?;

    let device: Arc<dyn DeviceAllocator> = match config.device_memory {
        Some(bytes) => Arc::new(HostDevice::with_limit(bytes)),
        None => Arc::new(HostDevice::new()),
    };
    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &config.input {
        Some(path) => {
            info!(path = %path.display(), "reading input file");
            Box::new(BufReader::new(tokio::fs::File::open(path).await?))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let context = Arc::new(Context::new(
        config,
        device,
        Arc::new(ReverseTranslator::new()),
        OutputCollector::new(std::io::stdout()),
    )?);
    batchmt::run(context, reader).await
}
