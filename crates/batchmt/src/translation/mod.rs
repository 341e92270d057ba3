//! # Translation boundary
//!
//! The model itself is external: it is whatever implements [`Translator`].
//! This module turns mini-batches into [`TranslationTask`]s on the worker
//! pool and puts their outputs back in input order.

mod core_trait;
pub(crate) mod output;
mod reverse;
mod task;

pub use core_trait::Translator;
pub use output::OutputCollector;
pub use reverse::ReverseTranslator;
pub use task::{RunSummary, TranslationDispatcher, TranslationTask};
