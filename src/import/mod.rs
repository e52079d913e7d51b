//! Background uploads.

pub mod queue;

pub use queue::{ImportQueue, ImportQueueBuilder, ImportRequest, ImportResult};
