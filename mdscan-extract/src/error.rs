//! Error types for extraction
//!
//! Only failures that stop a parse live here. Security rejections, truncation and failures
//! inside one collector are recorded in the result metadata instead, and a timeout is a
//! regular [`ParseOutcome`](crate::result::ParseOutcome).

use crate::harness::DeadlineExceeded;
use crate::registry::RegistryError;
use mdscan_parser::transforms::TransformError;
use mdscan_parser::{TokenizeError, WarehouseError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The tokenizer produced a stream whose open/close tokens do not pair up.
    #[error("structural error in token stream: {0}")]
    Structural(#[from] WarehouseError),

    #[error(transparent)]
    Tokenize(#[from] TokenizeError),

    #[error("pipeline failed: {0}")]
    Pipeline(#[from] TransformError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("process isolation requested but no worker command is configured")]
    IsolationUnavailable,

    #[error("failed to start worker `{program}`: {source}")]
    WorkerSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("worker I/O failed: {0}")]
    WorkerIo(#[from] io::Error),

    #[error("worker exited with {status}: {stderr}")]
    WorkerFailed { status: String, stderr: String },

    #[error("malformed worker response: {0}")]
    MalformedResponse(String),

    #[error("malformed worker request: {0}")]
    MalformedRequest(String),

    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),

    /// Raised inside a harnessed job when its deadline passes. The harness turns it into a
    /// timed-out outcome, so callers of [`Extractor`](crate::Extractor) never see it.
    #[error(transparent)]
    Deadline(#[from] DeadlineExceeded),
}

/// Readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
