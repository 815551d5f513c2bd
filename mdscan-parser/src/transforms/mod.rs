//! Transform pipeline infrastructure
//!
//! Every step between raw input and a [`Warehouse`](crate::warehouse::Warehouse) is a stage
//! implementing [`Runnable`]. Stages compose into a [`Transform`] with `.then()`, and the
//! compiler checks that each stage's input is the previous stage's output:
//!
//! ```rust,ignore
//! let pipeline = Transform::from_fn(Ok)
//!     .then(Normalize)                        // String → String
//!     .then(Tokenize::new(options))           // String → TokenizedDocument
//!     .then(Index);                           // TokenizedDocument → Warehouse
//! ```
//!
//! Composed this way, normalization always runs ahead of tokenization. A `TokenizedDocument`
//! can also be assembled by hand from its public fields, as is done with a token list that
//! comes back from a worker process; its `text` must then already be normalized, since line
//! counts are taken from it.
//!
//! Module Organization
//!
//! - [`stages`]: individual stages (normalization, tokenization, indexing)
//! - [`standard`]: pre-built compositions with default tokenizer options

pub mod stages;
pub mod standard;

use thiserror::Error;

/// Error that can occur during transformation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// Generic error with message
    #[error("{0}")]
    Error(String),
    /// Stage failed with specific error
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed { stage: String, message: String },
}

impl TransformError {
    pub fn stage(stage: &str, err: impl std::fmt::Display) -> Self {
        TransformError::StageFailed {
            stage: stage.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<String> for TransformError {
    fn from(s: String) -> Self {
        TransformError::Error(s)
    }
}

impl From<&str> for TransformError {
    fn from(s: &str) -> Self {
        TransformError::Error(s.to_string())
    }
}

/// Trait for anything that can transform an input to an output
///
/// Implemented by individual stages; [`Transform`] composes them.
pub trait Runnable<I, O> {
    fn run(&self, input: I) -> Result<O, TransformError>;
}

/// A composable transformation pipeline from `I` to `O`.
pub struct Transform<I, O> {
    run_fn: Box<dyn Fn(I) -> Result<O, TransformError> + Send + Sync>,
}

impl<I, O> Transform<I, O> {
    /// Create a transform from a function
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(I) -> Result<O, TransformError> + Send + Sync + 'static,
    {
        Transform {
            run_fn: Box::new(f),
        }
    }

    /// Chain a stage after this transform, producing a transform from `I` to `O2`.
    pub fn then<O2, S>(self, stage: S) -> Transform<I, O2>
    where
        S: Runnable<O, O2> + Send + Sync + 'static,
        I: 'static,
        O: 'static,
        O2: 'static,
    {
        let prev_run = self.run_fn;
        Transform {
            run_fn: Box::new(move |input| {
                let intermediate = prev_run(input)?;
                stage.run(intermediate)
            }),
        }
    }

    /// Chain a pre-built static transform, typically one from [`standard`].
    pub fn then_transform<O2>(self, next: &'static Transform<O, O2>) -> Transform<I, O2>
    where
        I: 'static,
        O: 'static,
        O2: 'static,
    {
        let prev_run = self.run_fn;
        Transform {
            run_fn: Box::new(move |input| {
                let intermediate = prev_run(input)?;
                next.run(intermediate)
            }),
        }
    }

    /// Execute this transform on the given input
    pub fn run(&self, input: I) -> Result<O, TransformError> {
        (self.run_fn)(input)
    }
}

impl<I, O> Runnable<I, O> for Transform<I, O>
where
    I: 'static,
    O: 'static,
{
    fn run(&self, input: I) -> Result<O, TransformError> {
        Transform::run(self, input)
    }
}
