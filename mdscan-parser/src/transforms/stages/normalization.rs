//! Normalization stage: raw input → canonical text.

use crate::normalize::normalize;
use crate::transforms::{Runnable, TransformError};

#[derive(Debug, Default, Clone, Copy)]
pub struct Normalize;

impl Runnable<String, String> for Normalize {
    fn run(&self, input: String) -> Result<String, TransformError> {
        Ok(normalize(&input))
    }
}

impl Runnable<&str, String> for Normalize {
    fn run(&self, input: &str) -> Result<String, TransformError> {
        Ok(normalize(input))
    }
}
