//! Indexing stage: tokens → [`Warehouse`].

use crate::transforms::stages::TokenizedDocument;
use crate::transforms::{Runnable, TransformError};
use crate::warehouse::Warehouse;

#[derive(Debug, Default, Clone, Copy)]
pub struct Index;

impl Runnable<TokenizedDocument, Warehouse> for Index {
    fn run(&self, input: TokenizedDocument) -> Result<Warehouse, TransformError> {
        let lines = input.line_count();
        Warehouse::build(input.tokens, lines).map_err(|e| TransformError::stage("index", e))
    }
}
