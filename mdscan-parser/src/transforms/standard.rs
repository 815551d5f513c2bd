//! Standard transform definitions
//!
//! Pre-built compositions with default tokenizer options, held as `once_cell::sync::Lazy`
//! statics. Callers with non-default options compose the stages themselves.

use crate::transforms::stages::{Index, Normalize, TokenizedDocument, Tokenize};
use crate::transforms::Transform;
use crate::warehouse::Warehouse;
use once_cell::sync::Lazy;

/// Raw input → normalized text.
pub static NORMALIZE: Lazy<Transform<String, String>> =
    Lazy::new(|| Transform::from_fn(Ok).then(Normalize));

/// Raw input → normalized text and its tokens.
pub static STRING_TO_TOKENS: Lazy<Transform<String, TokenizedDocument>> =
    Lazy::new(|| Transform::from_fn(Ok).then(Normalize).then(Tokenize::default()));

/// Raw input → warehouse.
pub static STRING_TO_WAREHOUSE: Lazy<Transform<String, Warehouse>> =
    Lazy::new(|| {
        Transform::from_fn(Ok)
            .then_transform(Lazy::force(&STRING_TO_TOKENS))
            .then(Index)
    });
