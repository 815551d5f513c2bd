//! Individual transformation stages
//!
//! Each stage implements the `Runnable` trait.

pub mod indexing;
pub mod normalization;
pub mod tokenization;

pub use indexing::Index;
pub use normalization::Normalize;
pub use tokenization::{TokenizedDocument, Tokenize};
