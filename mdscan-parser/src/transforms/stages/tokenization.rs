//! Tokenization stage
//!
//! Turns normalized text into a [`TokenizedDocument`]: the token list plus the text it was
//! produced from, which later stages need for line counts.

use crate::normalize::line_count;
use crate::token::TokenStream;
use crate::tokenizer::{tokenize, TokenizerOptions};
use crate::transforms::{Runnable, TransformError};

/// Normalized text together with its tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenizedDocument {
    pub text: String,
    pub tokens: TokenStream,
}

impl TokenizedDocument {
    pub fn line_count(&self) -> usize {
        line_count(&self.text)
    }
}

/// Tokenization stage. Expects its input to have passed through `Normalize`.
#[derive(Debug, Clone, Default)]
pub struct Tokenize {
    options: TokenizerOptions,
}

impl Tokenize {
    pub fn new(options: TokenizerOptions) -> Self {
        Tokenize { options }
    }
}

impl Runnable<String, TokenizedDocument> for Tokenize {
    fn run(&self, input: String) -> Result<TokenizedDocument, TransformError> {
        let tokens =
            tokenize(&input, &self.options).map_err(|e| TransformError::stage("tokenize", e))?;
        Ok(TokenizedDocument {
            text: input,
            tokens,
        })
    }
}
