//! Extraction stages that run between tokenization and indexing.

use mdscan_parser::transforms::stages::TokenizedDocument;
use mdscan_parser::transforms::{Runnable, TransformError};
use mdscan_parser::Token;

/// A tokenized document after the HTML policy was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredDocument {
    pub document: TokenizedDocument,
    /// Number of `html_block` and `html_inline` tokens removed.
    pub dropped_html: usize,
}

/// Removes every raw HTML token when HTML is not allowed.
///
/// Block tokens are removed from the top-level list, inline ones from the children of every
/// inline token at any depth (image alt text included). Only self-contained tokens are
/// removed, so open/close pairing is untouched.
#[derive(Debug, Clone, Copy)]
pub struct DropHtml {
    pub allow_html: bool,
}

impl Runnable<TokenizedDocument, FilteredDocument> for DropHtml {
    fn run(&self, mut input: TokenizedDocument) -> Result<FilteredDocument, TransformError> {
        if self.allow_html {
            return Ok(FilteredDocument {
                document: input,
                dropped_html: 0,
            });
        }

        let before = input.tokens.len();
        input.tokens.retain(|token| !token.is("html_block"));
        let mut dropped = before - input.tokens.len();

        let mut stack: Vec<&mut Vec<Token>> = input
            .tokens
            .iter_mut()
            .filter(|token| token.is("inline"))
            .map(|token| &mut token.children)
            .collect();
        while let Some(children) = stack.pop() {
            let before = children.len();
            children.retain(|child| !child.is("html_inline"));
            dropped += before - children.len();
            stack.extend(
                children
                    .iter_mut()
                    .filter(|child| !child.children.is_empty())
                    .map(|child| &mut child.children),
            );
        }

        if dropped > 0 {
            log::debug!("dropped {} raw HTML token(s)", dropped);
        }
        Ok(FilteredDocument {
            document: input,
            dropped_html: dropped,
        })
    }
}
