//! Token warehouse
//!
//! All derived indices over one finalized token list, built in a single pass and read-only
//! afterwards. Extractors query it instead of scanning the token list themselves.
//!
//! # Construction
//!
//! The pass keeps an explicit stack of open token indices:
//!
//! - open token: its parent is the current stack top, then it is pushed
//! - close token: the matching opener is popped; the pair is recorded both ways and the
//!   closer's parent is **that opener**, not the container around the pair
//! - self-contained token: its parent is the current stack top
//!
//! A close with nothing open, or opens left at the end, means the upstream token stream is
//! malformed. That is reported as a [`WarehouseError`] and never repaired.
//!
//! # Query costs
//!
//! Every query is O(1) (`parent`, `pair`, `opener`, `token`), a binary search
//! (`tokens_between` with a filter, `section_for_line`) or the lazily built children map.
//! Nothing here walks the whole token list after construction.

use crate::token::{Nesting, Token, TokenStream};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WarehouseError {
    #[error("closing token `{kind}` at index {index} has no open token to match")]
    UnmatchedClose { index: usize, kind: String },
    #[error("{count} token(s) left open at end of stream, first `{kind}` at index {index}")]
    UnclosedOpen {
        index: usize,
        kind: String,
        count: usize,
    },
}

/// One heading-delimited region of the document. Lines are 0-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub start_line: usize,
    pub end_line: usize,
    pub heading_index: usize,
    pub level: u8,
    pub title: String,
}

#[derive(Debug)]
pub struct Warehouse {
    tokens: TokenStream,
    by_type: HashMap<String, Vec<usize>>,
    parents: Vec<Option<usize>>,
    pairs: Vec<Option<usize>>,
    pairs_rev: Vec<Option<usize>>,
    children: OnceCell<HashMap<usize, Vec<usize>>>,
    roots: OnceCell<Vec<usize>>,
    sections: Vec<Section>,
    line_count: usize,
}

const NO_INDICES: &[usize] = &[];

impl Warehouse {
    /// Index `tokens`. `line_count` is the number of lines of the normalized text the tokens
    /// were produced from; the last section ends on its final line.
    pub fn build(tokens: TokenStream, line_count: usize) -> Result<Self, WarehouseError> {
        let len = tokens.len();
        let mut by_type: HashMap<String, Vec<usize>> = HashMap::new();
        let mut parents = vec![None; len];
        let mut pairs = vec![None; len];
        let mut pairs_rev = vec![None; len];
        let mut stack: Vec<usize> = Vec::new();

        for (index, token) in tokens.iter().enumerate() {
            match token.nesting {
                Nesting::Open => {
                    parents[index] = stack.last().copied();
                    stack.push(index);
                }
                Nesting::Close => {
                    let open = stack.pop().ok_or_else(|| WarehouseError::UnmatchedClose {
                        index,
                        kind: token.kind.clone(),
                    })?;
                    pairs[open] = Some(index);
                    pairs_rev[index] = Some(open);
                    parents[index] = Some(open);
                }
                Nesting::SelfContained => {
                    parents[index] = stack.last().copied();
                }
            }
            by_type.entry(token.kind.clone()).or_default().push(index);
        }

        if let Some(&first) = stack.first() {
            return Err(WarehouseError::UnclosedOpen {
                index: first,
                kind: tokens[first].kind.clone(),
                count: stack.len(),
            });
        }

        let mut warehouse = Warehouse {
            tokens,
            by_type,
            parents,
            pairs,
            pairs_rev,
            children: OnceCell::new(),
            roots: OnceCell::new(),
            sections: Vec::new(),
            line_count,
        };
        warehouse.sections = warehouse.derive_sections();
        log::debug!(
            "warehouse indexed {} tokens, {} types, {} sections",
            len,
            warehouse.by_type.len(),
            warehouse.sections.len()
        );
        Ok(warehouse)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn token(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    /// The indexed token list, in stream order. Meant for the dispatcher's single pass.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Indices of every token of `kind`, in stream order.
    pub fn indices_of(&self, kind: &str) -> &[usize] {
        self.by_type.get(kind).map(Vec::as_slice).unwrap_or(NO_INDICES)
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.indices_of(kind).len()
    }

    /// Enclosing open token. For a closing token this is its own opener.
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.parents.get(index).copied().flatten()
    }

    /// Closing index for an opening index.
    pub fn pair(&self, open: usize) -> Option<usize> {
        self.pairs.get(open).copied().flatten()
    }

    /// Opening index for a closing index.
    pub fn opener(&self, close: usize) -> Option<usize> {
        self.pairs_rev.get(close).copied().flatten()
    }

    /// Number of open containers around `index`. Walks parent links, so O(depth).
    pub fn depth(&self, index: usize) -> usize {
        let mut depth = 0;
        let mut current = self.parent(index);
        if self.opener(index).is_some() {
            current = current.and_then(|open| self.parent(open));
        }
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent);
        }
        depth
    }

    /// Direct children of an open token, in stream order (its closer included).
    pub fn children(&self, parent: usize) -> &[usize] {
        self.children_map()
            .get(&parent)
            .map(Vec::as_slice)
            .unwrap_or(NO_INDICES)
    }

    /// Tokens without a parent.
    pub fn roots(&self) -> &[usize] {
        self.roots.get_or_init(|| {
            self.parents
                .iter()
                .enumerate()
                .filter(|(_, parent)| parent.is_none())
                .map(|(index, _)| index)
                .collect()
        })
    }

    fn children_map(&self) -> &HashMap<usize, Vec<usize>> {
        self.children.get_or_init(|| {
            let mut map: HashMap<usize, Vec<usize>> = HashMap::new();
            for (index, parent) in self.parents.iter().enumerate() {
                if let Some(parent) = parent {
                    map.entry(*parent).or_default().push(index);
                }
            }
            map
        })
    }

    /// Indices strictly between `start` and `end`, optionally only those of one type.
    ///
    /// With a filter this is a binary search over the ordered per-type index list.
    pub fn tokens_between(&self, start: usize, end: usize, kind: Option<&str>) -> Vec<usize> {
        let low = start.saturating_add(1);
        if low >= end {
            return Vec::new();
        }
        match kind {
            None => (low..end.min(self.tokens.len())).collect(),
            Some(kind) => {
                let indices = self.indices_of(kind);
                let from = indices.partition_point(|&i| i < low);
                let to = indices.partition_point(|&i| i < end);
                indices[from..to.max(from)].to_vec()
            }
        }
    }

    /// Title text of the heading opened at `heading`.
    ///
    /// Only the `inline` token immediately after the heading, and recorded as that heading's
    /// child, counts. Anything else yields an empty title.
    pub fn get_heading_title(&self, heading: usize) -> String {
        let next = heading + 1;
        match self.tokens.get(next) {
            Some(token) if token.kind == "inline" && self.parent(next) == Some(heading) => {
                collapse_whitespace(&token.content)
            }
            _ => String::new(),
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// The section whose line range contains `line`.
    pub fn section_for_line(&self, line: usize) -> Option<&Section> {
        let position = self.sections.partition_point(|s| s.start_line <= line);
        let section = self.sections.get(position.checked_sub(1)?)?;
        (line <= section.end_line).then_some(section)
    }

    fn derive_sections(&self) -> Vec<Section> {
        let headings: Vec<(usize, usize, u8)> = self
            .indices_of("heading_open")
            .iter()
            .filter_map(|&index| {
                let token = &self.tokens[index];
                Some((index, token.start_line()?, token.heading_level()?))
            })
            .collect();

        let last_line = self.line_count.saturating_sub(1);
        headings
            .iter()
            .enumerate()
            .map(|(position, &(index, start_line, level))| {
                let end_line = match headings.get(position + 1) {
                    Some(&(_, next_start, _)) => next_start.saturating_sub(1).max(start_line),
                    None => last_line.max(start_line),
                };
                Section {
                    start_line,
                    end_line,
                    heading_index: index,
                    level,
                    title: self.get_heading_title(index),
                }
            })
            .collect()
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
