//! The collector trait and the capped list every built-in collector stores items in.

use crate::dispatch::DispatchContext;
use mdscan_parser::{Token, Warehouse};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure reported by a collector. The dispatcher isolates it to that collector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectorError {
    #[error("{0}")]
    Failed(String),
    #[error("unexpected token at index {index}: {reason}")]
    UnexpectedToken { index: usize, reason: String },
    #[error("could not serialize output: {0}")]
    Output(String),
}

impl CollectorError {
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorError::Failed(_) => "failed",
            CollectorError::UnexpectedToken { .. } => "unexpected_token",
            CollectorError::Output(_) => "output",
        }
    }
}

impl From<serde_json::Error> for CollectorError {
    fn from(err: serde_json::Error) -> Self {
        CollectorError::Output(err.to_string())
    }
}

/// A stateful accumulator fed every token of one parse.
///
/// Collectors are built fresh for each parse and own all of their state. They may query the
/// warehouse through its indexed lookups but must not walk the whole token list; the
/// dispatcher already does that once for everybody.
pub trait Collector: Send {
    /// Key of this collector's output in the result map.
    fn name(&self) -> &str;

    fn on_token(
        &mut self,
        index: usize,
        token: &Token,
        ctx: &DispatchContext<'_>,
        warehouse: &Warehouse,
    ) -> Result<(), CollectorError>;

    fn finalize(&mut self, warehouse: &Warehouse) -> Result<Value, CollectorError>;

    /// Total number of items seen, when more were seen than the cap allowed.
    fn truncated(&self) -> Option<usize> {
        None
    }
}

/// A list that keeps at most `cap` items but counts every offer.
#[derive(Debug, Clone)]
pub struct CappedList<T> {
    items: Vec<T>,
    cap: usize,
    seen: usize,
}

impl<T> CappedList<T> {
    pub fn new(cap: usize) -> Self {
        CappedList {
            items: Vec::new(),
            cap,
            seen: 0,
        }
    }

    /// Offer an item. Returns its slot when it was kept.
    pub fn push(&mut self, item: T) -> Option<usize> {
        self.seen += 1;
        if self.items.len() < self.cap {
            self.items.push(item);
            Some(self.items.len() - 1)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.items.get_mut(slot)
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn seen(&self) -> usize {
        self.seen
    }

    pub fn truncated(&self) -> Option<usize> {
        (self.seen > self.items.len()).then_some(self.seen)
    }
}

impl<T: Serialize> CappedList<T> {
    pub fn to_value(&self) -> Result<Value, CollectorError> {
        Ok(serde_json::to_value(&self.items)?)
    }
}
