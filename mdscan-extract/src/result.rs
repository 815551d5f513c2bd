//! What a parse returns.
//!
//! A completed parse is an [`ExtractionResult`]: one JSON value per collector plus metadata.
//! A parse that ran out of time is a [`TimeoutReport`]. Both are regular values of
//! [`ParseOutcome`]; only failures that make a result impossible are errors.

use crate::dispatch::CollectorFailure;
use crate::security::SecurityWarning;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMode {
    Thread,
    Process,
}

/// Milliseconds spent in each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Timing {
    pub tokenize_ms: f64,
    pub index_ms: f64,
    pub dispatch_ms: f64,
    pub total_ms: f64,
}

pub(crate) fn millis(duration: Duration) -> f64 {
    duration.as_micros() as f64 / 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub profile: String,
    pub isolation: IsolationMode,
    pub dispatch_order: Vec<String>,
    pub warnings: Vec<SecurityWarning>,
    /// Warning kind → count.
    pub warning_counts: BTreeMap<String, usize>,
    /// Collector name → number of items seen, for collectors that hit their cap.
    pub truncated: BTreeMap<String, usize>,
    pub collector_errors: Vec<CollectorFailure>,
    pub timing: Timing,
    pub token_count: usize,
    pub line_count: usize,
}

impl Metadata {
    pub(crate) fn count_warnings(warnings: &[SecurityWarning]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for warning in warnings {
            *counts.entry(warning.kind.as_str().to_string()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub collectors: BTreeMap<String, Value>,
    pub metadata: Metadata,
}

impl ExtractionResult {
    pub fn collector(&self, name: &str) -> Option<&Value> {
        self.collectors.get(name)
    }

    pub fn is_truncated(&self, name: &str) -> bool {
        self.metadata.truncated.contains_key(name)
    }
}

/// The stage that was running when the budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutStage {
    Tokenize,
    Dispatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeoutReport {
    pub profile: String,
    pub isolation: IsolationMode,
    pub stage: TimeoutStage,
    pub budget_ms: f64,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseOutcome {
    Completed(ExtractionResult),
    TimedOut(TimeoutReport),
}

impl ParseOutcome {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, ParseOutcome::TimedOut(_))
    }

    pub fn completed(self) -> Option<ExtractionResult> {
        match self {
            ParseOutcome::Completed(result) => Some(result),
            ParseOutcome::TimedOut(_) => None,
        }
    }

    pub fn as_completed(&self) -> Option<&ExtractionResult> {
        match self {
            ParseOutcome::Completed(result) => Some(result),
            ParseOutcome::TimedOut(_) => None,
        }
    }
}
