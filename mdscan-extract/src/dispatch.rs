//! Single-pass dispatcher
//!
//! Every token of the warehouse is offered to every registered collector, token-major and in
//! registration order, then each collector is finalized in the same order. The deadline is
//! checked before each token.
//!
//! A collector that returns an error or panics is recorded in [`CollectorFailure`] and cut
//! off: it gets no further tokens and is not finalized. The others are unaffected.

use crate::collector::{Collector, CollectorError};
use crate::error::panic_message;
use crate::harness::{deadline, DeadlineExceeded};
use crate::registry::CollectorRegistry;
use crate::security::{SecurityPolicy, SecurityWarning, WarningKind};
use mdscan_parser::Warehouse;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{MutexGuard, PoisonError};

/// Read-only parse context handed to collectors, plus the shared warning sink.
pub struct DispatchContext<'a> {
    source: &'a str,
    policy: &'a SecurityPolicy,
    warnings: RefCell<Vec<SecurityWarning>>,
}

impl<'a> DispatchContext<'a> {
    pub fn new(source: &'a str, policy: &'a SecurityPolicy) -> Self {
        DispatchContext {
            source,
            policy,
            warnings: RefCell::new(Vec::new()),
        }
    }

    /// Seed warnings raised before dispatch (for example by the HTML drop filter).
    pub fn with_warnings(self, warnings: Vec<SecurityWarning>) -> Self {
        self.warnings.borrow_mut().extend(warnings);
        self
    }

    /// Normalized source text.
    pub fn source(&self) -> &str {
        self.source
    }

    pub fn policy(&self) -> &SecurityPolicy {
        self.policy
    }

    pub fn warn(&self, kind: WarningKind, message: impl Into<String>, line: Option<usize>) {
        self.warnings
            .borrow_mut()
            .push(SecurityWarning::new(kind, message, line));
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.borrow().len()
    }

    fn into_warnings(self) -> Vec<SecurityWarning> {
        self.warnings.into_inner()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    OnToken,
    Finalize,
}

/// One isolated collector failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectorFailure {
    pub collector: String,
    pub phase: Phase,
    /// `panic`, or the [`CollectorError`] kind.
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_index: Option<usize>,
}

/// Everything a dispatch pass produced.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Collector outputs by name, plus `<name>_truncated` / `<name>_truncated_count` entries.
    pub outputs: BTreeMap<String, Value>,
    /// Collector name → total items seen, for truncated collectors.
    pub truncated: BTreeMap<String, usize>,
    pub failures: Vec<CollectorFailure>,
    pub warnings: Vec<SecurityWarning>,
    pub order: Vec<String>,
}

struct Slot<'r> {
    name: String,
    collector: MutexGuard<'r, dyn Collector + 'static>,
    failed: bool,
}

pub struct Dispatcher;

impl Dispatcher {
    /// Run every collector of `registry` over `warehouse`.
    pub fn run(
        registry: &CollectorRegistry,
        warehouse: &Warehouse,
        ctx: DispatchContext<'_>,
    ) -> Result<DispatchReport, DeadlineExceeded> {
        let mut slots: Vec<Slot<'_>> = registry
            .collectors()
            .map(|shared| {
                let collector = shared.lock().unwrap_or_else(PoisonError::into_inner);
                Slot {
                    name: collector.name().to_string(),
                    collector,
                    failed: false,
                }
            })
            .collect();
        let mut report = DispatchReport {
            order: slots.iter().map(|slot| slot.name.clone()).collect(),
            ..DispatchReport::default()
        };

        for (index, token) in warehouse.tokens().iter().enumerate() {
            deadline::check()?;
            for slot in slots.iter_mut().filter(|slot| !slot.failed) {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    slot.collector.on_token(index, token, &ctx, warehouse)
                }));
                let failure = failure_of(&slot.name, Phase::OnToken, Some(index), outcome);
                if let Some(failure) = failure {
                    slot.failed = true;
                    report.failures.push(failure);
                }
            }
        }

        for slot in slots.iter_mut().filter(|slot| !slot.failed) {
            let outcome = catch_unwind(AssertUnwindSafe(|| slot.collector.finalize(warehouse)));
            match outcome {
                Ok(Ok(value)) => {
                    report.outputs.insert(slot.name.clone(), value);
                    if let Some(count) = slot.collector.truncated() {
                        report
                            .outputs
                            .insert(format!("{}_truncated", slot.name), Value::Bool(true));
                        report
                            .outputs
                            .insert(format!("{}_truncated_count", slot.name), Value::from(count));
                        report.truncated.insert(slot.name.clone(), count);
                    }
                }
                other => {
                    let outcome = other.map(|result| result.map(|_| ()));
                    if let Some(failure) = failure_of(&slot.name, Phase::Finalize, None, outcome) {
                        report.failures.push(failure);
                    }
                }
            }
        }

        report.warnings = ctx.into_warnings();
        Ok(report)
    }
}

fn failure_of(
    name: &str,
    phase: Phase,
    token_index: Option<usize>,
    outcome: std::thread::Result<Result<(), CollectorError>>,
) -> Option<CollectorFailure> {
    let (kind, message) = match outcome {
        Ok(Ok(())) => return None,
        Ok(Err(err)) => (err.kind().to_string(), err.to_string()),
        Err(payload) => ("panic".to_string(), panic_message(payload.as_ref())),
    };
    log::warn!("collector '{}' failed during {:?}: {}", name, phase, message);
    Some(CollectorFailure {
        collector: name.to_string(),
        phase,
        kind,
        message,
        token_index,
    })
}
