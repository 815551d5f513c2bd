//! The protected parse
//!
//! One call to [`Extractor::extract`] is one logical operation under the profile's time
//! budget:
//!
//!     normalize ─▶ tokenize ─▶ drop HTML ─▶ index ─▶ dispatch ─▶ finalize
//!                 └──────────────── harnessed ─────────────────────┘
//!
//! Normalization runs first and only once; everything after it works on the normalized text.
//! With process isolation the tokenizer runs in a worker process and the remaining stages
//! run here under whatever budget is left. Otherwise the whole chain runs on a worker
//! thread. Either way the token list is produced exactly once, and every collector,
//! including plain text and front matter, reads from the one warehouse built from it.

use crate::dispatch::{DispatchContext, Dispatcher};
use crate::error::ExtractError;
use crate::harness::{deadline, Harness, HarnessOutcome, WorkerCommand};
use crate::options::ExtractOptions;
use crate::registry::CollectorRegistry;
use crate::result::{
    millis, ExtractionResult, IsolationMode, Metadata, ParseOutcome, TimeoutReport,
    TimeoutStage, Timing,
};
use crate::security::{SecurityWarning, WarningKind};
use crate::stages::{DropHtml, FilteredDocument};
use crate::worker::WorkerRequest;
use mdscan_parser::transforms::stages::{Normalize, TokenizedDocument, Tokenize};
use mdscan_parser::transforms::Runnable;
use mdscan_parser::{TokenizeError, Warehouse};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct Extractor {
    options: ExtractOptions,
    worker: Option<WorkerCommand>,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Extractor {
            options,
            worker: None,
        }
    }

    /// Command used to start tokenizer workers when the profile asks for process isolation.
    pub fn with_worker(mut self, command: WorkerCommand) -> Self {
        self.worker = Some(command);
        self
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    pub fn isolation(&self) -> IsolationMode {
        if self.options.process_isolation {
            IsolationMode::Process
        } else {
            IsolationMode::Thread
        }
    }

    /// Parse `source` with the built-in collectors of the profile.
    pub fn extract_default(&self, source: &str) -> Result<ParseOutcome, ExtractError> {
        self.extract(source, CollectorRegistry::with_defaults(&self.options))
    }

    /// Parse `source`, feeding every token to the collectors of `registry`.
    pub fn extract(
        &self,
        source: &str,
        registry: CollectorRegistry,
    ) -> Result<ParseOutcome, ExtractError> {
        let started = Instant::now();
        let text = Normalize.run(source)?;
        if let Some(limit) = self.options.tokenizer.max_input_bytes {
            if text.len() > limit {
                return Err(TokenizeError::InputTooLarge {
                    size: text.len(),
                    limit,
                }
                .into());
            }
        }

        let isolation = self.isolation();
        let tokenized = Arc::new(AtomicBool::new(false));
        let mut harness = Harness::new(self.options.timeout);
        log::debug!(
            "parsing {} bytes with profile '{}' ({:?} isolation)",
            text.len(),
            self.options.profile,
            isolation
        );

        let outcome = match isolation {
            IsolationMode::Thread => {
                let run = ProtectedRun {
                    options: self.options.clone(),
                    isolation,
                    started,
                    tokenized: Arc::clone(&tokenized),
                };
                harness.run_on_thread(self.options.worker_stack_bytes, move || {
                    run.on_thread(text, registry)
                })?
            }
            IsolationMode::Process => {
                let command = self
                    .worker
                    .as_ref()
                    .ok_or(ExtractError::IsolationUnavailable)?;
                let request = WorkerRequest {
                    text: text.clone(),
                    options: self.options.tokenizer.clone(),
                };
                let run = ProtectedRun {
                    options: self.options.clone(),
                    isolation,
                    started,
                    tokenized: Arc::clone(&tokenized),
                };
                harness.run_isolated(command, &request, |response| {
                    let tokenize_elapsed = started.elapsed();
                    run.tokenized.store(true, Ordering::SeqCst);
                    let document = TokenizedDocument {
                        text,
                        tokens: response.tokens,
                    };
                    run.finish(document, &registry, tokenize_elapsed)
                })?
            }
        };

        Ok(match outcome {
            HarnessOutcome::Completed(result) => ParseOutcome::Completed(result),
            HarnessOutcome::TimedOut { elapsed } => {
                let stage = if tokenized.load(Ordering::SeqCst) {
                    TimeoutStage::Dispatch
                } else {
                    TimeoutStage::Tokenize
                };
                ParseOutcome::TimedOut(TimeoutReport {
                    profile: self.options.profile.clone(),
                    isolation,
                    stage,
                    budget_ms: millis(harness.budget()),
                    elapsed_ms: millis(elapsed),
                })
            }
        })
    }
}

/// Everything the harnessed part of a parse needs, owned so it can move to a worker thread.
struct ProtectedRun {
    options: ExtractOptions,
    isolation: IsolationMode,
    started: Instant,
    tokenized: Arc<AtomicBool>,
}

impl ProtectedRun {
    fn on_thread(
        self,
        text: String,
        registry: CollectorRegistry,
    ) -> Result<ExtractionResult, ExtractError> {
        let tokenize_started = Instant::now();
        let document = Tokenize::new(self.options.tokenizer.clone()).run(text)?;
        let tokenize_elapsed = tokenize_started.elapsed();
        self.tokenized.store(true, Ordering::SeqCst);
        self.finish(document, &registry, tokenize_elapsed)
    }

    /// Index and dispatch. Runs with the deadline armed.
    fn finish(
        &self,
        document: TokenizedDocument,
        registry: &CollectorRegistry,
        tokenize_elapsed: Duration,
    ) -> Result<ExtractionResult, ExtractError> {
        deadline::check()?;

        let index_started = Instant::now();
        let FilteredDocument {
            document,
            dropped_html,
        } = DropHtml {
            allow_html: self.options.policy.allow_html,
        }
        .run(document)?;
        let line_count = document.line_count();
        let TokenizedDocument { text, tokens } = document;
        let warehouse = Warehouse::build(tokens, line_count)?;
        let index_elapsed = index_started.elapsed();

        let mut early_warnings = Vec::new();
        if dropped_html > 0 {
            early_warnings.push(SecurityWarning::new(
                WarningKind::HtmlDropped,
                format!("dropped {} raw HTML token(s); HTML is not allowed", dropped_html),
                None,
            ));
        }

        let dispatch_started = Instant::now();
        let ctx = DispatchContext::new(&text, &self.options.policy).with_warnings(early_warnings);
        let report = Dispatcher::run(registry, &warehouse, ctx)?;
        let dispatch_elapsed = dispatch_started.elapsed();

        let timing = Timing {
            tokenize_ms: millis(tokenize_elapsed),
            index_ms: millis(index_elapsed),
            dispatch_ms: millis(dispatch_elapsed),
            total_ms: millis(self.started.elapsed()),
        };
        log::debug!(
            "parse finished: {} tokens, {} warnings, {:.2}ms",
            warehouse.len(),
            report.warnings.len(),
            timing.total_ms
        );

        Ok(ExtractionResult {
            collectors: report.outputs,
            metadata: Metadata {
                profile: self.options.profile.clone(),
                isolation: self.isolation,
                dispatch_order: report.order,
                warning_counts: Metadata::count_warnings(&report.warnings),
                warnings: report.warnings,
                truncated: report.truncated,
                collector_errors: report.failures,
                timing,
                token_count: warehouse.len(),
                line_count,
            },
        })
    }
}
