//! Timeout and isolation harness
//!
//! Wraps tokenize-through-dispatch as one logical operation under a wall-clock budget.
//!
//!     Idle ──run──▶ Running ──▶ Completed
//!                          ├──▶ TimedOut
//!                          └──▶ Failed
//!
//! Two ways to run:
//!
//! - [`Harness::run_on_thread`]: the whole job on a dedicated worker thread (own stack size,
//!   deadline armed there), joined with a timeout.
//! - [`Harness::run_isolated`]: tokenization in a worker process that is killed at the
//!   deadline, then the rest of the job in the calling thread under whatever budget is left.
//!
//! In both cases a job that notices the deadline through [`deadline::check`] ends as
//! `TimedOut`, the same as one the harness stopped waiting for.

pub mod deadline;
pub mod process;
pub mod thread;

pub use deadline::{DeadlineExceeded, DeadlineGuard};
pub use process::WorkerCommand;

use crate::error::ExtractError;
use crate::worker::{WorkerRequest, WorkerResponse};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Budgets are clamped to this so deadline arithmetic cannot overflow.
const MAX_BUDGET: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarnessState {
    Idle,
    Running,
    Completed,
    TimedOut,
    Failed,
}

#[derive(Debug)]
pub enum HarnessOutcome<T> {
    Completed(T),
    TimedOut { elapsed: Duration },
}

#[derive(Debug)]
pub struct Harness {
    budget: Duration,
    started: Option<Instant>,
    state: HarnessState,
}

impl Harness {
    pub fn new(budget: Duration) -> Self {
        Harness {
            budget: budget.min(MAX_BUDGET),
            started: None,
            state: HarnessState::Idle,
        }
    }

    pub fn state(&self) -> HarnessState {
        self.state
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Run `job` on a worker thread with `stack_bytes` of stack.
    pub fn run_on_thread<T, F>(
        &mut self,
        stack_bytes: usize,
        job: F,
    ) -> Result<HarnessOutcome<T>, ExtractError>
    where
        F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = self.start();
        let result = thread::run_on_worker_thread(deadline, stack_bytes, job);
        self.settle(result)
    }

    /// Tokenize `request` in a worker process, then hand the response to `then` in the
    /// calling thread with the remaining budget armed.
    pub fn run_isolated<T, F>(
        &mut self,
        command: &WorkerCommand,
        request: &WorkerRequest,
        then: F,
    ) -> Result<HarnessOutcome<T>, ExtractError>
    where
        F: FnOnce(WorkerResponse) -> Result<T, ExtractError>,
    {
        let deadline = self.start();
        let result = match process::run_worker(command, request, deadline) {
            Ok(Some(response)) => {
                let _guard = DeadlineGuard::arm_at(Some(deadline));
                match then(response) {
                    Ok(value) => Ok(Some(value)),
                    Err(ExtractError::Deadline(_)) => Ok(None),
                    Err(err) => Err(err),
                }
            }
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };
        self.settle(result)
    }

    fn start(&mut self) -> Instant {
        if self.state != HarnessState::Idle {
            log::debug!("harness restarted from {:?}", self.state);
        }
        let now = Instant::now();
        self.started = Some(now);
        self.state = HarnessState::Running;
        log::debug!("harness running with a {:?} budget", self.budget);
        now + self.budget
    }

    fn settle<T>(
        &mut self,
        result: Result<Option<T>, ExtractError>,
    ) -> Result<HarnessOutcome<T>, ExtractError> {
        let elapsed = self.elapsed();
        match result {
            Ok(Some(value)) => {
                self.state = HarnessState::Completed;
                log::debug!("harness completed in {:?}", elapsed);
                Ok(HarnessOutcome::Completed(value))
            }
            Ok(None) => {
                self.state = HarnessState::TimedOut;
                log::warn!(
                    "parse timed out after {:?} (budget {:?})",
                    elapsed,
                    self.budget
                );
                Ok(HarnessOutcome::TimedOut { elapsed })
            }
            Err(err) => {
                self.state = HarnessState::Failed;
                log::warn!("harnessed parse failed: {}", err);
                Err(err)
            }
        }
    }
}
