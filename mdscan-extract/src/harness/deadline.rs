//! Thread-local deadline
//!
//! A running computation cannot be interrupted safely from outside, so long-running loops
//! poll [`check`] instead. [`DeadlineGuard::arm`] sets the deadline for the current thread;
//! dropping the guard restores whatever was armed before, on every exit path including
//! unwinding. Nested guards can only tighten the deadline, never extend it.

use std::cell::Cell;
use std::marker::PhantomData;
use std::time::{Duration, Instant};
use thiserror::Error;

thread_local! {
    static DEADLINE: Cell<Option<Instant>> = const { Cell::new(None) };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline exceeded")]
pub struct DeadlineExceeded;

/// Restores the previous deadline of this thread on drop.
#[derive(Debug)]
#[must_use = "the deadline is disarmed as soon as the guard is dropped"]
pub struct DeadlineGuard {
    previous: Option<Instant>,
    // the deadline is per thread; the guard must be dropped where it was armed
    _thread_bound: PhantomData<*const ()>,
}

impl DeadlineGuard {
    /// Arm a deadline `budget` from now.
    pub fn arm(budget: Duration) -> Self {
        Self::arm_at(Instant::now().checked_add(budget))
    }

    /// Arm an absolute deadline. `None` means no new limit.
    pub fn arm_at(deadline: Option<Instant>) -> Self {
        let previous = current();
        let effective = match (previous, deadline) {
            (Some(previous), Some(requested)) => Some(previous.min(requested)),
            (previous, requested) => previous.or(requested),
        };
        DEADLINE.with(|cell| cell.set(effective));
        DeadlineGuard {
            previous,
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        DEADLINE.with(|cell| cell.set(self.previous));
    }
}

/// The deadline armed on this thread, if any.
pub fn current() -> Option<Instant> {
    DEADLINE.with(Cell::get)
}

/// Time left before the deadline. `None` when no deadline is armed.
pub fn remaining() -> Option<Duration> {
    current().map(|deadline| deadline.saturating_duration_since(Instant::now()))
}

pub fn check() -> Result<(), DeadlineExceeded> {
    match current() {
        Some(deadline) if Instant::now() >= deadline => Err(DeadlineExceeded),
        _ => Ok(()),
    }
}
