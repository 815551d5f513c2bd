//! Cooperative worker thread
//!
//! The job runs on its own thread, with its own stack size and with the deadline armed on
//! that thread. The caller waits on a channel with `recv_timeout`. When the wait runs out the
//! receiver is dropped and the job's eventual result goes nowhere; the thread itself is left
//! to finish, since there is no safe way to stop it.

use crate::error::{panic_message, ExtractError};
use crate::harness::deadline::DeadlineGuard;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Instant;

/// `Ok(None)` means the deadline passed first.
pub(crate) fn run_on_worker_thread<T, F>(
    deadline: Instant,
    stack_bytes: usize,
    job: F,
) -> Result<Option<T>, ExtractError>
where
    F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
    T: Send + 'static,
{
    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name("mdscan-worker".to_string())
        .stack_size(stack_bytes)
        .spawn(move || {
            let _guard = DeadlineGuard::arm_at(Some(deadline));
            let result = catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
                Err(ExtractError::WorkerPanicked(panic_message(payload.as_ref())))
            });
            // nobody is listening any more after a timeout
            let _ = sender.send(result);
        })?;

    let wait = deadline.saturating_duration_since(Instant::now());
    match receiver.recv_timeout(wait) {
        Ok(Err(ExtractError::Deadline(_))) | Err(RecvTimeoutError::Timeout) => Ok(None),
        Ok(result) => result.map(Some),
        Err(RecvTimeoutError::Disconnected) => Err(ExtractError::WorkerPanicked(
            "worker thread exited without a result".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::deadline;
    use std::time::Duration;

    const STACK: usize = 4 * 1024 * 1024;

    fn in_ms(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[test]
    fn returns_job_result() {
        let result = run_on_worker_thread(in_ms(5_000), STACK, || Ok(21 * 2)).unwrap();
        assert_eq!(result, Some(42));
    }

    #[test]
    fn deadline_is_armed_inside_the_job() {
        let armed = run_on_worker_thread(in_ms(5_000), STACK, || Ok(deadline::current().is_some()))
            .unwrap();
        assert_eq!(armed, Some(true));
    }

    #[test]
    fn slow_job_times_out_near_budget() {
        let started = Instant::now();
        let result = run_on_worker_thread(in_ms(50), STACK, || {
            thread::sleep(Duration::from_secs(5));
            Ok(())
        })
        .unwrap();
        assert_eq!(result, None);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn job_noticing_the_deadline_counts_as_timeout() {
        let result = run_on_worker_thread(in_ms(5_000), STACK, || -> Result<(), ExtractError> {
            let _tight = DeadlineGuard::arm(Duration::ZERO);
            deadline::check()?;
            Ok(())
        })
        .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn panics_become_errors() {
        let err = run_on_worker_thread(in_ms(5_000), STACK, || -> Result<(), ExtractError> {
            panic!("tokenizer exploded")
        })
        .unwrap_err();
        assert!(matches!(err, ExtractError::WorkerPanicked(ref m) if m == "tokenizer exploded"));
    }
}
