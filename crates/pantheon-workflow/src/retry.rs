//! Bounded retry with a fixed sleep between attempts.

use std::time::Duration;

/// What the caller does once every attempt has failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// Abort the run.
    Fatal,
    /// Log a warning and carry on.
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
    pub on_exhaustion: Exhaustion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded { attempt: u32 },
    Exhausted { attempts: u32 },
}

impl RetryOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }
}

/// Run `attempt` until it succeeds or `policy.attempts` tries have failed.
///
/// `sleep` is called between attempts only: never before the first try, never after a
/// success and never after the last failure.
pub fn retry<F>(
    label: &str,
    policy: &RetryPolicy,
    sleep: &dyn Fn(Duration),
    mut attempt: F,
) -> RetryOutcome
where
    F: FnMut(u32) -> anyhow::Result<()>,
{
    for n in 1..=policy.attempts {
        match attempt(n) {
            Ok(()) => {
                if n > 1 {
                    log::info!("{label}: succeeded on attempt {n}/{}", policy.attempts);
                }
                return RetryOutcome::Succeeded { attempt: n };
            }
            Err(err) => {
                log::info!("{label}: attempt {n}/{} failed: {err:#}", policy.attempts);
                if n < policy.attempts {
                    sleep(policy.interval);
                }
            }
        }
    }
    match policy.on_exhaustion {
        Exhaustion::Warn => log::warn!(
            "{label}: giving up after {} attempts, continuing",
            policy.attempts
        ),
        Exhaustion::Fatal => log::error!("{label}: giving up after {} attempts", policy.attempts),
    }
    RetryOutcome::Exhausted {
        attempts: policy.attempts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::{Cell, RefCell};

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            interval: Duration::from_secs(2),
            on_exhaustion: Exhaustion::Fatal,
        }
    }

    #[test]
    fn first_success_returns_without_sleeping() {
        let sleeps = Cell::new(0);
        let outcome = retry("probe", &policy(30), &|_| sleeps.set(sleeps.get() + 1), |_| Ok(()));
        assert_eq!(outcome, RetryOutcome::Succeeded { attempt: 1 });
        assert_eq!(sleeps.get(), 0);
    }

    #[test]
    fn all_failures_make_exactly_n_attempts() {
        let calls = Cell::new(0);
        let slept = RefCell::new(Vec::new());
        let outcome = retry(
            "probe",
            &policy(5),
            &|d| slept.borrow_mut().push(d),
            |_| {
                calls.set(calls.get() + 1);
                Err(anyhow!("no reply"))
            },
        );
        assert_eq!(outcome, RetryOutcome::Exhausted { attempts: 5 });
        assert_eq!(calls.get(), 5);
        assert_eq!(slept.borrow().len(), 4);
        assert!(slept.borrow().iter().all(|d| *d == Duration::from_secs(2)));
    }

    #[test]
    fn success_after_failures_stops_immediately() {
        let sleeps = Cell::new(0);
        let outcome = retry(
            "probe",
            &policy(10),
            &|_| sleeps.set(sleeps.get() + 1),
            |n| if n == 3 { Ok(()) } else { Err(anyhow!("down")) },
        );
        assert_eq!(outcome, RetryOutcome::Succeeded { attempt: 3 });
        assert!(outcome.succeeded());
        assert_eq!(sleeps.get(), 2);
    }

    #[test]
    fn single_attempt_never_sleeps() {
        let sleeps = Cell::new(0);
        let outcome = retry(
            "probe",
            &policy(1),
            &|_| sleeps.set(sleeps.get() + 1),
            |_| Err(anyhow!("down")),
        );
        assert!(!outcome.succeeded());
        assert_eq!(sleeps.get(), 0);
    }
}
