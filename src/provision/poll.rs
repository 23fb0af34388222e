//! Bounded polling for resources the backend provisions asynchronously.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result};

pub trait Sleeper {
    fn sleep(&self, d: Duration);
}

/// Blocks the calling thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

impl<T: Sleeper + ?Sized> Sleeper for &T {
    fn sleep(&self, d: Duration) {
        (**self).sleep(d)
    }
}

/// Linearly growing delays with an attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub step: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            step: Duration::from_secs(1),
        }
    }

    /// Sleep preceding the given 0-based attempt.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt)
    }
}

/// Calls `check` until it yields a value, sleeping `policy.delay(n)` before
/// attempt `n`. Errors from `check` abort immediately; running out of attempts
/// is a [`ProvisionError::ReadinessTimeout`].
pub fn poll_until<T, S, F>(policy: &PollPolicy, sleeper: &S, step: &str, mut check: F) -> Result<T>
where
    S: Sleeper + ?Sized,
    F: FnMut() -> Result<Option<T>>,
{
    for attempt in 0..policy.max_attempts {
        let delay = policy.delay(attempt);
        if !delay.is_zero() {
            debug!(step, attempt, ?delay, "waiting before next poll");
            sleeper.sleep(delay);
        }
        if let Some(value) = check()? {
            return Ok(value);
        }
        info!(step, attempt = attempt + 1, max_attempts = policy.max_attempts, "not ready yet");
    }
    warn!(step, attempts = policy.max_attempts, "giving up");
    Err(ProvisionError::ReadinessTimeout {
        step: step.to_string(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSleeper;

    #[test]
    fn delays_grow_linearly_from_zero() {
        let p = PollPolicy::new(5);
        assert_eq!(p.delay(0), Duration::ZERO);
        assert_eq!(p.delay(1), Duration::from_secs(1));
        assert_eq!(p.delay(3), Duration::from_secs(3));
    }

    #[test]
    fn returns_first_ready_value() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let v = poll_until(&PollPolicy::new(10), &sleeper, "test", || {
            calls += 1;
            Ok((calls == 3).then_some("done"))
        })
        .unwrap();
        assert_eq!(v, "done");
        assert_eq!(calls, 3);
        assert_eq!(
            sleeper.slept(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn exhaustion_is_a_timeout() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let r: Result<()> = poll_until(&PollPolicy::new(4), &sleeper, "wait", || {
            calls += 1;
            Ok(None)
        });
        assert!(matches!(
            r,
            Err(ProvisionError::ReadinessTimeout { attempts: 4, .. })
        ));
        assert_eq!(calls, 4);
        assert_eq!(sleeper.slept().len(), 3);
    }

    #[test]
    fn check_errors_abort_the_loop() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let r: Result<()> = poll_until(&PollPolicy::new(10), &sleeper, "wait", || {
            calls += 1;
            Err(ProvisionError::remote("wait", "https://x", "boom"))
        });
        assert!(matches!(r, Err(ProvisionError::RemoteOperation { .. })));
        assert_eq!(calls, 1);
    }
}
