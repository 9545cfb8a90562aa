use std::time::Duration;

/// Bounded retry with capped exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no waiting. Useful in tests and one-shot tools.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Wait before the retry that follows failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Run `op` until it succeeds, fails with an error `retryable` rejects,
    /// or the attempt budget runs out. The last error is returned as-is.
    pub fn run<T, E, F, P>(&self, what: &str, mut op: F, retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        P: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(err) if attempt < max && retryable(&err) => {
                    let wait = self.backoff(attempt);
                    tracing::warn!(
                        op = what,
                        attempt,
                        max_attempts = max,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(5),
        };
        assert_eq!(p.backoff(1), Duration::from_secs(2));
        assert_eq!(p.backoff(2), Duration::from_secs(4));
        assert_eq!(p.backoff(3), Duration::from_secs(5));
        assert_eq!(p.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn test_run_retries_transient_then_succeeds() {
        let calls = Cell::new(0);
        let result: Result<u32, String> = RetryPolicy::immediate(3).run(
            "flaky",
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err("busy".to_string())
                } else {
                    Ok(7)
                }
            },
            |_| true,
        );
        assert_eq!(result, Ok(7));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_run_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<(), String> = RetryPolicy::immediate(3).run(
            "always-busy",
            || {
                calls.set(calls.get() + 1);
                Err("busy".to_string())
            },
            |_| true,
        );
        assert_eq!(result, Err("busy".to_string()));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_run_does_not_retry_permanent_errors() {
        let calls = Cell::new(0);
        let result: Result<(), String> = RetryPolicy::immediate(5).run(
            "broken",
            || {
                calls.set(calls.get() + 1);
                Err("corrupt".to_string())
            },
            |e| e == "busy",
        );
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
