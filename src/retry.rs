//! Bounded retry with a fixed backoff, modelled as a small state machine.
//!
//! ```text
//! Attempting(0) ──ok──▶ Success
//!      │ err, n < max-1
//!      ▼  (backoff)
//! Attempting(n+1) ──err, n == max-1──▶ Failed(Exhausted)
//! ```
//!
//! [`RetryPolicy::advance`] is the pure transition function; [`RetryPolicy::run`]
//! drives it, sleeping the backoff before every attempt except the first.
//! Attempts never overlap.

use crate::error::FetchError;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, instrument, warn};

/// Where the retry loop stands.
#[derive(Debug)]
pub enum AttemptState<T> {
    /// About to run attempt `n` (zero-based).
    Attempting(u32),
    Success(T),
    Failed(FetchError),
}

#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    max_attempts: u32,
    /// Constant delay between attempts.
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Transition after attempt `n` finished with `outcome`.
    pub fn advance<T>(&self, n: u32, outcome: Result<T, FetchError>) -> AttemptState<T> {
        match outcome {
            Ok(value) => AttemptState::Success(value),
            Err(_) if n + 1 < self.max_attempts => AttemptState::Attempting(n + 1),
            Err(e) => AttemptState::Failed(FetchError::Exhausted {
                attempts: n + 1,
                last: Box::new(e),
            }),
        }
    }

    /// Run `attempt` until it succeeds or the attempt budget is spent.
    ///
    /// Each call receives the zero-based attempt number. The returned error is
    /// always [`FetchError::Exhausted`] wrapping the final attempt's error.
    #[instrument(level = "info", skip_all, fields(max = self.max_attempts))]
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, FetchError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let total_t0 = Instant::now();
        let mut state = AttemptState::Attempting(0);

        loop {
            state = match state {
                AttemptState::Attempting(n) => {
                    if n > 0 {
                        sleep(self.backoff).await;
                    }
                    let attempt_t0 = Instant::now();
                    let outcome = attempt(n).await;
                    if let Err(e) = &outcome {
                        let elapsed_ms_attempt = attempt_t0.elapsed().as_millis() as u64;
                        let elapsed_ms_total = total_t0.elapsed().as_millis() as u64;
                        if n + 1 < self.max_attempts {
                            warn!(
                                attempt = n + 1,
                                max = self.max_attempts,
                                elapsed_ms_attempt,
                                elapsed_ms_total,
                                delay = ?self.backoff,
                                error = %e,
                                "Attempt failed; backing off"
                            );
                        } else {
                            error!(
                                attempt = n + 1,
                                max = self.max_attempts,
                                elapsed_ms_attempt,
                                elapsed_ms_total,
                                error = %e,
                                "Attempts exhausted"
                            );
                        }
                    }
                    self.advance(n, outcome)
                }
                AttemptState::Success(value) => return Ok(value),
                AttemptState::Failed(e) => return Err(e),
            };
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn timeout() -> FetchError {
        FetchError::Timeout {
            stage: "navigating",
            elapsed_ms: 10,
        }
    }

    #[test]
    fn test_advance_transitions() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        assert!(matches!(policy.advance(0, Ok(7)), AttemptState::Success(7)));
        assert!(matches!(
            policy.advance::<()>(0, Err(timeout())),
            AttemptState::Attempting(1)
        ));
        assert!(matches!(
            policy.advance::<()>(1, Err(timeout())),
            AttemptState::Attempting(2)
        ));
        match policy.advance::<()>(2, Err(timeout())) {
            AttemptState::Failed(FetchError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.is_timeout());
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert!(matches!(
            policy.advance::<()>(0, Err(timeout())),
            AttemptState::Failed(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_makes_exactly_max_attempts_with_backoff() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2));
        let calls = AtomicU32::new(0);
        let t0 = tokio::time::Instant::now();

        let result: Result<(), _> = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(timeout()) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two backoffs: before the second and third attempts.
        let elapsed = t0.elapsed();
        assert!(elapsed >= Duration::from_secs(4) && elapsed < Duration::from_secs(5));
        let err = result.unwrap_err();
        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert!(err.is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_first_success() {
        let policy = RetryPolicy::new(5, Duration::from_millis(1500));
        let t0 = tokio::time::Instant::now();

        let result = policy
            .run(|n| async move {
                if n < 1 {
                    Err(FetchError::Render("crash".to_string()))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        let elapsed = t0.elapsed();
        assert!(elapsed >= Duration::from_millis(1500) && elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_has_no_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(10));
        let t0 = tokio::time::Instant::now();
        let result = policy.run(|_| async { Ok::<_, FetchError>("done") }).await;
        assert_eq!(result.unwrap(), "done");
        assert!(t0.elapsed() < Duration::from_millis(1));
    }
}
