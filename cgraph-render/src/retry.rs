//! Bounded retry combinator.
//!
//! Fixed attempt budget, no backoff, optional per-attempt timeout. Both the
//! transport loop and the validity loop of the fetcher run through it.

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError<E> {
    /// The operation returned an error.
    Failed(E),
    /// The operation did not finish within the per-attempt timeout.
    TimedOut(Duration),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{}", e),
            Self::TimedOut(after) => write!(f, "timed out after {:?}", after),
        }
    }
}

/// Final failure of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryError<E> {
    /// Attempts made, including the last one.
    pub attempts: u32,
    /// Failure of the last attempt.
    pub last: AttemptError<E>,
}

/// Retry budget for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    per_attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Policy making at most `max_attempts` attempts (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            per_attempt_timeout: None,
        }
    }

    /// Bound every attempt by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = Some(timeout);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn per_attempt_timeout(&self) -> Option<Duration> {
        self.per_attempt_timeout
    }

    /// Run `attempt` until it succeeds or the budget is spent. Every error
    /// and every timeout is retried.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, attempt: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        self.run_if(operation, |_| true, attempt).await
    }

    /// Like [`run`](Self::run), but only errors matching `retryable` are
    /// retried; others end the loop at once. Timeouts are always retried.
    ///
    /// Attempts are numbered from 1.
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        operation: &str,
        retryable: P,
        mut attempt: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: fmt::Display,
    {
        let mut made = 0;
        loop {
            made += 1;
            let outcome = match self.per_attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, attempt(made)).await {
                    Ok(result) => result.map_err(AttemptError::Failed),
                    Err(_) => Err(AttemptError::TimedOut(limit)),
                },
                None => attempt(made).await.map_err(AttemptError::Failed),
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let may_retry = match &err {
                AttemptError::Failed(e) => retryable(e),
                AttemptError::TimedOut(_) => true,
            };
            if !may_retry || made >= self.max_attempts {
                return Err(RetryError {
                    attempts: made,
                    last: err,
                });
            }

            tracing::warn!(
                operation,
                attempt = made,
                max_attempts = self.max_attempts,
                error = %err,
                "Attempt failed, retrying"
            );
        }
    }
}
