//! Bounded retry shared by the GitHub rate-limit loop and the font copy loop.
//!
//! A [`RetryPolicy`] decides three things: how many retries are allowed,
//! which errors are worth retrying, and how long to wait before the next
//! attempt. The same policy drives both the async ([`retry`]) and the
//! blocking ([`retry_blocking`]) runner.

use std::future::Future;
use std::time::Duration;

pub trait RetryPolicy<E> {
    /// Retries allowed after the first attempt.
    fn max_retries(&self) -> u32;

    fn is_retryable(&self, error: &E) -> bool;

    /// Wait before retry number `retry` (0 for the first retry).
    fn delay(&self, retry: u32, error: &E) -> Duration;
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The error was retryable but the budget ran out.
    Exhausted { retries: u32, last: E },
    /// The error was not retryable.
    Aborted(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted(e) => e,
        }
    }
}

enum Step<E> {
    Wait(Duration),
    Stop(RetryError<E>),
}

fn next_step<E, P: RetryPolicy<E>>(policy: &P, retries: u32, error: E) -> Step<E> {
    if !policy.is_retryable(&error) {
        return Step::Stop(RetryError::Aborted(error));
    }
    if retries >= policy.max_retries() {
        return Step::Stop(RetryError::Exhausted {
            retries,
            last: error,
        });
    }
    Step::Wait(policy.delay(retries, &error))
}

pub async fn retry<T, E, P, F, Fut>(policy: &P, mut op: F) -> Result<T, RetryError<E>>
where
    P: RetryPolicy<E>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => match next_step(policy, retries, error) {
                Step::Wait(delay) => {
                    tracing::debug!("Retry {} in {:?}", retries + 1, delay);
                    tokio::time::sleep(delay).await;
                    retries += 1;
                }
                Step::Stop(reason) => return Err(reason),
            },
        }
    }
}

pub fn retry_blocking<T, E, P, F>(policy: &P, mut op: F) -> Result<T, RetryError<E>>
where
    P: RetryPolicy<E>,
    F: FnMut() -> Result<T, E>,
{
    let mut retries = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(error) => match next_step(policy, retries, error) {
                Step::Wait(delay) => {
                    tracing::debug!("Retry {} in {:?}", retries + 1, delay);
                    std::thread::sleep(delay);
                    retries += 1;
                }
                Step::Stop(reason) => return Err(reason),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Fatal,
    }

    struct Policy {
        max: u32,
        delay: Duration,
    }

    impl RetryPolicy<TestError> for Policy {
        fn max_retries(&self) -> u32 {
            self.max
        }

        fn is_retryable(&self, error: &TestError) -> bool {
            *error == TestError::Transient
        }

        fn delay(&self, _retry: u32, _error: &TestError) -> Duration {
            self.delay
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_then_succeeds() {
        let policy = Policy {
            max: 5,
            delay: Duration::from_secs(5),
        };
        let calls = Cell::new(0);
        let start = tokio::time::Instant::now();

        let result = retry(&policy, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n == 1 {
                    Err(TestError::Transient)
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_budget() {
        let policy = Policy {
            max: 3,
            delay: Duration::from_secs(1),
        };
        let calls = Cell::new(0);

        let result: Result<(), _> = retry(&policy, || {
            calls.set(calls.get() + 1);
            async { Err(TestError::Transient) }
        })
        .await;

        match result {
            Err(RetryError::Exhausted { retries, last }) => {
                assert_eq!(retries, 3);
                assert_eq!(last, TestError::Transient);
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_blocking_fatal_error_is_not_retried() {
        let policy = Policy {
            max: 9,
            delay: Duration::ZERO,
        };
        let calls = Cell::new(0);

        let result: Result<(), _> = retry_blocking(&policy, || {
            calls.set(calls.get() + 1);
            Err(TestError::Fatal)
        });

        assert!(matches!(result, Err(RetryError::Aborted(TestError::Fatal))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_blocking_attempt_count() {
        let policy = Policy {
            max: 9,
            delay: Duration::ZERO,
        };
        let calls = Cell::new(0);

        let result: Result<(), _> = retry_blocking(&policy, || {
            calls.set(calls.get() + 1);
            Err(TestError::Transient)
        });

        assert!(matches!(result, Err(RetryError::Exhausted { retries: 9, .. })));
        assert_eq!(calls.get(), 10);
    }
}
