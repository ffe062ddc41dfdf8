use std::{future::Future, time::Duration};

#[derive(Debug, PartialEq)]
pub enum Status<S> {
    Pending,
    Complete(S),
}

#[derive(Debug, PartialEq)]
pub enum PollError<E> {
    /// The condition never completed.
    Exhausted { attempts: usize },
    Abort(E),
}

impl<E> From<E> for PollError<E> {
    fn from(value: E) -> Self {
        PollError::Abort(value)
    }
}

/// How often, and how many times, to check on something before giving up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: usize,
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            interval,
            max_attempts,
        }
    }

    /// A policy that keeps polling every `interval` for at least `timeout`.
    pub fn covering(interval: Duration, timeout: Duration) -> RetryPolicy {
        let attempts = if interval.is_zero() {
            1
        } else {
            (timeout.as_secs_f64() / interval.as_secs_f64()).ceil() as usize
        };
        RetryPolicy::new(interval, attempts.max(1))
    }

    /// Calls `f` until it reports [Status::Complete], sleeping `interval` between calls.
    /// An `Err` from `f` stops polling immediately.
    pub async fn poll_fn<S, E, F, Fut>(&self, mut f: F) -> Result<S, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Status<S>, E>>,
    {
        for attempt in 1..=self.max_attempts {
            if let Status::Complete(s) = f().await? {
                return Ok(s);
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        Err(PollError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
