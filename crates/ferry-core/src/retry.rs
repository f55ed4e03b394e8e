//! Retry policies keyed by call site.
//!
//! | call site            | retried on          | backoff                         |
//! |----------------------|---------------------|---------------------------------|
//! | session establishment| connection dropped  | exponential, 6 tries            |
//! | directory listing    | timeout             | constant 10s, 60s elapsed cap   |
//! | sample file open     | timeout             | constant 10s, 60s elapsed cap   |
//! | extraction file open | timeout             | exponential, 5 tries            |
//!
//! Errors the predicate rejects are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::emit;
use crate::metrics::events::RetryAttempted;

/// Shape of the wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Wait `base * 2^(attempt - 1)` and give up after `max_tries` attempts.
    Exponential { base: Duration, max_tries: u32 },
    /// Wait `interval` and give up once `max_elapsed` has passed since the first attempt.
    Constant {
        interval: Duration,
        max_elapsed: Duration,
    },
}

/// A named backoff, so retries are attributable in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub call_site: &'static str,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn session() -> Self {
        Self {
            call_site: "connect",
            backoff: Backoff::Exponential {
                base: Duration::from_secs(2),
                max_tries: 6,
            },
        }
    }

    pub const fn listing() -> Self {
        Self {
            call_site: "list",
            backoff: Backoff::Constant {
                interval: Duration::from_secs(10),
                max_elapsed: Duration::from_secs(60),
            },
        }
    }

    pub const fn sample_open() -> Self {
        Self {
            call_site: "sample_open",
            backoff: Backoff::Constant {
                interval: Duration::from_secs(10),
                max_elapsed: Duration::from_secs(60),
            },
        }
    }

    pub const fn extract_open() -> Self {
        Self {
            call_site: "extract_open",
            backoff: Backoff::Exponential {
                base: Duration::from_secs(2),
                max_tries: 5,
            },
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    ///
    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn next_delay(&self, attempt: u32, elapsed: Duration) -> Option<Duration> {
        match self.backoff {
            Backoff::Exponential { base, max_tries } => {
                if attempt >= max_tries {
                    return None;
                }
                let exp = attempt.saturating_sub(1).min(16);
                Some(base.saturating_mul(1u32 << exp))
            }
            Backoff::Constant {
                interval,
                max_elapsed,
            } => {
                if elapsed >= max_elapsed {
                    return None;
                }
                Some(interval.min(max_elapsed - elapsed))
            }
        }
    }
}

/// Run `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the policy gives up. The last error is returned.
pub async fn retry<T, E, F, Fut, P>(policy: RetryPolicy, is_retryable: P, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_retryable(&error) {
            return Err(error);
        }

        let Some(delay) = policy.next_delay(attempt, started.elapsed()) else {
            warn!(
                call_site = policy.call_site,
                attempts = attempt,
                error = %error,
                "Giving up after retries"
            );
            return Err(error);
        };

        warn!(
            call_site = policy.call_site,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after transient failure"
        );
        emit!(RetryAttempted {
            call_site: policy.call_site,
        });
        tokio::time::sleep(delay).await;
    }
}
