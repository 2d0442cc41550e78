//! Retry classification and exponential backoff with jitter (C7), shared
//! by the embedder client and the media analyzer.

use std::time::Duration;

use rand::Rng;

use crate::error::ErrorKind;

/// Policy governing retry attempts for a single logical call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Backoff delay for the given (1-based) attempt number, full-jittered
    /// between zero and the exponential cap.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
        let capped = exp.min(self.max_delay.as_secs_f64());
        let jittered = rand::rng().random_range(0.0..=capped);
        Duration::from_secs_f64(jittered)
    }
}

/// Outcome of classifying a raw transport/HTTP error.
#[derive(Debug, Clone, Copy)]
pub struct Classification {
    pub kind: ErrorKind,
}

/// Classifies an HTTP status code the way the embed/analyze contract
/// requires: 5xx, 429, and transport timeouts are retryable; other 4xx and
/// schema errors are terminal.
pub fn classify_status(status: Option<u16>, is_timeout: bool, is_transport_error: bool) -> Classification {
    if is_timeout || is_transport_error {
        return Classification { kind: ErrorKind::Transient };
    }
    match status {
        Some(429) => Classification { kind: ErrorKind::Transient },
        Some(s) if (500..600).contains(&s) => Classification { kind: ErrorKind::Transient },
        Some(_) => Classification { kind: ErrorKind::Permanent },
        None => Classification { kind: ErrorKind::Transient },
    }
}

/// Runs `attempt` under `policy`, retrying transient failures with
/// backoff until `max_attempts` is reached. `attempt` returns
/// `Ok(T)`, or `Err((Classification, E))` describing why it failed.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: &RetryPolicy, mut attempt: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, (Classification, E)>>,
{
    let mut last_err = None;
    for n in 1..=policy.max_attempts {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err((classification, err)) => {
                last_err = Some(err);
                if matches!(classification.kind, ErrorKind::Permanent) || n == policy.max_attempts {
                    break;
                }
                tokio::time::sleep(policy.backoff_for_attempt(n)).await;
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_5xx_and_429_are_retryable() {
        assert!(matches!(classify_status(Some(500), false, false).kind, ErrorKind::Transient));
        assert!(matches!(classify_status(Some(503), false, false).kind, ErrorKind::Transient));
        assert!(matches!(classify_status(Some(429), false, false).kind, ErrorKind::Transient));
    }

    #[test]
    fn other_4xx_is_terminal() {
        assert!(matches!(classify_status(Some(400), false, false).kind, ErrorKind::Permanent));
        assert!(matches!(classify_status(Some(404), false, false).kind, ErrorKind::Permanent));
    }

    #[test]
    fn timeout_is_retryable_regardless_of_status() {
        assert!(matches!(classify_status(None, true, false).kind, ErrorKind::Transient));
    }

    #[tokio::test]
    async fn succeeds_after_two_transient_failures() {
        let policy = RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(5) };
        let mut calls = 0;
        let result: Result<&str, ()> = retry_with_backoff(&policy, |n| {
            calls += 1;
            async move {
                if n < 3 {
                    Err((Classification { kind: ErrorKind::Transient }, ()))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn terminal_error_stops_retrying_immediately() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let result: Result<(), &str> = retry_with_backoff(&policy, |_| {
            calls += 1;
            async move { Err((Classification { kind: ErrorKind::Permanent }, "bad request")) }
        })
        .await;
        assert_eq!(result, Err("bad request"));
        assert_eq!(calls, 1);
    }
}
