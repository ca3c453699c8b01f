//! Timeout retry with an escalating timeout.
//!
//! A transport timeout or a 504 Gateway Timeout re-executes the original
//! request with the previous timeout multiplied, until the previous timeout
//! exceeds the ceiling:
//!
//! ```text
//! 1s ─timeout─► 5s ─504─► 25s ─504─► 125s ─504─► error (125s > 60s)
//! ```
//!
//! There is no attempt counter; the ceiling alone bounds the chain.

use std::time::Duration;

use tracing::{debug, info};

use super::Exchange;
use crate::client::{ClientInner, Settled};
use crate::config::ConnectionConfig;
use crate::error::ApiError;
use crate::metrics;
use crate::models::RequestContext;

/// Multiplier and ceiling for timeout retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutRetryPolicy {
    multiplier: u32,
    ceiling: Duration,
}

impl TimeoutRetryPolicy {
    pub fn new(multiplier: u32, ceiling: Duration) -> Self {
        Self {
            multiplier: multiplier.max(1),
            ceiling,
        }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.timeout_multiplier, config.timeout_ceiling)
    }

    /// Whether the error qualifies for a retry at all.
    pub fn should_retry(&self, error: &ApiError) -> bool {
        error.is_timeout()
    }

    /// Timeout for the next attempt, or `None` once `previous` exceeds the ceiling.
    pub fn next_timeout(&self, previous: Duration) -> Option<Duration> {
        if previous > self.ceiling {
            return None;
        }
        Some(previous.saturating_mul(self.multiplier))
    }
}

impl Default for TimeoutRetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(60_000))
    }
}

pub(crate) async fn on_settled(
    client: &ClientInner,
    exchange: &Exchange<'_>,
    ctx: &mut RequestContext,
    settled: Settled,
) -> Settled {
    let error = match settled {
        Err(error) if client.timeout_policy.should_retry(&error) => error,
        other => return other,
    };

    let previous = exchange.sent.timeout().unwrap_or(client.config.timeout);
    let Some(next) = client.timeout_policy.next_timeout(previous) else {
        debug!(
            url = exchange.original.url(),
            previous_ms = previous.as_millis() as u64,
            "Timeout ceiling reached, giving up"
        );
        return Err(error);
    };

    metrics::record_timeout_retry();
    info!(
        url = exchange.original.url(),
        previous_ms = previous.as_millis() as u64,
        next_ms = next.as_millis() as u64,
        error = %error,
        "Retrying with a longer timeout"
    );

    let retry = exchange.original.clone().with_timeout(next);
    let settled = client.execute(retry, ctx.clone()).await;
    ctx.settled_by_retry = true;
    settled
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_next_timeout_multiplies() {
        let policy = TimeoutRetryPolicy::default();
        assert_eq!(
            policy.next_timeout(Duration::from_millis(1000)),
            Some(Duration::from_millis(5000))
        );
        assert_eq!(
            policy.next_timeout(Duration::from_millis(25_000)),
            Some(Duration::from_millis(125_000))
        );
    }

    #[test]
    fn test_ceiling_is_exclusive() {
        let policy = TimeoutRetryPolicy::default();
        assert_eq!(
            policy.next_timeout(Duration::from_millis(60_000)),
            Some(Duration::from_millis(300_000))
        );
        assert_eq!(policy.next_timeout(Duration::from_millis(60_001)), None);
    }

    #[test]
    fn test_chain_terminates() {
        let policy = TimeoutRetryPolicy::default();
        let mut timeout = Duration::from_millis(1000);
        let mut attempts = 1;
        while let Some(next) = policy.next_timeout(timeout) {
            timeout = next;
            attempts += 1;
        }
        assert_eq!(attempts, 4);
        assert_eq!(timeout, Duration::from_millis(125_000));
    }

    #[test]
    fn test_multiplier_floor_is_one() {
        let policy = TimeoutRetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(
            policy.next_timeout(Duration::from_millis(200)),
            Some(Duration::from_millis(200))
        );
    }

    #[test]
    fn test_should_retry_only_timeouts() {
        let policy = TimeoutRetryPolicy::default();
        let timeout = ApiError::Timeout {
            method: reqwest::Method::GET,
            url: "/slow".into(),
            timeout: Duration::from_millis(10),
        };
        assert!(policy.should_retry(&timeout));
        assert!(!policy.should_retry(&ApiError::NoPendingStepUp));
    }
}
