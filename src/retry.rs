//! Outcome classification and backoff bookkeeping for the call executor.

use std::time::Duration;

use reqwest::{
    header::{HeaderMap, RETRY_AFTER},
    StatusCode,
};

/// How a received status code is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx: return the body.
    Success,
    /// 429 and 503: retry, honoring `Retry-After` when present.
    Throttled,
    /// Any other 5xx: retry on the computed backoff.
    ServerError,
    /// Everything else: report immediately.
    Terminal,
}

pub fn classify_status(status: StatusCode) -> StatusClass {
    match status {
        s if s.is_success() => StatusClass::Success,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => StatusClass::Throttled,
        s if s.is_server_error() => StatusClass::ServerError,
        _ => StatusClass::Terminal,
    }
}

/// Reads `Retry-After` as whole seconds. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    let seconds = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}

/// Exponential backoff that doubles after every retried attempt, capped at
/// `ceiling`.
#[derive(Clone, Debug)]
pub struct Backoff {
    current: Duration,
    ceiling: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, ceiling: Duration) -> Self {
        Self {
            current: initial.min(ceiling),
            ceiling,
        }
    }

    /// The wait to use for the upcoming retry.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Doubles the backoff for the following retry.
    pub fn advance(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.ceiling);
    }

    /// Clamps an externally requested wait to the ceiling.
    pub fn clamp(&self, wait: Duration) -> Duration {
        wait.min(self.ceiling)
    }
}
