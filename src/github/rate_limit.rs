//! Rate-limit header inspection for GitHub responses.
//!
//! Every response carries `x-ratelimit-*` headers. The monitor turns them into a
//! snapshot and raises a warning through a caller-supplied sink when the remaining
//! quota runs low or is exhausted.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

/// Quota state reported by a single response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub limit: Option<u64>,
    pub remaining: u64,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitSnapshot {
    /// Read the quota headers. Returns `None` when `x-ratelimit-remaining` is absent.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let remaining = header_u64(headers, "x-ratelimit-remaining")?;
        let limit = header_u64(headers, "x-ratelimit-limit");
        let reset_at = header_u64(headers, "x-ratelimit-reset")
            .and_then(|ts| DateTime::from_timestamp(ts as i64, 0));

        Some(Self {
            limit,
            remaining,
            reset_at,
        })
    }

    fn reset_display(&self) -> String {
        self.reset_at
            .map(|dt| dt.format("%H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "?".to_string())
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Warning raised by [`RateLimitMonitor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitWarning {
    /// Remaining quota dropped under the configured threshold.
    Low(RateLimitSnapshot),
    /// No quota left until the reset time; further calls will be refused.
    Exhausted(RateLimitSnapshot),
}

impl RateLimitWarning {
    pub fn snapshot(&self) -> &RateLimitSnapshot {
        match self {
            RateLimitWarning::Low(s) | RateLimitWarning::Exhausted(s) => s,
        }
    }
}

impl fmt::Display for RateLimitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitWarning::Low(s) => write!(
                f,
                "GitHub API rate limit low: {}/{} remaining (resets at {})",
                s.remaining,
                s.limit
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                s.reset_display()
            ),
            RateLimitWarning::Exhausted(s) => write!(
                f,
                "GitHub API rate limit exhausted; requests blocked until {}",
                s.reset_display()
            ),
        }
    }
}

/// Sink for rate-limit warnings.
pub type WarningSink = Arc<dyn Fn(&RateLimitWarning) + Send + Sync>;

/// Inspects response headers and reports low or exhausted quota.
#[derive(Clone)]
pub struct RateLimitMonitor {
    threshold: u64,
    sink: WarningSink,
}

impl RateLimitMonitor {
    /// Monitor that logs warnings through `tracing`.
    pub fn new(threshold: u64) -> Self {
        Self {
            threshold,
            sink: Arc::new(log_warning),
        }
    }

    /// Replace the default logging sink.
    pub fn with_sink(mut self, sink: WarningSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Classify a snapshot against the threshold.
    pub fn evaluate(&self, snapshot: &RateLimitSnapshot) -> Option<RateLimitWarning> {
        if snapshot.remaining == 0 {
            Some(RateLimitWarning::Exhausted(snapshot.clone()))
        } else if snapshot.remaining < self.threshold {
            Some(RateLimitWarning::Low(snapshot.clone()))
        } else {
            None
        }
    }

    /// Read the headers of a response, emit any warning, and return the snapshot.
    pub fn observe(&self, headers: &HeaderMap) -> Option<RateLimitSnapshot> {
        let snapshot = RateLimitSnapshot::from_headers(headers)?;
        if let Some(warning) = self.evaluate(&snapshot) {
            (self.sink)(&warning);
        }
        Some(snapshot)
    }
}

impl Default for RateLimitMonitor {
    fn default() -> Self {
        Self::new(100)
    }
}

impl fmt::Debug for RateLimitMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitMonitor")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

fn log_warning(warning: &RateLimitWarning) {
    match warning {
        RateLimitWarning::Low(_) => warn!("{}", warning),
        RateLimitWarning::Exhausted(_) => error!("{}", warning),
    }
}
