//! Per-route results and the per-request outcome record.
//!
//! The dispatcher hands one [`OutcomeRecord`] per request to an
//! [`OutcomeSink`]. Sinks are fire-and-forget: they must not block for
//! long and must never fail the request.

use serde::{Deserialize, Serialize};

/// Outcome of running one route for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub route: String,
    pub target_url: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// At least one matched route succeeded.
    Success,
    /// Every matched route failed.
    Failed,
    /// No route matched and no fallback ran.
    Unmatched,
    /// No route matched; the fallback route ran.
    Fallback,
    ValidationError,
    MethodNotAllowed,
    DryRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub timestamp: String,
    pub correlation_id: String,
    pub kind: OutcomeKind,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl OutcomeRecord {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

pub trait OutcomeSink: Send + Sync {
    fn record(&self, record: OutcomeRecord);
}
