//! Metrics instrumentation for weighted-dns.
//!
//! All metrics are prefixed with `weighted_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a handled DNS query.
pub fn record_query(result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Local => "local",
        QueryResult::Indirect => "indirect",
        QueryResult::Forwarded => "forwarded",
        QueryResult::Error => "error",
    };

    counter!("weighted_dns.query.count", "result" => result_str).increment(1);
    histogram!("weighted_dns.query.duration.seconds", "result" => result_str)
        .record(duration.as_secs_f64());
}

/// Query result type for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryResult {
    /// Answered from the routing table with an address.
    Local,
    /// Answered with a synthetic CNAME plus the forwarded target.
    Indirect,
    /// Not in the table; relayed from upstream.
    Forwarded,
    /// Answered with SERVFAIL.
    Error,
}

/// Record an upstream exchange.
pub fn record_forward(result: ForwardResult) {
    let result_str = match result {
        ForwardResult::Success => "success",
        ForwardResult::Timeout => "timeout",
        ForwardResult::Error => "error",
    };

    counter!("weighted_dns.forward.count", "result" => result_str).increment(1);
}

/// Forward outcome for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardResult {
    /// Upstream replied.
    Success,
    /// Upstream did not reply in time.
    Timeout,
    /// Network or protocol error.
    Error,
}

/// Record an administrative request against the routing table.
pub fn record_admin_request(op: AdminOp, accepted: bool) {
    let op_str = match op {
        AdminOp::Upsert => "upsert",
        AdminOp::Remove => "remove",
        AdminOp::Restore => "restore",
    };
    let outcome = if accepted { "accepted" } else { "rejected" };

    counter!("weighted_dns.admin.request.count", "op" => op_str, "outcome" => outcome)
        .increment(1);
}

/// Administrative mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminOp {
    /// Insert or update one candidate.
    Upsert,
    /// Remove one candidate.
    Remove,
    /// Replace the whole table from a snapshot.
    Restore,
}

/// Record table sizes (call periodically or on change).
pub fn record_table_counts(domains: usize, candidates: usize) {
    gauge!("weighted_dns.table.domains.count").set(domains as f64);
    gauge!("weighted_dns.table.candidates.count").set(candidates as f64);
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
