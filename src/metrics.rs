//! Decision outcome counters for the admission webhook
//!
//! Provides observability into how many Jobs were patched, skipped, or
//! already carried the target TTL. Counters are plain atomics: exact under
//! concurrent increment from parallel admission requests, and readable
//! without locking by the metrics endpoint.
//!
//! The recorder is an injected capability rather than a process-global
//! registry, so the decision logic stays a pure function and tests can
//! substitute their own recorder.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::mutate::Outcome;

/// Capability for recording what a decision call did
///
/// Recording is fire and forget: implementations must never influence the
/// decision result, and must be safe to call from many concurrent decision
/// calls without losing updates.
pub trait OutcomeRecorder: Send + Sync {
    /// Record the outcome of one decision call
    fn record(&self, outcome: Outcome);

    /// Record that the configured selector matched a Job
    ///
    /// This is a coarser count than the per-outcome ones: a matched Job may
    /// still end up `Patched` or `AlreadySet`.
    fn record_selector_match(&self);
}

/// Webhook mutation metrics
#[derive(Debug, Default)]
pub struct MutationMetrics {
    /// Total decision calls evaluated
    requests_total: AtomicU64,
    /// Calls where the configured selector matched
    selector_matched_total: AtomicU64,
    /// Calls that patched the TTL
    patched_total: AtomicU64,
    /// Calls where the TTL already had the target value
    already_set_total: AtomicU64,
    /// Calls skipped because the selector did not match
    skipped_total: AtomicU64,
    /// Calls denied because of a malformed selector
    denied_total: AtomicU64,
}

impl MutationMetrics {
    /// Create a new metrics instance with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total decision calls
    pub fn requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get calls where the selector matched
    pub fn selector_matched(&self) -> u64 {
        self.selector_matched_total.load(Ordering::Relaxed)
    }

    /// Get calls that patched the TTL
    pub fn patched(&self) -> u64 {
        self.patched_total.load(Ordering::Relaxed)
    }

    /// Get calls where the target TTL was already set
    pub fn already_set(&self) -> u64 {
        self.already_set_total.load(Ordering::Relaxed)
    }

    /// Get calls skipped by the selector
    pub fn skipped(&self) -> u64 {
        self.skipped_total.load(Ordering::Relaxed)
    }

    /// Get calls denied because of a malformed selector
    pub fn denied(&self) -> u64 {
        self.denied_total.load(Ordering::Relaxed)
    }

    /// Render all counters in the Prometheus text exposition format
    ///
    /// Served by the metrics endpoint; the counter names match what the
    /// scrape configuration expects.
    pub fn render(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "# HELP jobttl_webhook_requests_total Total number of webhook admission requests evaluated"
        );
        let _ = writeln!(out, "# TYPE jobttl_webhook_requests_total counter");
        for (result, value) in [
            ("patched", self.patched()),
            ("already_set", self.already_set()),
            ("skipped", self.skipped()),
            ("denied", self.denied()),
        ] {
            let _ = writeln!(
                out,
                "jobttl_webhook_requests_total{{result=\"{result}\"}} {value}"
            );
        }

        let _ = writeln!(
            out,
            "# HELP jobttl_webhook_jobs_patched_total Total number of Jobs that were patched with TTL values"
        );
        let _ = writeln!(out, "# TYPE jobttl_webhook_jobs_patched_total counter");
        let _ = writeln!(out, "jobttl_webhook_jobs_patched_total {}", self.patched());

        let _ = writeln!(
            out,
            "# HELP jobttl_jobs_matching_selector_total Total number of Jobs matching the configured label selector"
        );
        let _ = writeln!(out, "# TYPE jobttl_jobs_matching_selector_total counter");
        let _ = writeln!(
            out,
            "jobttl_jobs_matching_selector_total {}",
            self.selector_matched()
        );

        let _ = writeln!(
            out,
            "# HELP jobttl_jobs_ttl_already_set_total Total number of Jobs that already had the target TTL value"
        );
        let _ = writeln!(out, "# TYPE jobttl_jobs_ttl_already_set_total counter");
        let _ = writeln!(
            out,
            "jobttl_jobs_ttl_already_set_total {}",
            self.already_set()
        );

        out
    }
}

impl OutcomeRecorder for MutationMetrics {
    fn record(&self, outcome: Outcome) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Patched => &self.patched_total,
            Outcome::AlreadySet => &self.already_set_total,
            Outcome::Skipped => &self.skipped_total,
            Outcome::Denied => &self.denied_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_selector_match(&self) {
        self.selector_matched_total.fetch_add(1, Ordering::Relaxed);
    }
}
