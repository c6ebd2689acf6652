//! TTL defaulting decision logic
//!
//! [`TtlDefaulter`] is the single decision point of the webhook: given a Job
//! and the process configuration, decide whether to inject the target
//! `ttlSecondsAfterFinished` value. The rules, evaluated in order with the
//! first match winning:
//!
//! 1. Selector configured but malformed: deny, return the parse error, Job
//!    untouched.
//! 2. Selector configured and the Job does not match: skip, Job untouched.
//! 3. Job already carries the target TTL: nothing to do, Job untouched.
//! 4. Otherwise set the TTL to the target value.
//!
//! Selector eligibility gates the TTL rules, so Jobs outside scope are never
//! touched even when their TTL differs from the target. The already-set
//! check makes the decision idempotent: re-admitting an object the webhook
//! has patched before produces no further mutation events.
//!
//! The defaulter holds no mutable state and performs no I/O; concurrent
//! decision calls only share the injected [`OutcomeRecorder`].

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::batch::v1::Job;
use tracing::{debug, info, warn};

use crate::metrics::{MutationMetrics, OutcomeRecorder};
use crate::selector::Selector;
use crate::{Error, Result};

/// Classification of what a single decision call did
///
/// Exactly one outcome is produced per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The TTL was set or overwritten to the target value
    Patched,
    /// The Job already carried the target TTL; no mutation
    AlreadySet,
    /// The Job did not match the configured selector; no mutation
    Skipped,
    /// The configured selector was malformed; the request must be rejected
    Denied,
}

/// Immutable mutation configuration, fixed for the process lifetime
#[derive(Debug, Clone)]
pub struct MutationConfig {
    /// TTL in seconds to inject into eligible Jobs
    pub target_ttl: i32,
    /// Label selector scoping which Jobs are eligible; the empty string
    /// disables selector filtering
    pub label_selector: String,
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            target_ttl: crate::DEFAULT_TARGET_TTL,
            label_selector: String::new(),
        }
    }
}

impl MutationConfig {
    /// Validate the configuration eagerly.
    ///
    /// Called once at startup so a malformed selector or nonsensical TTL
    /// refuses to serve instead of denying every admission request. The
    /// decision call still re-checks the selector on each use, since it
    /// accepts arbitrary configuration values and cannot assume this ran.
    pub fn validate(&self) -> Result<()> {
        if self.target_ttl <= 0 {
            return Err(Error::config(format!(
                "target TTL must be positive, got {}",
                self.target_ttl
            )));
        }
        if !self.label_selector.is_empty() {
            Selector::parse(&self.label_selector)?;
        }
        Ok(())
    }
}

/// The TTL defaulting decision engine
///
/// Generic over the outcome recorder so tests can observe recording without
/// real counters; production wiring uses [`MutationMetrics`].
pub struct TtlDefaulter<R: OutcomeRecorder = MutationMetrics> {
    config: MutationConfig,
    recorder: Arc<R>,
}

impl<R: OutcomeRecorder> TtlDefaulter<R> {
    /// Create a defaulter from configuration and an outcome recorder
    pub fn new(config: MutationConfig, recorder: Arc<R>) -> Self {
        Self { config, recorder }
    }

    /// Get the mutation configuration
    pub fn config(&self) -> &MutationConfig {
        &self.config
    }

    /// Decide whether to default the TTL on a Job, mutating it in place.
    ///
    /// Returns the [`Outcome`] of the decision. The only error is a
    /// malformed selector expression; the caller is expected to reject the
    /// enclosing admission request in that case, and the Job is left
    /// untouched. The recorder is invoked exactly once per call, after the
    /// decision has been made.
    pub fn default_ttl(&self, job: &mut Job) -> Result<Outcome> {
        let name = job.metadata.name.clone().unwrap_or_default();
        let namespace = job.metadata.namespace.clone().unwrap_or_default();

        if !self.config.label_selector.is_empty() {
            let selector = match Selector::parse(&self.config.label_selector) {
                Ok(selector) => selector,
                Err(e) => {
                    warn!(
                        selector = %self.config.label_selector,
                        error = %e,
                        "invalid label selector"
                    );
                    self.recorder.record(Outcome::Denied);
                    return Err(e.into());
                }
            };

            let empty = BTreeMap::new();
            let labels = job.metadata.labels.as_ref().unwrap_or(&empty);
            if !selector.matches(labels) {
                debug!(
                    job = %name,
                    namespace = %namespace,
                    selector = %self.config.label_selector,
                    "job does not match label selector, skipping"
                );
                self.recorder.record(Outcome::Skipped);
                return Ok(Outcome::Skipped);
            }
            self.recorder.record_selector_match();
        }

        let spec = job.spec.get_or_insert_with(Default::default);

        if spec.ttl_seconds_after_finished == Some(self.config.target_ttl) {
            debug!(
                job = %name,
                namespace = %namespace,
                ttl = self.config.target_ttl,
                "job already has target TTL value"
            );
            self.recorder.record(Outcome::AlreadySet);
            return Ok(Outcome::AlreadySet);
        }

        match spec.ttl_seconds_after_finished {
            Some(current) => info!(
                job = %name,
                namespace = %namespace,
                current_ttl = current,
                target_ttl = self.config.target_ttl,
                "job has different TTL value, updating"
            ),
            None => info!(
                job = %name,
                namespace = %namespace,
                target_ttl = self.config.target_ttl,
                "job has no TTL value, setting"
            ),
        }

        spec.ttl_seconds_after_finished = Some(self.config.target_ttl);
        self.recorder.record(Outcome::Patched);
        Ok(Outcome::Patched)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use k8s_openapi::api::batch::v1::JobSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;

    /// Recorder that remembers every outcome it saw
    #[derive(Default)]
    struct MockRecorder {
        outcomes: Mutex<Vec<Outcome>>,
        selector_matches: AtomicU64,
    }

    impl OutcomeRecorder for MockRecorder {
        fn record(&self, outcome: Outcome) {
            self.outcomes.lock().unwrap().push(outcome);
        }

        fn record_selector_match(&self) {
            self.selector_matches.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn test_job(labels: &[(&str, &str)], ttl: Option<i32>) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some("pipeline-job".to_string()),
                namespace: Some("default".to_string()),
                labels: if labels.is_empty() {
                    None
                } else {
                    Some(
                        labels
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect(),
                    )
                },
                ..Default::default()
            },
            spec: Some(JobSpec {
                ttl_seconds_after_finished: ttl,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn defaulter(target_ttl: i32, label_selector: &str) -> (TtlDefaulter<MockRecorder>, Arc<MockRecorder>) {
        let recorder = Arc::new(MockRecorder::default());
        let config = MutationConfig {
            target_ttl,
            label_selector: label_selector.to_string(),
        };
        (TtlDefaulter::new(config, recorder.clone()), recorder)
    }

    fn job_ttl(job: &Job) -> Option<i32> {
        job.spec.as_ref().and_then(|s| s.ttl_seconds_after_finished)
    }

    // =========================================================================
    // Decision table
    // =========================================================================

    #[test]
    fn test_job_without_ttl_is_patched() {
        let (defaulter, _) = defaulter(3600, "");
        let mut job = test_job(&[], None);

        let outcome = defaulter.default_ttl(&mut job).unwrap();

        assert_eq!(outcome, Outcome::Patched);
        assert_eq!(job_ttl(&job), Some(3600));
    }

    #[test]
    fn test_job_with_target_ttl_is_left_alone() {
        let (defaulter, _) = defaulter(3600, "");
        let mut job = test_job(&[], Some(3600));
        let before = job.clone();

        let outcome = defaulter.default_ttl(&mut job).unwrap();

        assert_eq!(outcome, Outcome::AlreadySet);
        assert_eq!(job, before);
    }

    #[test]
    fn test_job_with_different_ttl_is_overwritten() {
        let (defaulter, _) = defaulter(3600, "");
        let mut job = test_job(&[], Some(1800));

        let outcome = defaulter.default_ttl(&mut job).unwrap();

        assert_eq!(outcome, Outcome::Patched);
        assert_eq!(job_ttl(&job), Some(3600));
    }

    #[test]
    fn test_job_outside_selector_is_skipped() {
        let (defaulter, _) = defaulter(3600, "app=web");
        let mut job = test_job(&[("app", "batch")], None);
        let before = job.clone();

        let outcome = defaulter.default_ttl(&mut job).unwrap();

        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(job, before);
    }

    #[test]
    fn test_malformed_selector_denies_and_leaves_job_untouched() {
        let (defaulter, recorder) = defaulter(3600, "app==");
        let mut job = test_job(&[("app", "batch")], Some(1800));
        let before = job.clone();

        let err = defaulter.default_ttl(&mut job).unwrap_err();

        assert!(matches!(err, Error::Selector(_)));
        assert_eq!(job, before);
        assert_eq!(*recorder.outcomes.lock().unwrap(), vec![Outcome::Denied]);
    }

    #[test]
    fn test_matching_job_is_patched() {
        let (defaulter, recorder) = defaulter(3600, "app=batch");
        let mut job = test_job(&[("app", "batch")], None);

        let outcome = defaulter.default_ttl(&mut job).unwrap();

        assert_eq!(outcome, Outcome::Patched);
        assert_eq!(job_ttl(&job), Some(3600));
        assert_eq!(recorder.selector_matches.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_job_without_labels_does_not_match_selector() {
        let (defaulter, _) = defaulter(3600, "app=web");
        let mut job = test_job(&[], None);

        let outcome = defaulter.default_ttl(&mut job).unwrap();

        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(job_ttl(&job), None);
    }

    #[test]
    fn test_job_without_spec_gets_one_with_the_ttl() {
        let (defaulter, _) = defaulter(3600, "");
        let mut job = test_job(&[], None);
        job.spec = None;

        let outcome = defaulter.default_ttl(&mut job).unwrap();

        assert_eq!(outcome, Outcome::Patched);
        assert_eq!(job_ttl(&job), Some(3600));
    }

    #[test]
    fn test_selector_match_is_not_counted_when_filtering_is_disabled() {
        let (defaulter, recorder) = defaulter(3600, "");
        let mut job = test_job(&[("app", "batch")], None);

        defaulter.default_ttl(&mut job).unwrap();

        assert_eq!(recorder.selector_matches.load(Ordering::Relaxed), 0);
    }

    // =========================================================================
    // Configuration validation
    // =========================================================================

    #[test]
    fn test_validate_accepts_reasonable_config() {
        let config = MutationConfig {
            target_ttl: 3600,
            label_selector: "app in (batch, etl)".to_string(),
        };
        assert!(config.validate().is_ok());

        assert!(MutationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nonpositive_ttl() {
        for ttl in [0, -1, -3600] {
            let config = MutationConfig {
                target_ttl: ttl,
                label_selector: String::new(),
            };
            let err = config.validate().unwrap_err();
            assert!(matches!(err, Error::Config(_)), "ttl {ttl}");
        }
    }

    #[test]
    fn test_validate_rejects_malformed_selector() {
        let config = MutationConfig {
            target_ttl: 3600,
            label_selector: "app==".to_string(),
        };
        assert!(matches!(
            config.validate().unwrap_err(),
            Error::Selector(_)
        ));
    }

    // =========================================================================
    // Story Tests: Decision Invariants
    // =========================================================================

    /// Story: defaulting is idempotent
    ///
    /// Admission webhooks see the same object repeatedly, e.g. on status
    /// updates. The second decision on a patched Job must be a no-op, so
    /// unrelated updates do not generate spurious mutation events.
    #[test]
    fn story_second_decision_is_a_no_op() {
        let (defaulter, _) = defaulter(3600, "");
        let mut job = test_job(&[], Some(1800));

        assert_eq!(defaulter.default_ttl(&mut job).unwrap(), Outcome::Patched);
        let after_first = job.clone();

        assert_eq!(
            defaulter.default_ttl(&mut job).unwrap(),
            Outcome::AlreadySet
        );
        assert_eq!(job, after_first);
        assert_eq!(job_ttl(&job), Some(3600));
    }

    /// Story: Jobs outside scope are never touched
    ///
    /// Even when a non-matching Job carries a TTL that differs from the
    /// target, selector eligibility is decided first and the Job passes
    /// through byte for byte.
    #[test]
    fn story_selector_gates_before_any_mutation() {
        let (defaulter, _) = defaulter(3600, "team=data");
        let mut job = test_job(&[("team", "web")], Some(60));
        let before = job.clone();

        assert_eq!(defaulter.default_ttl(&mut job).unwrap(), Outcome::Skipped);
        assert_eq!(job, before);
    }

    /// Story: exactly one outcome per decision call
    ///
    /// Whatever path the decision takes, the recorder sees one outcome for
    /// each call, never zero and never two.
    #[test]
    fn story_exactly_one_outcome_per_call() {
        let (defaulter, recorder) = defaulter(3600, "app=batch");

        // Patched, Skipped, AlreadySet in turn
        let mut matching = test_job(&[("app", "batch")], None);
        defaulter.default_ttl(&mut matching).unwrap();
        let mut other = test_job(&[("app", "web")], None);
        defaulter.default_ttl(&mut other).unwrap();
        let mut done = test_job(&[("app", "batch")], Some(3600));
        defaulter.default_ttl(&mut done).unwrap();

        assert_eq!(
            *recorder.outcomes.lock().unwrap(),
            vec![Outcome::Patched, Outcome::Skipped, Outcome::AlreadySet]
        );
    }

    /// Story: concurrent decisions share nothing but the recorder
    ///
    /// Each call operates on its own Job and the immutable configuration,
    /// so parallel decisions cannot interfere with one another.
    #[test]
    fn story_concurrent_decisions_are_independent() {
        let recorder = Arc::new(MockRecorder::default());
        let defaulter = Arc::new(TtlDefaulter::new(
            MutationConfig {
                target_ttl: 3600,
                label_selector: String::new(),
            },
            recorder.clone(),
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let defaulter = defaulter.clone();
                std::thread::spawn(move || {
                    let mut job = test_job(&[], Some(i));
                    defaulter.default_ttl(&mut job).unwrap();
                    job_ttl(&job)
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(3600));
        }
        assert_eq!(recorder.outcomes.lock().unwrap().len(), 8);
    }
}
