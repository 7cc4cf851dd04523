//! Suite Runner
//!
//! Runs many single-run requests, recording each outcome instead of
//! aborting. Implementation panics are caught and recorded as errors.
//! With `fail_fast` the suite stops at the first entry that did not pass.

use super::execution::{Engine, RunRequest};
use serde::Serialize;
use std::time::Instant;
use testgrid_core::TestResult;
use tracing::{info, warn};

/// Outcome of one suite entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteStatus {
    /// Ran; no verdict or a passing verdict
    Passed,
    /// Ran; threshold verdict is failing
    Failed,
    /// Did not produce a result (load, validation, run error or panic)
    Errored,
}

/// One suite entry's record
#[derive(Debug, Clone, Serialize)]
pub struct SuiteOutcome {
    /// Requested identifier
    pub test_id: String,
    /// Outcome
    pub status: SuiteStatus,
    /// Result, when one was produced
    pub result: Option<TestResult>,
    /// Error message, when the entry errored
    pub error: Option<String>,
    /// Wall time in milliseconds
    pub duration_ms: u64,
}

/// Outcomes in request order
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    /// Per-entry outcomes
    pub outcomes: Vec<SuiteOutcome>,
    /// Whether `fail_fast` cut the suite short
    pub stopped_early: bool,
}

impl SuiteReport {
    /// Number of entries with the given status
    pub fn count(&self, status: SuiteStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Whether every recorded entry passed
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == SuiteStatus::Passed)
    }
}

impl Engine {
    /// Run every request, recording failures instead of aborting
    pub fn run_suite(&mut self, requests: Vec<RunRequest>, fail_fast: bool) -> SuiteReport {
        let mut report = SuiteReport::default();
        let total = requests.len();

        for request in requests {
            let test_id = request.test_id.clone();
            let start = Instant::now();

            // Run with panic catching
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.run(request)));
            let duration_ms = start.elapsed().as_millis() as u64;

            let (status, result, error) = match outcome {
                Ok(Ok(result)) => {
                    let status = if result.passed() == Some(false) {
                        SuiteStatus::Failed
                    } else {
                        SuiteStatus::Passed
                    };
                    (status, Some(result), None)
                }
                Ok(Err(e)) => (SuiteStatus::Errored, None, Some(e.to_string())),
                Err(panic) => {
                    let message = if let Some(s) = panic.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    (SuiteStatus::Errored, None, Some(format!("panicked: {}", message)))
                }
            };

            if let Some(error) = &error {
                warn!(test_id = %test_id, "Suite entry errored: {}", error);
            }
            report.outcomes.push(SuiteOutcome {
                test_id,
                status,
                result,
                error,
                duration_ms,
            });

            if fail_fast && status != SuiteStatus::Passed {
                report.stopped_early = report.outcomes.len() < total;
                break;
            }
        }

        info!(
            passed = report.count(SuiteStatus::Passed),
            failed = report.count(SuiteStatus::Failed),
            errored = report.count(SuiteStatus::Errored),
            "Suite complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::TestLoader;
    use crate::provider::ProviderRegistry;
    use crate::store::TestStore;
    use testgrid_core::{FunctionTest, RawOutput};
    use testgrid_logic::InMemoryMetadataStore;

    fn engine() -> Engine {
        let mut engine = Engine::new(TestLoader::new(
            TestStore::new(),
            ProviderRegistry::new(),
            Box::new(InMemoryMetadataStore::new()),
        ));
        let tests = [
            ("acme.t.Ok", FunctionTest::new("Ok", &[], |_, _| Ok(RawOutput::scalar(1.0)))),
            (
                "acme.t.Fails",
                FunctionTest::new("Fails", &[], |_, _| Ok(RawOutput::scalar(0.0).with_passed(false))),
            ),
            ("acme.t.Panics", FunctionTest::new("Panics", &[], |_, _| panic!("kaboom"))),
        ];
        for (id, test) in tests {
            engine.register_custom(id, test.shared()).unwrap();
        }
        engine
    }

    fn requests(ids: &[&str]) -> Vec<RunRequest> {
        ids.iter().map(|id| RunRequest::new(*id)).collect()
    }

    #[test]
    fn test_suite_records_every_outcome() {
        let mut engine = engine();
        let report = engine.run_suite(
            requests(&["acme.t.Ok", "acme.t.Fails", "acme.t.Panics", "nobody.t.Missing"]),
            false,
        );
        let statuses: Vec<SuiteStatus> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                SuiteStatus::Passed,
                SuiteStatus::Failed,
                SuiteStatus::Errored,
                SuiteStatus::Errored
            ]
        );
        assert!(report.outcomes[2].error.as_deref().unwrap().contains("kaboom"));
        assert!(!report.stopped_early);
        assert!(!report.all_passed());
    }

    #[test]
    fn test_fail_fast_stops() {
        let mut engine = engine();
        let report = engine.run_suite(requests(&["acme.t.Fails", "acme.t.Ok"]), true);
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.stopped_early);
        assert_eq!(report.count(SuiteStatus::Failed), 1);
    }
}
