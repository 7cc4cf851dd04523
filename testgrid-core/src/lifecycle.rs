//! Test Lifecycle
//!
//! One [`TestInstance`] per execution:
//!
//! ```text
//! Created ──validate──► Validated ──run──► Run ──cache_results──► Summarized
//!                                                                   │
//!                                             render_with / log_with┘
//!                                                  (Rendered | Logged)
//! ```
//!
//! An instance runs at most once. The state moves to `Run` before user code
//! is invoked, so a failed run cannot be retried on the same instance either.

use crate::error::{Result, TestError};
use crate::identifier::TestId;
use crate::implementation::SharedTest;
use crate::inputs::{BoundInputs, Record};
use crate::output::RawOutput;
use crate::params::Params;
use crate::result::{InputRef, ResultKind, ResultParts, TestResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

/// Lifecycle position of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Inputs and params bound
    Created,
    /// Required inputs checked
    Validated,
    /// Implementation invoked
    Run,
    /// Result attached
    Summarized,
    /// Result rendered for display
    Rendered,
    /// Result shipped to a sink
    Logged,
}

/// Metadata key carrying the output template
pub const OUTPUT_TEMPLATE_KEY: &str = "output_template";

/// Metadata key carrying the creation timestamp
pub const CREATED_AT_KEY: &str = "created_at";

/// A single execution of one test
pub struct TestInstance {
    test_id: TestId,
    test: SharedTest,
    inputs: BoundInputs,
    params: Params,
    state: LifecycleState,
    result: Option<TestResult>,
    output_template: Option<String>,
}

impl TestInstance {
    /// Bind inputs and params. Effective params are the implementation's
    /// defaults overridden by `overrides`; undeclared overrides are kept but
    /// reported.
    pub fn new(test_id: TestId, test: SharedTest, inputs: BoundInputs, overrides: Params) -> Self {
        let defaults = test.default_params();
        for name in overrides.unknown_keys(&defaults) {
            warn!(test_id = %test_id, param = %name, "Parameter is not declared by the test");
        }
        let params = Params::merged(&defaults, &overrides);

        Self {
            test_id,
            test,
            inputs,
            params,
            state: LifecycleState::Created,
            result: None,
            output_template: None,
        }
    }

    /// Attach an output template, stored in the result metadata
    pub fn with_output_template(mut self, template: Option<String>) -> Self {
        self.output_template = template;
        self
    }

    /// Identifier this instance runs under
    pub fn test_id(&self) -> &TestId {
        &self.test_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Effective parameters
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Bound inputs
    pub fn inputs(&self) -> &BoundInputs {
        &self.inputs
    }

    /// Attached result, once run
    pub fn result(&self) -> Option<&TestResult> {
        self.result.as_ref()
    }

    /// Consume the instance, keeping its result
    pub fn into_result(self) -> Option<TestResult> {
        self.result
    }

    /// Check that every required input role is bound.
    ///
    /// Fails with [`TestError::MissingRequiredInput`] naming the first unmet
    /// role. No implementation code runs here.
    pub fn validate(&mut self) -> Result<()> {
        if self.state >= LifecycleState::Validated {
            return Ok(());
        }
        for role in self.test.required_inputs() {
            if !self.inputs.contains(&role) {
                return Err(TestError::MissingRequiredInput {
                    test_id: self.test_id.to_string(),
                    role,
                });
            }
        }
        self.state = LifecycleState::Validated;
        Ok(())
    }

    /// Validate, invoke the implementation once and attach the result.
    ///
    /// Implementation errors come back unchanged inside [`TestError::Run`].
    pub fn run(&mut self) -> Result<&TestResult> {
        if self.state >= LifecycleState::Run {
            return Err(TestError::AlreadyRun {
                test_id: self.test_id.to_string(),
            });
        }
        self.validate()?;

        self.inputs.reset_access();
        self.state = LifecycleState::Run;
        debug!(test_id = %self.test_id, "Running test");

        let output = self
            .test
            .run(&self.inputs, &self.params)
            .map_err(TestError::Run)?;
        self.cache_results(output)?;

        self.result.as_ref().ok_or_else(|| TestError::NotRun {
            test_id: self.test_id.to_string(),
        })
    }

    /// Summarize raw output and attach it as this instance's only result.
    ///
    /// Requires a completed run with no result yet, and an output carrying a
    /// value or at least one figure.
    pub fn cache_results(&mut self, output: RawOutput) -> Result<()> {
        if self.state < LifecycleState::Run {
            return Err(TestError::NotRun {
                test_id: self.test_id.to_string(),
            });
        }
        if self.result.is_some() {
            return Err(TestError::AlreadyRun {
                test_id: self.test_id.to_string(),
            });
        }
        if output.is_empty() {
            return Err(TestError::EmptyResult {
                test_id: self.test_id.to_string(),
            });
        }

        let RawOutput {
            value,
            mut figures,
            passed,
        } = output;

        let tables = value
            .as_ref()
            .map(|v| self.test.summarize(v))
            .unwrap_or_default();

        // Figure keys must be stable and unique within the result
        let mut seen: Vec<String> = Vec::with_capacity(figures.len());
        for (index, figure) in figures.iter_mut().enumerate() {
            if figure.key.is_empty() {
                figure.key = format!("{}:figure_{}", self.test_id, index);
            }
            if seen.contains(&figure.key) {
                figure.key = format!("{}_{}", figure.key, index);
            }
            seen.push(figure.key.clone());
        }

        let meta = self.test.metadata();
        let mut metadata = Record::new();
        metadata.insert(
            CREATED_AT_KEY.to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        if let Some(template) = &self.output_template {
            metadata.insert(OUTPUT_TEMPLATE_KEY.to_string(), Value::String(template.clone()));
        }

        let result = TestResult::from_parts(ResultParts {
            result_id: self.test_id.clone(),
            name: meta.name,
            description: meta.description,
            kind: if passed.is_some() {
                ResultKind::Threshold
            } else {
                ResultKind::Metric
            },
            tables,
            figures,
            passed,
            inputs: self.provenance(),
            params: self.params.clone(),
            metadata,
        });

        self.result = Some(result);
        self.state = LifecycleState::Summarized;
        Ok(())
    }

    /// Render the result with `render`, e.g. a text formatter
    pub fn render_with<F>(&mut self, render: F) -> Result<String>
    where
        F: FnOnce(&TestResult) -> String,
    {
        let result = self.result.as_ref().ok_or_else(|| TestError::NotRun {
            test_id: self.test_id.to_string(),
        })?;
        let text = render(result);
        if self.state < LifecycleState::Rendered {
            self.state = LifecycleState::Rendered;
        }
        Ok(text)
    }

    /// Ship the result with `log`, e.g. a sink
    pub fn log_with<F, E>(&mut self, log: F) -> std::result::Result<(), E>
    where
        F: FnOnce(&TestResult) -> std::result::Result<(), E>,
        E: From<TestError>,
    {
        let result = self.result.as_ref().ok_or_else(|| TestError::NotRun {
            test_id: self.test_id.to_string(),
        })?;
        log(result)?;
        self.state = LifecycleState::Logged;
        Ok(())
    }

    /// Roles read during the run; falls back to the bound required roles when
    /// the implementation read inputs without going through the tracker.
    fn provenance(&self) -> Vec<InputRef> {
        let mut roles = self.inputs.accessed();
        if roles.is_empty() {
            roles = self
                .test
                .required_inputs()
                .into_iter()
                .filter(|r| self.inputs.contains(r))
                .collect();
        }
        roles
            .into_iter()
            .filter_map(|role| {
                let value = self.inputs.peek(&role)?;
                Some(InputRef {
                    input_ids: value.ids(),
                    role,
                })
            })
            .collect()
    }
}

impl fmt::Debug for TestInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestInstance")
            .field("test_id", &self.test_id)
            .field("state", &self.state)
            .field("params", &self.params)
            .field("has_result", &self.result.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implementation::FunctionTest;
    use crate::inputs::{Dataset, Model};
    use crate::output::Figure;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn row_count() -> SharedTest {
        FunctionTest::new("RowCount", &["dataset"], |inputs, params| {
            let scale: f64 = params.get("scale")?;
            Ok(RawOutput::scalar(inputs.dataset("dataset")?.len() as f64 * scale))
        })
        .with_params(Params::new().with("scale", 1.0))
        .shared()
    }

    fn id() -> TestId {
        TestId::parse("ns.checks.RowCount").unwrap()
    }

    fn dataset() -> Dataset {
        Dataset::new("train", vec![Record::new(), Record::new()])
    }

    #[test]
    fn test_missing_input_fails_before_user_code() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let test = FunctionTest::new("Probe", &["dataset", "model"], move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(RawOutput::scalar(0.0))
        })
        .shared();

        let mut instance = TestInstance::new(
            id(),
            test,
            BoundInputs::new().with("dataset", dataset()),
            Params::new(),
        );
        match instance.run() {
            Err(TestError::MissingRequiredInput { role, .. }) => assert_eq!(role, "model"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_runs_once() {
        let mut instance = TestInstance::new(
            id(),
            row_count(),
            BoundInputs::new().with("dataset", dataset()),
            Params::new().with("scale", 2.0),
        );
        let result = instance.run().unwrap();
        assert_eq!(result.tables()[0].records[0]["value"], json!(4.0));
        assert_eq!(result.kind(), ResultKind::Metric);
        assert_eq!(result.inputs()[0].input_ids, vec!["train"]);
        assert_eq!(instance.state(), LifecycleState::Summarized);

        assert!(matches!(instance.run(), Err(TestError::AlreadyRun { .. })));
    }

    #[test]
    fn test_failed_run_is_terminal() {
        let test = FunctionTest::new("Boom", &[], |_, _| anyhow::bail!("boom")).shared();
        let mut instance = TestInstance::new(id(), test, BoundInputs::new(), Params::new());

        let err = instance.run().unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(instance.result().is_none());
        assert!(matches!(instance.run(), Err(TestError::AlreadyRun { .. })));
    }

    #[test]
    fn test_empty_output_rejected() {
        let test = FunctionTest::new("Nothing", &[], |_, _| Ok(RawOutput::new())).shared();
        let mut instance = TestInstance::new(id(), test, BoundInputs::new(), Params::new());
        assert!(matches!(instance.run(), Err(TestError::EmptyResult { .. })));
    }

    #[test]
    fn test_figure_only_output_and_keys() {
        let test = FunctionTest::new("Plots", &[], |_, _| {
            Ok(RawOutput::new()
                .figure(Figure::new("", json!([1])))
                .figure(Figure::new("hist", json!([2])))
                .figure(Figure::new("hist", json!([3]))))
        })
        .shared();
        let mut instance = TestInstance::new(id(), test, BoundInputs::new(), Params::new());
        let result = instance.run().unwrap();

        let keys: Vec<_> = result.figures().iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["ns.checks.RowCount:figure_0", "hist", "hist_2"]);
        assert!(result.tables().is_empty());
    }

    #[test]
    fn test_threshold_kind_and_template() {
        let test = FunctionTest::new("Check", &["model"], |inputs, _| {
            inputs.model("model")?;
            Ok(RawOutput::records(vec![]).with_passed(true))
        })
        .shared();
        let mut instance = TestInstance::new(
            id(),
            test,
            BoundInputs::new().with("model", Model::new("clf", "sklearn")),
            Params::new(),
        )
        .with_output_template(Some("<b>{{ value }}</b>".to_string()));

        let result = instance.run().unwrap();
        assert_eq!(result.kind(), ResultKind::Threshold);
        assert_eq!(result.passed(), Some(true));
        assert_eq!(result.metadata_str(OUTPUT_TEMPLATE_KEY), Some("<b>{{ value }}</b>"));
    }

    #[test]
    fn test_render_and_log_require_result() {
        let mut instance = TestInstance::new(
            id(),
            row_count(),
            BoundInputs::new().with("dataset", dataset()),
            Params::new(),
        );
        assert!(matches!(
            instance.render_with(|r| r.name().to_string()),
            Err(TestError::NotRun { .. })
        ));

        instance.run().unwrap();
        assert_eq!(instance.render_with(|r| r.name().to_string()).unwrap(), "RowCount");
        assert_eq!(instance.state(), LifecycleState::Rendered);

        let mut shipped = Vec::new();
        instance
            .log_with(|r| {
                shipped.push(r.to_payload().id);
                Ok::<_, TestError>(())
            })
            .unwrap();
        assert_eq!(shipped, vec!["ns.checks.RowCount"]);
        assert_eq!(instance.state(), LifecycleState::Logged);
    }

    #[test]
    fn test_unknown_params_pass_through() {
        let instance = TestInstance::new(
            id(),
            row_count(),
            BoundInputs::new(),
            Params::new().with("undeclared", true),
        );
        assert_eq!(instance.params().keys().collect::<Vec<_>>(), vec!["scale", "undeclared"]);
    }
}
