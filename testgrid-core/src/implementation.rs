//! Test Implementations
//!
//! Everything the loader can hand back implements [`TestImpl`]. Plain
//! functions go through [`FunctionTest`], the functional adapter, so the
//! lifecycle only ever sees one trait.

use crate::TestDef;
use crate::identifier::leaf_name;
use crate::inputs::BoundInputs;
use crate::output::{RawOutput, ResultTable, summarize_value};
use crate::params::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Descriptive metadata of a test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetadata {
    /// Display name
    pub name: String,
    /// Longer description
    pub description: String,
    /// Task types the test applies to (`classification`, `regression`, ...)
    pub tasks: Vec<String>,
    /// Free tags (`tabular_data`, `sklearn`, ...)
    pub tags: Vec<String>,
}

/// Executable test behavior
pub trait TestImpl: Send + Sync {
    /// Name, description, tasks and tags
    fn metadata(&self) -> TestMetadata;

    /// Input roles that must be bound before running
    fn required_inputs(&self) -> Vec<String>;

    /// Declared parameters and their defaults
    fn default_params(&self) -> Params {
        Params::new()
    }

    /// Execute against bound inputs and effective params
    fn run(&self, inputs: &BoundInputs, params: &Params) -> anyhow::Result<RawOutput>;

    /// Turn the run value into ordered tables. Must be deterministic.
    fn summarize(&self, value: &Value) -> Vec<ResultTable> {
        summarize_value(value)
    }
}

/// Shared, immutable handle to an implementation
pub type SharedTest = Arc<dyn TestImpl>;

/// Boxed test function
pub type TestFn = Arc<dyn Fn(&BoundInputs, &Params) -> anyhow::Result<RawOutput> + Send + Sync>;

/// Adapter exposing a plain function as a [`TestImpl`]
#[derive(Clone)]
pub struct FunctionTest {
    metadata: TestMetadata,
    required_inputs: Vec<String>,
    default_params: Params,
    func: TestFn,
}

impl FunctionTest {
    /// Wrap `func` under `name`
    pub fn new<F>(name: impl Into<String>, required_inputs: &[&str], func: F) -> Self
    where
        F: Fn(&BoundInputs, &Params) -> anyhow::Result<RawOutput> + Send + Sync + 'static,
    {
        Self {
            metadata: TestMetadata {
                name: name.into(),
                ..TestMetadata::default()
            },
            required_inputs: required_inputs.iter().map(|s| s.to_string()).collect(),
            default_params: Params::new(),
            func: Arc::new(func),
        }
    }

    /// Wrap an already boxed function
    pub fn from_fn(name: impl Into<String>, required_inputs: Vec<String>, default_params: Params, func: TestFn) -> Self {
        Self {
            metadata: TestMetadata {
                name: name.into(),
                ..TestMetadata::default()
            },
            required_inputs,
            default_params,
            func,
        }
    }

    /// Adapter for a link-time registered test
    pub fn from_def(def: &'static TestDef) -> Self {
        Self {
            metadata: TestMetadata {
                name: def.name.to_string(),
                description: def.description.to_string(),
                tasks: def.tasks.iter().map(|s| s.to_string()).collect(),
                tags: def.tags.iter().map(|s| s.to_string()).collect(),
            },
            required_inputs: def.required_inputs.iter().map(|s| s.to_string()).collect(),
            default_params: (def.default_params)(),
            func: Arc::new(def.run_fn),
        }
    }

    /// Builder-style description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = description.into();
        self
    }

    /// Builder-style defaults
    pub fn with_params(mut self, params: Params) -> Self {
        self.default_params = params;
        self
    }

    /// Builder-style task list
    pub fn with_tasks(mut self, tasks: &[&str]) -> Self {
        self.metadata.tasks = tasks.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Builder-style tag list
    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.metadata.tags = tags.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Share as a trait object
    pub fn shared(self) -> SharedTest {
        Arc::new(self)
    }
}

impl fmt::Debug for FunctionTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionTest")
            .field("metadata", &self.metadata)
            .field("required_inputs", &self.required_inputs)
            .field("default_params", &self.default_params)
            .finish_non_exhaustive()
    }
}

impl TestImpl for FunctionTest {
    fn metadata(&self) -> TestMetadata {
        self.metadata.clone()
    }

    fn required_inputs(&self) -> Vec<String> {
        self.required_inputs.clone()
    }

    fn default_params(&self) -> Params {
        self.default_params.clone()
    }

    fn run(&self, inputs: &BoundInputs, params: &Params) -> anyhow::Result<RawOutput> {
        (self.func)(inputs, params)
    }
}

/// What a resolver tier or provider hands back
pub enum Resolved {
    /// A full implementation
    Implementation(SharedTest),
    /// A bare function; wrapped by [`FunctionTest`] on the way out
    Function {
        /// Declared input roles
        required_inputs: Vec<String>,
        /// Declared parameters
        default_params: Params,
        /// The function itself
        func: TestFn,
    },
}

impl Resolved {
    /// Produce an implementation, adapting bare functions under the id's leaf name
    pub fn into_test(self, raw_id: &str) -> SharedTest {
        match self {
            Resolved::Implementation(test) => test,
            Resolved::Function {
                required_inputs,
                default_params,
                func,
            } => FunctionTest::from_fn(leaf_name(raw_id), required_inputs, default_params, func).shared(),
        }
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::Implementation(test) => f
                .debug_tuple("Implementation")
                .field(&test.metadata().name)
                .finish(),
            Resolved::Function { required_inputs, .. } => f
                .debug_struct("Function")
                .field("required_inputs", required_inputs)
                .finish_non_exhaustive(),
        }
    }
}

impl From<SharedTest> for Resolved {
    fn from(test: SharedTest) -> Self {
        Resolved::Implementation(test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::Dataset;

    #[test]
    fn test_function_adapter_runs_closure() {
        let test = FunctionTest::new("RowCount", &["dataset"], |inputs, _params| {
            Ok(RawOutput::scalar(inputs.dataset("dataset")?.len() as f64))
        })
        .with_tags(&["tabular_data"]);

        let inputs = BoundInputs::new().with("dataset", Dataset::new("d", vec![Default::default()]));
        let out = test.run(&inputs, &Params::new()).unwrap();
        assert_eq!(out.as_scalar(), Some(1.0));
        assert_eq!(test.required_inputs(), vec!["dataset"]);
        assert_eq!(test.metadata().tags, vec!["tabular_data"]);
    }

    #[test]
    fn test_resolved_function_takes_leaf_name() {
        let resolved = Resolved::Function {
            required_inputs: vec![],
            default_params: Params::new().with("k", 1),
            func: Arc::new(|_, _| Ok(RawOutput::scalar(1.0))),
        };
        let test = resolved.into_test("acme.checks.Constant:v1");
        assert_eq!(test.metadata().name, "Constant");
        assert_eq!(test.default_params().get::<i64>("k").unwrap(), 1);
    }
}
