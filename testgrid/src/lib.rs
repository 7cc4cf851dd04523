#![warn(missing_docs)]
//! # TestGrid
//!
//! Registry and execution engine for named, versioned model-validation tests.
//!
//! TestGrid resolves hierarchical identifiers to test implementations and
//! runs them through a uniform lifecycle:
//! - **Identifiers**: `namespace.path.Leaf[:suffix]`, where the suffix names a result
//! - **Layered Resolution**: custom registrations, composite metrics, the built-in catalog, namespace providers
//! - **Lifecycle**: bind inputs and params, validate, run once, summarize into tables and figures
//! - **Composite Metrics**: combine unit metrics into one record, persisted by name
//! - **Comparison Runs**: expand input/param grids and merge every run into one result
//! - **Declarative Tests**: `evalexpr` checks and metrics in TOML files, served by a local provider
//!
//! ## Quick Start
//!
//! ```ignore
//! use testgrid::prelude::*;
//!
//! /// Fraction of rows with a missing target
//! #[register_test(id = "my_tests.data.MissingTarget", tags = "tabular_data")]
//! fn missing_target(dataset: &Dataset) -> anyhow::Result<f64> {
//!     let target = dataset.target_column().unwrap_or("target");
//!     Ok(dataset.missing_count(target) as f64 / dataset.len().max(1) as f64)
//! }
//!
//! let mut engine = Engine::default();
//! let result = engine.run(
//!     RunRequest::new("my_tests.data.MissingTarget:train").input("dataset", train),
//! )?;
//! ```
//!
//! ## Comparisons
//!
//! ```ignore
//! let result = engine.run_comparison(
//!     ComparisonRequest::new("validmind.data_validation.ClassImbalance")
//!         .input_grid(Grid::product().axis("dataset", [train, test])),
//! )?;
//! ```

extern crate self as testgrid;

pub mod catalog;

// Re-export core types
pub use testgrid_core::{
    BUILTIN_NAMESPACE, BoundInputs, COMPOSITE_PREFIX, Dataset, Figure, FunctionTest, InputObject,
    InputRef, InputRegistry, InputValue, IntoOutput, LifecycleState, Model, Params, RawOutput,
    Record, Resolved, ResultKind, ResultPayload, ResultTable, SharedTest, TestDef, TestError,
    TestId, TestImpl, TestInstance, TestMetadata, TestResult, builtin_tests, find_builtin,
};

// Re-export macros
pub use testgrid_macros::register_test;

// Re-export logic types
pub use testgrid_logic::{
    CompositeDefinition, CompositeTest, DeclarativeTest, FileMetadataStore, InMemoryMetadataStore,
    MetadataStore, MetricContext,
};

// Re-export report types
pub use testgrid_report::{
    JsonDirSink, MemorySink, OutputFormat, ResultSink, SinkError, format_result, log_all,
    log_async, log_instance,
};

// Re-export engine types
pub use testgrid_engine::{
    COMPARISON_RUNS_KEY, ComparisonRequest, Engine, Grid, GridConfig, InputGrid, ListFilter,
    LocalTestProvider, ParamGrid, ProviderRegistry, ResolverKind, RunConfiguration, RunRequest,
    SuiteOutcome, SuiteReport, SuiteStatus, TestDescriptor, TestLoader, TestProvider, TestStore,
};

/// Internal re-exports for macro use
#[doc(hidden)]
pub mod internal {
    pub use anyhow;
    pub use inventory;
    pub use serde_json;
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BoundInputs, ComparisonRequest, Dataset, Engine, Figure, Grid, Model, Params, RawOutput,
        Record, RunRequest, TestResult, register_test,
    };
}

/// Run the TestGrid CLI.
///
/// Call this from a binary's `main()`:
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     testgrid::run()
/// }
/// ```
pub use testgrid_engine::run;
