#![warn(missing_docs)]
//! TestGrid Core - Test Model
//!
//! This crate provides the vocabulary every other TestGrid crate speaks:
//! - `TestId` namespaced identifiers with result suffixes
//! - `TestImpl` trait plus the `FunctionTest` adapter for plain functions
//! - `TestInstance` lifecycle (validate, run once, summarize, render, log)
//! - `TestResult` tables + figures + metadata and its boundary payload
//! - `TestDef` link-time manifest entries collected with `inventory`

mod error;
mod identifier;
mod implementation;
mod inputs;
mod lifecycle;
mod output;
mod params;
mod result;

pub use error::{BoxedCause, Result, TestError};
pub use identifier::{BUILTIN_NAMESPACE, COMPOSITE_PREFIX, TestId, leaf_name, split_suffix};
pub use implementation::{FunctionTest, Resolved, SharedTest, TestFn, TestImpl, TestMetadata};
pub use inputs::{BoundInputs, Dataset, InputObject, InputRegistry, InputValue, Model, Record};
pub use lifecycle::{CREATED_AT_KEY, LifecycleState, OUTPUT_TEMPLATE_KEY, TestInstance};
pub use output::{Figure, IntoOutput, RawOutput, ResultTable, summarize_value};
pub use params::Params;
pub use result::{FigurePayload, InputRef, ResultKind, ResultParts, ResultPayload, TestResult};

/// Built-in test registered via `#[register_test]`
#[derive(Debug, Clone)]
pub struct TestDef {
    /// Full identifier (`validmind.data_validation.ClassImbalance`)
    pub id: &'static str,
    /// Human-readable name
    pub name: &'static str,
    /// Description, taken from doc comments when not given explicitly
    pub description: &'static str,
    /// Task types
    pub tasks: &'static [&'static str],
    /// Tags for filtering
    pub tags: &'static [&'static str],
    /// Input roles inferred from the function signature
    pub required_inputs: &'static [&'static str],
    /// Builds the declared parameter defaults
    pub default_params: fn() -> Params,
    /// Function pointer to the generated wrapper
    pub run_fn: fn(&BoundInputs, &Params) -> anyhow::Result<RawOutput>,
    /// Source file path
    pub file: &'static str,
    /// Source line number
    pub line: u32,
    /// Module path
    pub module_path: &'static str,
}

// Collect all registered tests
inventory::collect!(TestDef);

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || {
    for _ in inventory::iter::<TestDef> {}
};

/// All link-time registered tests, in no particular order
pub fn builtin_tests() -> impl Iterator<Item = &'static TestDef> {
    inventory::iter::<TestDef>.into_iter()
}

/// Manifest lookup by full identifier (suffix ignored)
pub fn find_builtin(id: &str) -> Option<&'static TestDef> {
    let (base, _) = split_suffix(id);
    builtin_tests().find(|def| def.id == base)
}
