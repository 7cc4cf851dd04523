//! Test Executor
//!
//! Runs tests through their lifecycle and folds comparison runs together.
//! Computation is single-threaded; configurations run strictly in plan order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! RunRequest / ComparisonRequest
//!       │
//!       ▼
//! ┌─────────────┐
//! │  execution  │  Load, bind, validate, run once (optionally memoized)
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │ comparison  │  Expand grids, run the plan in order
//! └──────┬──────┘
//!        │
//!        ▼
//! ┌─────────────┐
//! │    merge    │  Leading grid columns, run-scoped figures
//! └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`execution`] - `Engine` and single runs
//! - [`comparison`] - Grids, run plan and comparison runs
//! - [`merge`] - Combining per-configuration results
//! - [`suite`] - Fail-soft batch runs
//! - [`cache`] - Optional run memoization

mod cache;
mod comparison;
mod execution;
mod merge;
mod suite;

// Re-export public API
pub use cache::RunCache;
pub use comparison::{
    ComparisonRequest, Grid, InputGrid, ParamGrid, RunConfiguration, plan,
};
pub use execution::{Engine, RunRequest};
pub use merge::{COMPARISON_RUNS_KEY, merge_results};
pub use suite::{SuiteOutcome, SuiteReport, SuiteStatus};
