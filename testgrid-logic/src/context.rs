//! Metric Context
//!
//! Provides variable bindings for expression evaluation. Bindings come from
//! a dataset profile and from the numeric parameters of a run.

use evalexpr::{
    ContextWithMutableVariables, EvalexprError, HashMapContext, Value, eval_with_context,
};
use fxhash::FxHashMap;
use regex::Regex;
use std::sync::OnceLock;
use testgrid_core::{Dataset, Params};
use thiserror::Error;

/// Errors from expression evaluation
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Unknown variable(s) {unknown:?} in '{expression}'. Available: {available:?}")]
    UnknownVariables {
        expression: String,
        unknown: Vec<String>,
        available: Vec<String>,
    },

    #[error("Evaluation error: {0}")]
    EvalError(String),
}

/// Context holding named numbers for expression evaluation
#[derive(Debug, Clone, Default)]
pub struct MetricContext {
    metrics: FxHashMap<String, f64>,
}

impl MetricContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Profile of a dataset:
    /// `row_count`, `column_count` and, per column,
    /// `<col>_missing` plus `<col>_mean|min|max` for numeric columns.
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let mut ctx = Self::new();
        ctx.set("row_count", dataset.len() as f64);
        ctx.set("column_count", dataset.columns().len() as f64);

        for column in dataset.columns() {
            let var = variable_name(column);
            ctx.set(format!("{}_missing", var), dataset.missing_count(column) as f64);
        }

        for column in dataset.numeric_columns() {
            let var = variable_name(column);
            let values = dataset.numeric_column(column);
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            ctx.set(format!("{}_mean", var), mean);
            ctx.set(format!("{}_min", var), min);
            ctx.set(format!("{}_max", var), max);
        }
        ctx
    }

    /// Add every numeric (or boolean) parameter as a variable
    pub fn with_params(mut self, params: &Params) -> Self {
        for (name, value) in params.iter() {
            let number = match value {
                serde_json::Value::Number(n) => n.as_f64(),
                serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            };
            if let Some(number) = number {
                self.set(variable_name(name), number);
            }
        }
        self
    }

    /// Add a metric value
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.metrics.insert(name.into(), value);
    }

    /// Get a metric value
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Whether a variable is bound
    pub fn has(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    /// Variables referenced by `expression` that this context does not bind
    pub fn unknown_variables(&self, expression: &str) -> Vec<String> {
        let mut unknown: Vec<String> = Vec::new();
        for var in extract_variables(expression) {
            if !self.has(&var) && !unknown.contains(&var) {
                unknown.push(var);
            }
        }
        unknown
    }

    /// Evaluate an expression in this context
    pub fn evaluate(&self, expression: &str) -> Result<f64, ContextError> {
        let unknown = self.unknown_variables(expression);
        if !unknown.is_empty() {
            let mut available: Vec<String> = self.metric_names().cloned().collect();
            available.sort();
            return Err(ContextError::UnknownVariables {
                expression: expression.to_string(),
                unknown,
                available,
            });
        }

        let mut ctx = HashMapContext::new();
        for (name, value) in &self.metrics {
            ctx.set_value(name.clone(), Value::Float(*value))
                .map_err(|e: EvalexprError| ContextError::EvalError(e.to_string()))?;
        }

        let result = eval_with_context(expression, &ctx)
            .map_err(|e| ContextError::EvalError(e.to_string()))?;

        match result {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            Value::Boolean(b) => Ok(if b { 1.0 } else { 0.0 }),
            other => Err(ContextError::EvalError(format!(
                "Expected numeric result, got {:?}",
                other
            ))),
        }
    }

    /// List all metric names
    pub fn metric_names(&self) -> impl Iterator<Item = &String> {
        self.metrics.keys()
    }
}

/// Column or parameter name as an expression variable (non-word chars become `_`)
pub fn variable_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Extract variable names from an evalexpr expression
///
/// Namespaced paths (`math::ln`, `str::len`) and identifiers followed by an
/// argument list are function names, not variables.
fn extract_variables(expression: &str) -> Vec<String> {
    static IDENT_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: this regex literal is guaranteed to compile
    let re = IDENT_RE.get_or_init(|| {
        Regex::new(r"\b([a-zA-Z_][a-zA-Z0-9_]*(?:::[a-zA-Z_][a-zA-Z0-9_]*)*)(\s*\()?").unwrap()
    });

    // String literals never name variables
    let stripped = strip_string_literals(expression);
    re.captures_iter(&stripped)
        .filter(|c| c.get(2).is_none())
        .map(|c| c[1].to_string())
        .filter(|s| !s.contains("::") && !is_reserved(s))
        .collect()
}

fn strip_string_literals(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut in_string = false;
    for c in expression.chars() {
        if c == '"' {
            in_string = !in_string;
            out.push(' ');
        } else if !in_string {
            out.push(c);
        }
    }
    out
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "min" | "max" | "abs" | "floor" | "ceil" | "round" | "sqrt" | "if" | "len" | "str"
            | "math" | "contains" | "contains_any" | "typeof" | "random" | "bitand" | "bitor"
            | "bitxor" | "bitnot" | "shl" | "shr" | "true" | "false"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_evaluation() {
        let mut ctx = MetricContext::new();
        ctx.set("x", 10.0);
        ctx.set("y", 5.0);

        let result = ctx.evaluate("x + y").unwrap();
        assert!((result - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_comparison() {
        let mut ctx = MetricContext::new();
        ctx.set("missing_ratio", 0.02);
        ctx.set("threshold", 0.05);

        let result = ctx.evaluate("missing_ratio < threshold").unwrap();
        assert!((result - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_dataset_profile() {
        let records = serde_json::from_value(json!([
            {"age": 20, "income ($)": 100, "city": "a"},
            {"age": 40, "income ($)": null, "city": "b"},
        ]))
        .unwrap();
        let ds = Dataset::new("d", records);
        let ctx = MetricContext::from_dataset(&ds);

        assert_eq!(ctx.get("row_count"), Some(2.0));
        assert_eq!(ctx.get("column_count"), Some(3.0));
        assert_eq!(ctx.get("age_mean"), Some(30.0));
        assert_eq!(ctx.get("age_max"), Some(40.0));
        assert_eq!(ctx.get("income_____missing"), Some(1.0));
        assert_eq!(ctx.get("city_missing"), Some(0.0));
        assert!(!ctx.has("city_mean"));
    }

    #[test]
    fn test_params_become_variables() {
        let params = Params::new().with("min_rows", 10).with("label", "x").with("strict", true);
        let ctx = MetricContext::new().with_params(&params);
        assert_eq!(ctx.get("min_rows"), Some(10.0));
        assert_eq!(ctx.get("strict"), Some(1.0));
        assert!(!ctx.has("label"));
    }

    #[test]
    fn test_unknown_variables_listed() {
        let mut ctx = MetricContext::new();
        ctx.set("row_count", 3.0);

        let err = ctx.evaluate("row_cont > 1 && max(row_count, 2) > 1").unwrap_err();
        match err {
            ContextError::UnknownVariables { unknown, available, .. } => {
                assert_eq!(unknown, vec!["row_cont"]);
                assert_eq!(available, vec!["row_count"]);
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn test_builtin_functions_are_not_variables() {
        let mut ctx = MetricContext::new();
        ctx.set("x", std::f64::consts::E);
        ctx.set("mean", 2.0);

        assert!(ctx.unknown_variables("math::ln(x) + len(str::trim(\" ab \"))").is_empty());
        assert!(ctx.unknown_variables("typeof(mean) == \"float\"").is_empty());
        assert!(ctx.unknown_variables("contains((1.0, 2.0), mean)").is_empty());
        assert_eq!(ctx.unknown_variables("math::ln(y)"), vec!["y"]);

        assert_eq!(ctx.evaluate("math::ln(x) > 0.99").unwrap(), 1.0);
        assert_eq!(ctx.evaluate("contains((1.0, 2.0), mean)").unwrap(), 1.0);
        assert_eq!(ctx.evaluate("typeof(mean) == \"float\"").unwrap(), 1.0);
    }
}
