//! Declarative Tests
//!
//! Tests written as TOML instead of code. Checks become one verdict row
//! each; metrics become one record.
//!
//! ```toml
//! name = "Minimum Rows"
//! description = "Dataset is large enough to train on"
//! tasks = ["classification"]
//! tags = ["tabular_data"]
//! required_inputs = ["dataset"]
//!
//! [params]
//! min_rows = 100
//!
//! [[checks]]
//! name = "enough_rows"
//! expr = "row_count >= min_rows"
//!
//! [[metrics]]
//! name = "mean_age"
//! expr = "age_mean"
//! ```

use crate::context::MetricContext;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use testgrid_core::{BoundInputs, Params, RawOutput, Record, TestImpl, TestMetadata};
use thiserror::Error;

/// Errors reading declarative tests or persisted definitions
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid definition: {0}")]
    Invalid(String),
}

/// A named boolean expression
#[derive(Debug, Clone, Deserialize)]
pub struct CheckDef {
    /// Row label
    pub name: String,
    /// Expression, truthy when the check passes
    pub expr: String,
}

/// A named numeric expression
#[derive(Debug, Clone, Deserialize)]
pub struct MetricDef {
    /// Record key
    pub name: String,
    /// Expression
    pub expr: String,
}

fn default_required_inputs() -> Vec<String> {
    vec!["dataset".to_string()]
}

fn default_profile_role() -> String {
    "dataset".to_string()
}

/// Parsed declarative test file
#[derive(Debug, Clone, Deserialize)]
pub struct DeclarativeDef {
    /// Display name (defaults to the file stem)
    #[serde(default)]
    pub name: Option<String>,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Task types
    #[serde(default)]
    pub tasks: Vec<String>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Required input roles
    #[serde(default = "default_required_inputs")]
    pub required_inputs: Vec<String>,
    /// Role whose dataset is profiled into the expression context
    #[serde(default = "default_profile_role")]
    pub profile: String,
    /// Parameter defaults
    #[serde(default)]
    pub params: toml::Table,
    /// Threshold checks
    #[serde(default)]
    pub checks: Vec<CheckDef>,
    /// Named metrics
    #[serde(default)]
    pub metrics: Vec<MetricDef>,
}

/// Test implementation backed by a [`DeclarativeDef`]
#[derive(Debug, Clone)]
pub struct DeclarativeTest {
    name: String,
    def: DeclarativeDef,
    defaults: Params,
}

impl DeclarativeTest {
    /// Parse a definition; `fallback_name` is used when the file sets no name
    pub fn from_toml_str(content: &str, fallback_name: &str) -> Result<Self, DefinitionError> {
        let def: DeclarativeDef = toml::from_str(content).map_err(|e| DefinitionError::Toml {
            path: PathBuf::from(fallback_name),
            source: e,
        })?;
        Self::from_def(def, fallback_name)
    }

    /// Load a definition file; the file stem is the fallback name
    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path).map_err(|e| DefinitionError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let def: DeclarativeDef = toml::from_str(&content).map_err(|e| DefinitionError::Toml {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_def(def, stem)
    }

    fn from_def(def: DeclarativeDef, fallback_name: &str) -> Result<Self, DefinitionError> {
        if def.checks.is_empty() && def.metrics.is_empty() {
            return Err(DefinitionError::Invalid(format!(
                "'{}' declares no checks and no metrics",
                fallback_name
            )));
        }
        let defaults: Params = def
            .params
            .iter()
            .map(|(k, v)| Ok((k.clone(), serde_json::to_value(v)?)))
            .collect::<Result<_, serde_json::Error>>()?;

        Ok(Self {
            name: def.name.clone().unwrap_or_else(|| fallback_name.to_string()),
            def,
            defaults,
        })
    }

    /// Underlying definition
    pub fn definition(&self) -> &DeclarativeDef {
        &self.def
    }

    fn context(&self, inputs: &BoundInputs, params: &Params) -> anyhow::Result<MetricContext> {
        let base = if inputs.contains(&self.def.profile) {
            MetricContext::from_dataset(inputs.dataset(&self.def.profile)?)
        } else {
            MetricContext::new()
        };
        Ok(base.with_params(params))
    }
}

impl TestImpl for DeclarativeTest {
    fn metadata(&self) -> TestMetadata {
        TestMetadata {
            name: self.name.clone(),
            description: self.def.description.clone(),
            tasks: self.def.tasks.clone(),
            tags: self.def.tags.clone(),
        }
    }

    fn required_inputs(&self) -> Vec<String> {
        self.def.required_inputs.clone()
    }

    fn default_params(&self) -> Params {
        self.defaults.clone()
    }

    fn run(&self, inputs: &BoundInputs, params: &Params) -> anyhow::Result<RawOutput> {
        let ctx = self.context(inputs, params)?;

        let mut check_rows: Vec<Record> = Vec::with_capacity(self.def.checks.len());
        let mut all_passed = true;
        for check in &self.def.checks {
            let value = ctx.evaluate(&check.expr)?;
            let passed = value != 0.0;
            all_passed &= passed;

            let mut row = Record::new();
            row.insert("Check".to_string(), Value::from(check.name.clone()));
            row.insert("Expression".to_string(), Value::from(check.expr.clone()));
            row.insert("Passed".to_string(), Value::Bool(passed));
            check_rows.push(row);
        }

        let mut metric_row = Record::new();
        for metric in &self.def.metrics {
            metric_row.insert(metric.name.clone(), Value::from(ctx.evaluate(&metric.expr)?));
        }

        let output = match (check_rows.is_empty(), metric_row.is_empty()) {
            (false, true) => RawOutput::records(check_rows),
            (true, false) => RawOutput::value(Value::Object(metric_row)),
            _ => RawOutput::new()
                .table("Checks", check_rows)
                .table("Metrics", vec![metric_row]),
        };

        Ok(if self.def.checks.is_empty() {
            output
        } else {
            output.with_passed(all_passed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use testgrid_core::{Dataset, summarize_value};

    const MIN_ROWS: &str = r#"
        description = "Dataset is large enough"
        tags = ["tabular_data"]

        [params]
        min_rows = 3

        [[checks]]
        name = "enough_rows"
        expr = "row_count >= min_rows"

        [[checks]]
        name = "few_missing"
        expr = "x_missing < 1"
    "#;

    fn dataset() -> Dataset {
        let records = serde_json::from_value(json!([{"x": 1}, {"x": 3}, {"x": null}])).unwrap();
        Dataset::new("d", records)
    }

    #[test]
    fn test_checks_produce_verdict_rows() {
        let test = DeclarativeTest::from_toml_str(MIN_ROWS, "MinRows").unwrap();
        assert_eq!(test.metadata().name, "MinRows");
        assert_eq!(test.required_inputs(), vec!["dataset"]);

        let inputs = BoundInputs::new().with("dataset", dataset());
        let out = test.run(&inputs, &test.default_params()).unwrap();
        assert_eq!(out.passed, Some(false));

        let tables = summarize_value(out.value.as_ref().unwrap());
        assert_eq!(tables[0].records.len(), 2);
        assert_eq!(tables[0].records[0]["Passed"], json!(true));
        assert_eq!(tables[0].records[1]["Passed"], json!(false));
    }

    #[test]
    fn test_params_override_thresholds() {
        let test = DeclarativeTest::from_toml_str(MIN_ROWS, "MinRows").unwrap();
        let inputs = BoundInputs::new().with("dataset", dataset());
        let params = Params::merged(&test.default_params(), &Params::new().with("min_rows", 10));
        let out = test.run(&inputs, &params).unwrap();
        let tables = summarize_value(out.value.as_ref().unwrap());
        assert_eq!(tables[0].records[0]["Passed"], json!(false));
    }

    #[test]
    fn test_metrics_only_is_one_record() {
        let src = r#"
            name = "Profile"
            [[metrics]]
            name = "mean_x"
            expr = "x_mean"
            [[metrics]]
            name = "rows"
            expr = "row_count"
        "#;
        let test = DeclarativeTest::from_toml_str(src, "ignored").unwrap();
        let out = test
            .run(&BoundInputs::new().with("dataset", dataset()), &Params::new())
            .unwrap();
        assert_eq!(out.passed, None);
        assert_eq!(out.value, Some(json!({"mean_x": 2.0, "rows": 3.0})));
    }

    #[test]
    fn test_unknown_variable_is_run_error() {
        let src = r#"
            [[checks]]
            name = "typo"
            expr = "row_cout > 0"
        "#;
        let test = DeclarativeTest::from_toml_str(src, "Typo").unwrap();
        let err = test
            .run(&BoundInputs::new().with("dataset", dataset()), &Params::new())
            .unwrap_err();
        assert!(err.to_string().contains("row_cout"));
        assert!(err.to_string().contains("row_count"));
    }

    #[test]
    fn test_empty_definition_rejected() {
        assert!(matches!(
            DeclarativeTest::from_toml_str("name = \"x\"", "x"),
            Err(DefinitionError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_uses_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("RowFloor.toml");
        std::fs::write(&path, MIN_ROWS).unwrap();
        let test = DeclarativeTest::load(&path).unwrap();
        assert_eq!(test.metadata().name, "RowFloor");
        assert!(DeclarativeTest::load(&dir.path().join("Nope.toml")).is_err());
    }
}
