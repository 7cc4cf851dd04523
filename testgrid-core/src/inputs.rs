//! Test Inputs
//!
//! Tests consume named input roles (`dataset`, `model`, `datasets`, ...).
//! Each role is bound to one [`InputObject`] or an ordered list of them.
//!
//! [`BoundInputs`] records which roles an implementation actually reads, so
//! the produced result can report its input provenance.

use crate::error::{Result, TestError};
use fxhash::FxHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// One row of a dataset or table
pub type Record = Map<String, Value>;

// ============================================================================
// Datasets and models
// ============================================================================

/// Tabular dataset with optional target and model prediction columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    input_id: String,
    columns: Vec<String>,
    records: Vec<Record>,
    #[serde(default)]
    target_column: Option<String>,
    /// model input id -> column holding that model's predictions
    #[serde(default)]
    prediction_columns: BTreeMap<String, String>,
}

impl Dataset {
    /// Build a dataset from records; columns are taken in first-appearance order
    pub fn new(input_id: impl Into<String>, records: Vec<Record>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self {
            input_id: input_id.into(),
            columns,
            records,
            target_column: None,
            prediction_columns: BTreeMap::new(),
        }
    }

    /// Parse a JSON array of records
    pub fn from_json_str(input_id: impl Into<String>, json: &str) -> anyhow::Result<Self> {
        let records: Vec<Record> = serde_json::from_str(json)?;
        Ok(Self::new(input_id, records))
    }

    /// Load a JSON array of records from disk
    pub fn from_json_file(input_id: impl Into<String>, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read dataset {}: {}", path.display(), e))?;
        Self::from_json_str(input_id, &content)
    }

    /// Mark `column` as the target column
    pub fn with_target(mut self, column: impl Into<String>) -> Self {
        self.target_column = Some(column.into());
        self
    }

    /// Declare that `column` holds the predictions of model `model_id`
    pub fn with_predictions(mut self, model_id: impl Into<String>, column: impl Into<String>) -> Self {
        self.prediction_columns.insert(model_id.into(), column.into());
        self
    }

    /// Input id used for provenance and grid labels
    pub fn input_id(&self) -> &str {
        &self.input_id
    }

    /// Column names in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records in order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset has no rows
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Target column, if declared
    pub fn target_column(&self) -> Option<&str> {
        self.target_column.as_deref()
    }

    /// Columns that are neither target nor prediction columns
    pub fn feature_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|c| Some(*c) != self.target_column.as_deref())
            .filter(|c| !self.prediction_columns.values().any(|p| p == c))
            .collect()
    }

    /// Values of one column; missing cells read as `null`
    pub fn column(&self, name: &str) -> impl Iterator<Item = &Value> {
        self.records
            .iter()
            .map(move |r| r.get(name).unwrap_or(&Value::Null))
    }

    /// Numeric values of one column, skipping non-numeric cells
    pub fn numeric_column(&self, name: &str) -> Vec<f64> {
        self.column(name).filter_map(as_number).collect()
    }

    /// Columns whose non-null cells are all numeric (and at least one is present)
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| {
                let mut seen = false;
                for value in self.column(c) {
                    match value {
                        Value::Null => {}
                        v if as_number(v).is_some() => seen = true,
                        _ => return false,
                    }
                }
                seen
            })
            .map(String::as_str)
            .collect()
    }

    /// Number of `null` or absent cells in a column
    pub fn missing_count(&self, name: &str) -> usize {
        self.column(name).filter(|v| v.is_null()).count()
    }

    /// Target values as numbers
    pub fn y(&self) -> Result<Vec<f64>> {
        let target = self.target_column.as_deref().ok_or_else(|| TestError::InvalidInput {
            role: self.input_id.clone(),
            message: "dataset has no target column".to_string(),
        })?;
        self.strict_numeric(target)
    }

    /// Predictions of `model` as numbers
    pub fn y_pred(&self, model: &Model) -> Result<Vec<f64>> {
        let column = self
            .prediction_columns
            .get(model.input_id())
            .ok_or_else(|| TestError::InvalidInput {
                role: self.input_id.clone(),
                message: format!("no prediction column for model '{}'", model.input_id()),
            })?;
        self.strict_numeric(column)
    }

    fn strict_numeric(&self, column: &str) -> Result<Vec<f64>> {
        self.column(column)
            .enumerate()
            .map(|(row, v)| {
                as_number(v).ok_or_else(|| TestError::InvalidInput {
                    role: self.input_id.clone(),
                    message: format!("column '{}' row {} is not numeric: {}", column, row, v),
                })
            })
            .collect()
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Trained model handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    input_id: String,
    library: String,
    #[serde(default)]
    attributes: Record,
}

impl Model {
    /// New model handle
    pub fn new(input_id: impl Into<String>, library: impl Into<String>) -> Self {
        Self {
            input_id: input_id.into(),
            library: library.into(),
            attributes: Record::new(),
        }
    }

    /// Builder-style attribute insert
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Input id used for provenance and grid labels
    pub fn input_id(&self) -> &str {
        &self.input_id
    }

    /// Library the model comes from (`sklearn`, `xgboost`, ...)
    pub fn library(&self) -> &str {
        &self.library
    }

    /// Free-form attributes
    pub fn attributes(&self) -> &Record {
        &self.attributes
    }
}

// ============================================================================
// Bound values
// ============================================================================

/// A single input object
#[derive(Debug, Clone)]
pub enum InputObject {
    /// Tabular dataset
    Dataset(Arc<Dataset>),
    /// Model handle
    Model(Arc<Model>),
}

impl InputObject {
    /// Input id of the wrapped object
    pub fn input_id(&self) -> &str {
        match self {
            InputObject::Dataset(d) => d.input_id(),
            InputObject::Model(m) => m.input_id(),
        }
    }

    /// `"dataset"` or `"model"`
    pub fn kind(&self) -> &'static str {
        match self {
            InputObject::Dataset(_) => "dataset",
            InputObject::Model(_) => "model",
        }
    }
}

impl From<Dataset> for InputObject {
    fn from(d: Dataset) -> Self {
        InputObject::Dataset(Arc::new(d))
    }
}

impl From<Arc<Dataset>> for InputObject {
    fn from(d: Arc<Dataset>) -> Self {
        InputObject::Dataset(d)
    }
}

impl From<Model> for InputObject {
    fn from(m: Model) -> Self {
        InputObject::Model(Arc::new(m))
    }
}

impl From<Arc<Model>> for InputObject {
    fn from(m: Arc<Model>) -> Self {
        InputObject::Model(m)
    }
}

/// Value bound to one role: a single object or an ordered list
#[derive(Debug, Clone)]
pub enum InputValue {
    /// Single object
    One(InputObject),
    /// Ordered list of objects
    Many(Vec<InputObject>),
}

impl InputValue {
    /// Input ids in order
    pub fn ids(&self) -> Vec<String> {
        match self {
            InputValue::One(o) => vec![o.input_id().to_string()],
            InputValue::Many(items) => items.iter().map(|o| o.input_id().to_string()).collect(),
        }
    }

    /// Bound objects in order
    pub fn objects(&self) -> &[InputObject] {
        match self {
            InputValue::One(o) => std::slice::from_ref(o),
            InputValue::Many(items) => items,
        }
    }

    /// Label used in comparison grids: the id, or ids joined by `", "`
    pub fn label(&self) -> String {
        self.ids().join(", ")
    }
}

impl From<InputObject> for InputValue {
    fn from(object: InputObject) -> Self {
        InputValue::One(object)
    }
}

impl From<Dataset> for InputValue {
    fn from(d: Dataset) -> Self {
        InputValue::One(d.into())
    }
}

impl From<Arc<Dataset>> for InputValue {
    fn from(d: Arc<Dataset>) -> Self {
        InputValue::One(d.into())
    }
}

impl From<Model> for InputValue {
    fn from(m: Model) -> Self {
        InputValue::One(m.into())
    }
}

impl From<Arc<Model>> for InputValue {
    fn from(m: Arc<Model>) -> Self {
        InputValue::One(m.into())
    }
}

impl From<Vec<InputObject>> for InputValue {
    fn from(items: Vec<InputObject>) -> Self {
        InputValue::Many(items)
    }
}

impl From<Vec<Dataset>> for InputValue {
    fn from(items: Vec<Dataset>) -> Self {
        InputValue::Many(items.into_iter().map(InputObject::from).collect())
    }
}

/// Inputs bound to a test instance, keyed by role in binding order
#[derive(Debug, Clone, Default)]
pub struct BoundInputs {
    values: IndexMap<String, InputValue>,
    accessed: RefCell<Vec<String>>,
}

impl BoundInputs {
    /// No bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style bind
    pub fn with(mut self, role: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.bind(role, value);
        self
    }

    /// Bind (or rebind) a role
    pub fn bind(&mut self, role: impl Into<String>, value: impl Into<InputValue>) {
        self.values.insert(role.into(), value.into());
    }

    /// Whether `role` is bound
    pub fn contains(&self, role: &str) -> bool {
        self.values.contains_key(role)
    }

    /// Bound roles in order
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// `(role, value)` pairs in order, without recording access
    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of bound roles
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is bound
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Read a role, recording the access
    pub fn get(&self, role: &str) -> Option<&InputValue> {
        let value = self.values.get(role)?;
        let mut accessed = self.accessed.borrow_mut();
        if !accessed.iter().any(|r| r == role) {
            accessed.push(role.to_string());
        }
        Some(value)
    }

    /// Read a role without recording the access
    pub fn peek(&self, role: &str) -> Option<&InputValue> {
        self.values.get(role)
    }

    /// Single dataset bound to `role`
    pub fn dataset(&self, role: &str) -> Result<&Dataset> {
        match self.require(role)? {
            InputValue::One(InputObject::Dataset(d)) => Ok(d),
            other => Err(wrong_kind(role, "a single dataset", other)),
        }
    }

    /// Single model bound to `role`
    pub fn model(&self, role: &str) -> Result<&Model> {
        match self.require(role)? {
            InputValue::One(InputObject::Model(m)) => Ok(m),
            other => Err(wrong_kind(role, "a single model", other)),
        }
    }

    /// Datasets bound to `role`; a single dataset reads as a list of one
    pub fn datasets(&self, role: &str) -> Result<Vec<&Dataset>> {
        let value = self.require(role)?;
        let items: &[InputObject] = match value {
            InputValue::One(o) => std::slice::from_ref(o),
            InputValue::Many(items) => items,
        };
        items
            .iter()
            .map(|o| match o {
                InputObject::Dataset(d) => Ok(d.as_ref()),
                InputObject::Model(_) => Err(wrong_kind(role, "datasets", value)),
            })
            .collect()
    }

    /// Models bound to `role`; a single model reads as a list of one
    pub fn models(&self, role: &str) -> Result<Vec<&Model>> {
        let value = self.require(role)?;
        let items: &[InputObject] = match value {
            InputValue::One(o) => std::slice::from_ref(o),
            InputValue::Many(items) => items,
        };
        items
            .iter()
            .map(|o| match o {
                InputObject::Model(m) => Ok(m.as_ref()),
                InputObject::Dataset(_) => Err(wrong_kind(role, "models", value)),
            })
            .collect()
    }

    /// Roles read since the last [`BoundInputs::reset_access`], in first-read order
    pub fn accessed(&self) -> Vec<String> {
        self.accessed.borrow().clone()
    }

    /// Forget recorded accesses
    pub fn reset_access(&self) {
        self.accessed.borrow_mut().clear();
    }

    fn require(&self, role: &str) -> Result<&InputValue> {
        self.get(role).ok_or_else(|| TestError::InvalidInput {
            role: role.to_string(),
            message: "no input bound to this role".to_string(),
        })
    }
}

fn wrong_kind(role: &str, expected: &str, found: &InputValue) -> TestError {
    let found = match found {
        InputValue::One(o) => o.kind().to_string(),
        InputValue::Many(items) => format!("list of {}", items.len()),
    };
    TestError::InvalidInput {
        role: role.to_string(),
        message: format!("expected {}, found {}", expected, found),
    }
}

// ============================================================================
// Input registry
// ============================================================================

/// Input objects addressable by input id (used by grids and the CLI)
#[derive(Debug, Clone, Default)]
pub struct InputRegistry {
    objects: FxHashMap<String, InputObject>,
}

impl InputRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object under its own input id; last write wins
    pub fn register(&mut self, object: impl Into<InputObject>) {
        let object = object.into();
        self.objects.insert(object.input_id().to_string(), object);
    }

    /// Look up one object
    pub fn get(&self, input_id: &str) -> Option<&InputObject> {
        self.objects.get(input_id)
    }

    /// Resolve one id, or several ids into a list value
    pub fn resolve(&self, ids: &[&str]) -> Result<InputValue> {
        let lookup = |id: &&str| {
            self.get(id).cloned().ok_or_else(|| TestError::InvalidInput {
                role: id.to_string(),
                message: "unknown input id".to_string(),
            })
        };
        match ids {
            [single] => Ok(InputValue::One(lookup(single)?)),
            many => Ok(InputValue::Many(many.iter().map(lookup).collect::<Result<_>>()?)),
        }
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.objects.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records(v: Value) -> Vec<Record> {
        serde_json::from_value(v).unwrap()
    }

    fn sample() -> Dataset {
        Dataset::new(
            "train",
            records(json!([
                {"age": 30, "city": "a", "label": 1, "pred": 1},
                {"age": null, "city": "b", "label": 0, "pred": 1},
                {"age": 50, "label": 1, "pred": 0},
            ])),
        )
        .with_target("label")
        .with_predictions("clf", "pred")
    }

    #[test]
    fn test_dataset_columns_and_profile() {
        let ds = sample();
        assert_eq!(ds.columns(), ["age", "city", "label", "pred"]);
        assert_eq!(ds.numeric_column("age"), vec![30.0, 50.0]);
        assert_eq!(ds.missing_count("age"), 1);
        assert_eq!(ds.missing_count("city"), 1);
        assert_eq!(ds.numeric_columns(), vec!["age", "label", "pred"]);
        assert_eq!(ds.feature_columns(), vec!["age", "city"]);
    }

    #[test]
    fn test_target_and_predictions() {
        let ds = sample();
        let model = Model::new("clf", "sklearn");
        assert_eq!(ds.y().unwrap(), vec![1.0, 0.0, 1.0]);
        assert_eq!(ds.y_pred(&model).unwrap(), vec![1.0, 1.0, 0.0]);
        assert!(ds.y_pred(&Model::new("other", "sklearn")).is_err());
    }

    #[test]
    fn test_bound_inputs_record_access() {
        let inputs = BoundInputs::new()
            .with("dataset", sample())
            .with("model", Model::new("clf", "sklearn"));

        assert!(inputs.accessed().is_empty());
        inputs.model("model").unwrap();
        inputs.dataset("dataset").unwrap();
        inputs.dataset("dataset").unwrap();
        assert_eq!(inputs.accessed(), vec!["model", "dataset"]);

        inputs.reset_access();
        let _ = inputs.peek("dataset");
        assert!(inputs.accessed().is_empty());
    }

    #[test]
    fn test_wrong_kind_is_invalid_input() {
        let inputs = BoundInputs::new().with("dataset", Model::new("clf", "sklearn"));
        assert!(matches!(
            inputs.dataset("dataset"),
            Err(TestError::InvalidInput { .. })
        ));
        assert!(inputs.models("dataset").is_ok());
    }

    #[test]
    fn test_registry_resolves_lists() {
        let mut registry = InputRegistry::new();
        registry.register(sample());
        registry.register(Dataset::new("test", vec![]));

        assert_eq!(registry.resolve(&["train"]).unwrap().label(), "train");
        assert_eq!(
            registry.resolve(&["train", "test"]).unwrap().label(),
            "train, test"
        );
        assert!(registry.resolve(&["nope"]).is_err());
        assert_eq!(registry.ids(), vec!["test", "train"]);
    }

    #[test]
    fn test_dataset_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, r#"[{"x": 1}, {"x": 2, "y": 3}]"#).unwrap();

        let ds = Dataset::from_json_file("rows", &path).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.columns(), ["x", "y"]);
        assert!(Dataset::from_json_file("rows", dir.path().join("missing.json")).is_err());
    }
}
