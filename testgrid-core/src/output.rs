//! Raw Test Output
//!
//! What an implementation hands back from `run`: an optional JSON value,
//! optional figures and an optional overall verdict. The lifecycle turns it
//! into tables with the implementation's `summarize`.

use crate::inputs::Record;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Titled, ordered list of records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Table title (`None` for the untitled main table)
    pub title: Option<String>,
    /// Rows in order
    pub records: Vec<Record>,
}

impl ResultTable {
    /// Untitled table
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            title: None,
            records,
        }
    }

    /// Titled table
    pub fn titled(title: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            title: Some(title.into()),
            records,
        }
    }

    /// Union of record keys in first-appearance order
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Opaque figure payload with a stable key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    /// Stable key, unique within a result
    pub key: String,
    /// Display caption
    #[serde(default)]
    pub caption: Option<String>,
    /// Free-form metadata shipped with the figure
    #[serde(default)]
    pub metadata: Record,
    /// Opaque plot data (histogram bins, series, ...)
    pub data: Value,
}

impl Figure {
    /// Figure with a key and data
    pub fn new(key: impl Into<String>, data: Value) -> Self {
        Self {
            key: key.into(),
            caption: None,
            metadata: Record::new(),
            data,
        }
    }

    /// Builder-style caption
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Builder-style metadata insert
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Output of one implementation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    /// Main value, summarized into tables
    pub value: Option<Value>,
    /// Figures in production order
    pub figures: Vec<Figure>,
    /// Overall verdict; `Some` makes the result a threshold result
    pub passed: Option<bool>,
}

impl RawOutput {
    /// Empty output (rejected by the lifecycle unless figures are added)
    pub fn new() -> Self {
        Self::default()
    }

    /// Output carrying `value`
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Scalar metric output
    pub fn scalar(value: f64) -> Self {
        Self::value(value)
    }

    /// Output whose value is one untitled table
    pub fn records(records: Vec<Record>) -> Self {
        Self::value(Value::Array(records.into_iter().map(Value::Object).collect()))
    }

    /// Add a titled table; the value becomes an object of `title -> records`
    pub fn table(mut self, title: impl Into<String>, records: Vec<Record>) -> Self {
        let rows = Value::Array(records.into_iter().map(Value::Object).collect());
        match &mut self.value {
            Some(Value::Object(map)) => {
                map.insert(title.into(), rows);
            }
            _ => {
                let mut map = Map::new();
                map.insert(title.into(), rows);
                self.value = Some(Value::Object(map));
            }
        }
        self
    }

    /// Builder-style figure append
    pub fn figure(mut self, figure: Figure) -> Self {
        self.figures.push(figure);
        self
    }

    /// Builder-style verdict
    pub fn with_passed(mut self, passed: bool) -> Self {
        self.passed = Some(passed);
        self
    }

    /// The value as a number, when it is one
    pub fn as_scalar(&self) -> Option<f64> {
        self.value.as_ref().and_then(Value::as_f64)
    }

    /// Whether there is nothing to cache
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.figures.is_empty()
    }
}

/// Conversion of implementation return types into [`RawOutput`]
pub trait IntoOutput {
    /// Perform the conversion
    fn into_output(self) -> anyhow::Result<RawOutput>;
}

impl IntoOutput for RawOutput {
    fn into_output(self) -> anyhow::Result<RawOutput> {
        Ok(self)
    }
}

impl IntoOutput for f64 {
    fn into_output(self) -> anyhow::Result<RawOutput> {
        Ok(RawOutput::scalar(self))
    }
}

impl IntoOutput for Value {
    fn into_output(self) -> anyhow::Result<RawOutput> {
        Ok(RawOutput::value(self))
    }
}

impl IntoOutput for Vec<Record> {
    fn into_output(self) -> anyhow::Result<RawOutput> {
        Ok(RawOutput::records(self))
    }
}

impl<T, E> IntoOutput for Result<T, E>
where
    T: IntoOutput,
    E: Into<anyhow::Error>,
{
    fn into_output(self) -> anyhow::Result<RawOutput> {
        self.map_err(Into::into)?.into_output()
    }
}

// ============================================================================
// Default summarization
// ============================================================================

/// Default value-to-tables conversion:
///
/// - array of objects: one untitled table
/// - object whose values are all arrays of objects: one titled table per key
/// - any other object: one untitled table with a single record
/// - scalar: one untitled table `[{"value": v}]`
/// - `null`: no tables
pub fn summarize_value(value: &Value) -> Vec<ResultTable> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => vec![ResultTable::new(rows_of(items))],
        Value::Object(map) if !map.is_empty() && map.values().all(is_record_list) => map
            .iter()
            .map(|(title, rows)| {
                let items = rows.as_array().map(Vec::as_slice).unwrap_or_default();
                ResultTable::titled(title.clone(), rows_of(items))
            })
            .collect(),
        Value::Object(map) => vec![ResultTable::new(vec![map.clone()])],
        scalar => {
            let mut record = Record::new();
            record.insert("value".to_string(), scalar.clone());
            vec![ResultTable::new(vec![record])]
        }
    }
}

fn is_record_list(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.iter().all(Value::is_object))
}

fn rows_of(items: &[Value]) -> Vec<Record> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => map.clone(),
            other => {
                let mut record = Record::new();
                record.insert("value".to_string(), other.clone());
                record
            }
        })
        .collect()
}
