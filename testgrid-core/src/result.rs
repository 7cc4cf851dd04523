//! Result Objects
//!
//! A [`TestResult`] is the uniform output contract: identifier, ordered
//! tables, keyed figures, consulted inputs and free-form metadata. It is
//! immutable once produced; only the lifecycle and the comparison merge
//! build one, through [`ResultParts`].

use crate::identifier::TestId;
use crate::inputs::Record;
use crate::output::{Figure, ResultTable};
use crate::params::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Scalar or tabular metric
    Metric,
    /// Pass/fail check with per-row verdicts
    Threshold,
}

/// Input role consulted during a run and the input ids bound to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRef {
    /// Role name
    pub role: String,
    /// Bound input ids, in order
    pub input_ids: Vec<String>,
}

/// Fields of a result under construction
#[derive(Debug, Clone)]
pub struct ResultParts {
    /// Result identifier
    pub result_id: TestId,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
    /// Result flavor
    pub kind: ResultKind,
    /// Ordered tables
    pub tables: Vec<ResultTable>,
    /// Ordered figures
    pub figures: Vec<Figure>,
    /// Overall verdict for threshold results
    pub passed: Option<bool>,
    /// Inputs consulted
    pub inputs: Vec<InputRef>,
    /// Effective parameters
    pub params: Params,
    /// Free-form metadata
    pub metadata: Record,
}

/// Immutable test result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    result_id: TestId,
    name: String,
    description: String,
    kind: ResultKind,
    tables: Vec<ResultTable>,
    figures: Vec<Figure>,
    passed: Option<bool>,
    inputs: Vec<InputRef>,
    params: Params,
    metadata: Record,
}

impl TestResult {
    /// Seal a result
    pub fn from_parts(parts: ResultParts) -> Self {
        Self {
            result_id: parts.result_id,
            name: parts.name,
            description: parts.description,
            kind: parts.kind,
            tables: parts.tables,
            figures: parts.figures,
            passed: parts.passed,
            inputs: parts.inputs,
            params: parts.params,
            metadata: parts.metadata,
        }
    }

    /// Unseal into parts, e.g. to build a derived result
    pub fn into_parts(self) -> ResultParts {
        ResultParts {
            result_id: self.result_id,
            name: self.name,
            description: self.description,
            kind: self.kind,
            tables: self.tables,
            figures: self.figures,
            passed: self.passed,
            inputs: self.inputs,
            params: self.params,
            metadata: self.metadata,
        }
    }

    /// Result identifier
    pub fn result_id(&self) -> &TestId {
        &self.result_id
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Metric or threshold
    pub fn kind(&self) -> ResultKind {
        self.kind
    }

    /// Tables in order
    pub fn tables(&self) -> &[ResultTable] {
        &self.tables
    }

    /// Figures in order
    pub fn figures(&self) -> &[Figure] {
        &self.figures
    }

    /// Overall verdict
    pub fn passed(&self) -> Option<bool> {
        self.passed
    }

    /// Inputs consulted during the run
    pub fn inputs(&self) -> &[InputRef] {
        &self.inputs
    }

    /// Effective parameters
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Free-form metadata
    pub fn metadata(&self) -> &Record {
        &self.metadata
    }

    /// Metadata entry as text
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Boundary payload `{id, tables, figures, passed?}`
    pub fn to_payload(&self) -> ResultPayload {
        ResultPayload {
            id: self.result_id.to_string(),
            tables: self.tables.clone(),
            figures: self
                .figures
                .iter()
                .map(|figure| {
                    let mut metadata = figure.metadata.clone();
                    if let Some(caption) = &figure.caption {
                        metadata.insert("caption".to_string(), Value::String(caption.clone()));
                    }
                    FigurePayload {
                        key: figure.key.clone(),
                        metadata,
                    }
                })
                .collect(),
            passed: self.passed,
        }
    }
}

/// Figure as shipped across the result boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigurePayload {
    /// Stable figure key
    pub key: String,
    /// Figure metadata, caption included
    pub metadata: Record,
}

/// Serialized result shape consumed by sinks and backends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    /// Result identifier
    pub id: String,
    /// Tables as `{title, records}`
    pub tables: Vec<ResultTable>,
    /// Figures as `{key, metadata}`
    pub figures: Vec<FigurePayload>,
    /// Overall verdict, threshold results only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}
