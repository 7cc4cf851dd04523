//! Composite Metrics
//!
//! A composite runs N unit metrics against the same inputs and merges their
//! scalars into one record keyed by each unit's leaf name:
//!
//! ```text
//! unit_metric_ids: [...sklearn.Accuracy, ...sklearn.F1]
//!        │                 │
//!        ▼                 ▼
//!      0.91              0.88
//!        └──────┬──────────┘
//!               ▼
//!   [{"Accuracy": 0.91, "F1": 0.88}]
//! ```
//!
//! Definitions persist behind a [`MetadataStore`] under
//! `composite_metric_def:<id>` so a composite can be reloaded by name.

use crate::declarative::DefinitionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use testgrid_core::{
    BoundInputs, Params, RawOutput, Record, SharedTest, TestError, TestImpl, TestMetadata,
    leaf_name,
};
use tracing::debug;

/// Key prefix for persisted composite definitions
pub const DEFINITION_KEY_PREFIX: &str = "composite_metric_def";

/// Persisted composite definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeDefinition {
    /// Unit metric identifiers, in run order
    pub unit_metric_ids: Vec<String>,
    /// Optional output template (`{{ name }}` placeholders)
    #[serde(default)]
    pub output_template: Option<String>,
}

impl CompositeDefinition {
    /// Reject units whose leaf names collide, since the leaf keys the record
    pub fn check_leaf_names(&self, composite_id: &str) -> testgrid_core::Result<()> {
        for (index, id) in self.unit_metric_ids.iter().enumerate() {
            let leaf = leaf_name(id);
            if let Some(earlier) = self.unit_metric_ids[..index]
                .iter()
                .find(|other| leaf_name(other) == leaf)
            {
                return Err(TestError::ConflictingArguments(format!(
                    "composite '{}' lists '{}' and '{}', which share the leaf name '{}'",
                    composite_id, earlier, id, leaf
                )));
            }
        }
        Ok(())
    }
}

/// Storage key of a composite's definition
pub fn definition_key(composite_id: &str) -> String {
    format!("{}:{}", DEFINITION_KEY_PREFIX, composite_id)
}

// ============================================================================
// Metadata store seam
// ============================================================================

/// Key/value persistence for definitions
pub trait MetadataStore: Send {
    /// Fetch a value
    fn get(&self, key: &str) -> Result<Option<Value>, DefinitionError>;

    /// Store a value, replacing any previous one
    fn put(&mut self, key: &str, value: Value) -> Result<(), DefinitionError>;
}

/// Process-local store
#[derive(Debug, Clone, Default)]
pub struct InMemoryMetadataStore {
    entries: HashMap<String, Value>,
}

impl InMemoryMetadataStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for InMemoryMetadataStore {
    fn get(&self, key: &str) -> Result<Option<Value>, DefinitionError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), DefinitionError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON file per key under a directory
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    dir: PathBuf,
}

impl FileMetadataStore {
    /// Store rooted at `dir` (created on first write)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c == ':' || c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

impl MetadataStore for FileMetadataStore {
    fn get(&self, key: &str) -> Result<Option<Value>, DefinitionError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| DefinitionError::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn put(&mut self, key: &str, value: Value) -> Result<(), DefinitionError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| DefinitionError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(&value)?;
        std::fs::write(&path, json).map_err(|e| DefinitionError::Io { path, source: e })
    }
}

/// Persist a composite definition
pub fn save_definition(
    store: &mut dyn MetadataStore,
    composite_id: &str,
    definition: &CompositeDefinition,
) -> Result<(), DefinitionError> {
    debug!(composite_id, units = definition.unit_metric_ids.len(), "Saving composite definition");
    store.put(&definition_key(composite_id), serde_json::to_value(definition)?)
}

/// Reload a composite definition, if one was saved
pub fn load_definition(
    store: &dyn MetadataStore,
    composite_id: &str,
) -> Result<Option<CompositeDefinition>, DefinitionError> {
    match store.get(&definition_key(composite_id))? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

// ============================================================================
// Composite implementation
// ============================================================================

/// Implementation delegating to unit metrics
pub struct CompositeTest {
    name: String,
    units: Vec<(String, SharedTest)>,
    output_template: Option<String>,
}

impl CompositeTest {
    /// Composite over already-resolved units, in run order
    pub fn new(name: impl Into<String>, units: Vec<(String, SharedTest)>) -> Self {
        Self {
            name: name.into(),
            units,
            output_template: None,
        }
    }

    /// Builder-style output template
    pub fn with_output_template(mut self, template: Option<String>) -> Self {
        self.output_template = template;
        self
    }

    /// Unit metric ids in run order
    pub fn unit_ids(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|(id, _)| id.as_str())
    }

    /// Output template carried by the definition
    pub fn output_template(&self) -> Option<&str> {
        self.output_template.as_deref()
    }

    /// Definition that reconstructs this composite
    pub fn definition(&self) -> CompositeDefinition {
        CompositeDefinition {
            unit_metric_ids: self.unit_ids().map(str::to_string).collect(),
            output_template: self.output_template.clone(),
        }
    }
}

/// Build a composite from its definition, resolving each unit with `resolve`
pub fn build_composite<F>(
    name: &str,
    definition: &CompositeDefinition,
    mut resolve: F,
) -> testgrid_core::Result<CompositeTest>
where
    F: FnMut(&str) -> testgrid_core::Result<SharedTest>,
{
    definition.check_leaf_names(name)?;
    let units = definition
        .unit_metric_ids
        .iter()
        .map(|id| Ok((id.clone(), resolve(id)?)))
        .collect::<testgrid_core::Result<Vec<_>>>()?;
    Ok(CompositeTest::new(name, units).with_output_template(definition.output_template.clone()))
}

impl fmt::Debug for CompositeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeTest")
            .field("name", &self.name)
            .field("units", &self.unit_ids().collect::<Vec<_>>())
            .field("output_template", &self.output_template)
            .finish()
    }
}

impl TestImpl for CompositeTest {
    fn metadata(&self) -> TestMetadata {
        let mut tasks: Vec<String> = Vec::new();
        let mut tags: Vec<String> = Vec::new();
        for (_, unit) in &self.units {
            let meta = unit.metadata();
            for task in meta.tasks {
                if !tasks.contains(&task) {
                    tasks.push(task);
                }
            }
            for tag in meta.tags {
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        TestMetadata {
            name: self.name.clone(),
            description: format!(
                "Composite of {}",
                self.units
                    .iter()
                    .map(|(id, _)| leaf_name(id))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            tasks,
            tags,
        }
    }

    /// Ordered union of the units' required inputs
    fn required_inputs(&self) -> Vec<String> {
        let mut roles: Vec<String> = Vec::new();
        for (_, unit) in &self.units {
            for role in unit.required_inputs() {
                if !roles.contains(&role) {
                    roles.push(role);
                }
            }
        }
        roles
    }

    /// Union of the units' defaults; the first unit declaring a name wins
    fn default_params(&self) -> Params {
        let mut params = Params::new();
        for (_, unit) in &self.units {
            for (name, value) in unit.default_params().iter() {
                if !params.contains(name) {
                    params.insert(name, value.clone());
                }
            }
        }
        params
    }

    fn run(&self, inputs: &BoundInputs, params: &Params) -> anyhow::Result<RawOutput> {
        let mut record = Record::new();
        for (id, unit) in &self.units {
            let defaults = unit.default_params();
            let unit_params = Params::merged(&defaults, &params.restricted_to(&defaults));

            let output = unit.run(inputs, &unit_params)?;
            let scalar = output.as_scalar().ok_or_else(|| {
                anyhow::anyhow!("Unit metric '{}' did not return a scalar value", id)
            })?;
            record.insert(leaf_name(id).to_string(), Value::from(scalar));
        }
        Ok(RawOutput::records(vec![record]))
    }
}
