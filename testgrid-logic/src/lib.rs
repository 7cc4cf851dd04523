#![warn(missing_docs)]
//! TestGrid Logic - Expression-Driven Tests
//!
//! Evaluates declarative checks and metrics with `evalexpr`, and builds
//! composite metrics out of unit metrics with persisted definitions.

mod composite;
mod context;
mod declarative;

pub use composite::{
    CompositeDefinition, CompositeTest, DEFINITION_KEY_PREFIX, FileMetadataStore,
    InMemoryMetadataStore, MetadataStore, build_composite, definition_key, load_definition,
    save_definition,
};
pub use context::{ContextError, MetricContext, variable_name};
pub use declarative::{CheckDef, DeclarativeDef, DeclarativeTest, DefinitionError, MetricDef};
