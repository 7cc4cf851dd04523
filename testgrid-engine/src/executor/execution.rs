//! Single-Run Execution
//!
//! The [`Engine`] owns the loader (store, providers, composite definitions),
//! an input registry and an optional run cache. A single run:
//!
//! ```text
//! RunRequest
//!      │  parse id, persist composite definition (unit metrics given)
//!      ▼
//! RunCache ──hit──► TestResult
//!      │ miss
//!      ▼
//! TestLoader::load ──► TestInstance::new ──► run ──► (render if show)
//!                                                      │
//!                                                      ▼
//!                                                 TestResult
//! ```

use super::cache::RunCache;
use crate::catalog::{self, ListFilter, TestDescriptor};
use crate::config::GridConfig;
use crate::loader::TestLoader;
use crate::provider::{LocalTestProvider, ProviderRegistry, TestProvider};
use crate::store::TestStore;
use std::sync::Arc;
use testgrid_core::{
    BoundInputs, InputObject, InputRegistry, InputValue, Params, Result, SharedTest, TestError,
    TestId, TestInstance, TestResult,
};
use testgrid_logic::{
    CompositeDefinition, FileMetadataStore, InMemoryMetadataStore, MetadataStore,
};
use tracing::{debug, info};

/// Options of one single run
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Identifier, optionally with a `:suffix`
    pub test_id: String,
    /// Role -> bound value
    pub inputs: BoundInputs,
    /// Caller overrides, merged over the test's defaults
    pub params: Params,
    /// Template stored in the result metadata and used by the human renderer
    pub output_template: Option<String>,
    /// Unit metric ids; only valid for composite identifiers
    pub unit_metrics: Option<Vec<String>>,
    /// Print the rendered result
    pub show: bool,
}

impl RunRequest {
    /// Request for `test_id` with no inputs or params
    pub fn new(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
            inputs: BoundInputs::new(),
            params: Params::new(),
            output_template: None,
            unit_metrics: None,
            show: false,
        }
    }

    /// Bind an input role
    pub fn input(mut self, role: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.inputs.bind(role, value);
        self
    }

    /// Replace all input bindings
    pub fn inputs(mut self, inputs: BoundInputs) -> Self {
        self.inputs = inputs;
        self
    }

    /// Override one parameter
    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name, value);
        self
    }

    /// Replace all parameter overrides
    pub fn params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    /// Attach an output template
    pub fn output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = Some(template.into());
        self
    }

    /// Build the composite from these unit metrics
    pub fn unit_metrics<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unit_metrics = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Print the rendered result after running
    pub fn show(mut self, show: bool) -> Self {
        self.show = show;
        self
    }
}

/// Registries plus the run entry points
pub struct Engine {
    loader: TestLoader,
    inputs: InputRegistry,
    cache: Option<RunCache>,
    show_progress: bool,
}

impl Engine {
    /// Engine over an existing loader
    pub fn new(loader: TestLoader) -> Self {
        Self {
            loader,
            inputs: InputRegistry::new(),
            cache: None,
            show_progress: false,
        }
    }

    /// Engine configured from `testgrid.toml` settings
    pub fn from_config(config: &GridConfig) -> Self {
        let mut providers = ProviderRegistry::new();
        for (namespace, root) in &config.catalog.providers {
            providers.register(namespace.clone(), Arc::new(LocalTestProvider::new(root)));
        }
        let definitions: Box<dyn MetadataStore> = match &config.composites.store_path {
            Some(dir) => Box::new(FileMetadataStore::new(dir)),
            None => Box::new(InMemoryMetadataStore::new()),
        };
        let loader = TestLoader::new(TestStore::with_builtin_manifest(), providers, definitions);

        let mut engine = Self::new(loader).with_progress(config.runner.show_progress);
        if config.runner.memoize {
            engine = engine.with_cache();
        }
        engine
    }

    /// Enable the run cache
    pub fn with_cache(mut self) -> Self {
        self.cache = Some(RunCache::new());
        self
    }

    /// Show progress bars during comparison runs
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub(crate) fn show_progress(&self) -> bool {
        self.show_progress
    }

    /// Loader
    pub fn loader(&self) -> &TestLoader {
        &self.loader
    }

    /// Mutable loader
    pub fn loader_mut(&mut self) -> &mut TestLoader {
        &mut self.loader
    }

    /// Input registry
    pub fn input_registry(&self) -> &InputRegistry {
        &self.inputs
    }

    /// Run cache, when enabled
    pub fn cache(&self) -> Option<&RunCache> {
        self.cache.as_ref()
    }

    /// Make an input addressable by its id
    pub fn register_input(&mut self, object: impl Into<InputObject>) {
        self.inputs.register(object);
    }

    /// Resolve input ids registered with [`Engine::register_input`]
    pub fn resolve_inputs(&self, ids: &[&str]) -> Result<InputValue> {
        self.inputs.resolve(ids)
    }

    /// Register (or replace) the provider of a namespace
    pub fn register_provider(&mut self, namespace: impl Into<String>, provider: Arc<dyn TestProvider>) {
        self.loader.providers_mut().register(namespace, provider);
    }

    /// Register a one-off implementation shadowing every other tier
    pub fn register_custom(&mut self, id: &str, test: SharedTest) -> Result<()> {
        self.loader.store_mut().register_custom(id, test)
    }

    /// Resolve an identifier without running it
    pub fn load(&mut self, id: &str) -> Result<SharedTest> {
        self.loader.load(id)
    }

    /// Describe matching tests
    pub fn list(&mut self, filter: &ListFilter) -> Vec<TestDescriptor> {
        catalog::list(&mut self.loader, filter)
    }

    /// Describe one test without running it
    pub fn describe(&mut self, id: &str) -> Result<TestDescriptor> {
        catalog::describe(&mut self.loader, id)
    }

    /// Run one test through its full lifecycle
    pub fn run(&mut self, request: RunRequest) -> Result<TestResult> {
        let id = TestId::parse(&request.test_id)?;

        if let Some(units) = &request.unit_metrics {
            let definition = CompositeDefinition {
                unit_metric_ids: units.clone(),
                output_template: request.output_template.clone(),
            };
            self.loader.save_composite(&id, &definition)?;
        }

        let key = self.cache.as_ref().map(|_| {
            RunCache::key(
                &request.test_id,
                &request.inputs,
                &request.params,
                request.unit_metrics.as_deref(),
            )
        });
        if let (Some(cache), Some(key)) = (self.cache.as_mut(), key) {
            if let Some(hit) = cache.get(key) {
                debug!(test_id = %id, "Run cache hit");
                if request.show {
                    println!("{}", testgrid_report::format_human(&hit));
                }
                return Ok(hit);
            }
        }

        let test = self.loader.load(&request.test_id)?;
        let template = match request.output_template {
            Some(template) => Some(template),
            None if id.is_composite() => self
                .loader
                .composite_definition(&id)?
                .and_then(|d| d.output_template),
            None => None,
        };

        let result = run_instance(
            id.clone(),
            test,
            request.inputs,
            request.params,
            template,
            request.show,
        )?;
        info!(test_id = %id, kind = ?result.kind(), "Test complete");

        if let (Some(cache), Some(key)) = (self.cache.as_mut(), key) {
            cache.insert(key, result.clone());
        }
        Ok(result)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(TestLoader::default())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("loader", &self.loader)
            .field("inputs", &self.inputs.ids())
            .field("cache", &self.cache.as_ref().map(RunCache::len))
            .finish()
    }
}

/// Drive one instance from `Created` to a sealed result
pub(crate) fn run_instance(
    id: TestId,
    test: SharedTest,
    inputs: BoundInputs,
    params: Params,
    template: Option<String>,
    show: bool,
) -> Result<TestResult> {
    let mut instance = TestInstance::new(id, test, inputs, params).with_output_template(template);
    instance.run()?;
    if show {
        println!("{}", testgrid_report::render(&mut instance)?);
    }
    let test_id = instance.test_id().to_string();
    instance
        .into_result()
        .ok_or(TestError::NotRun { test_id })
}
