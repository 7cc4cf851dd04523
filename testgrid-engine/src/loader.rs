//! Test Loader
//!
//! Resolves an identifier to an implementation by walking resolver tiers in
//! an explicit order; the first tier that claims the identifier wins:
//!
//! ```text
//! raw id ──► Custom ──► Composite ──► Builtin ──► Provider ──► "no provider"
//!            (store)    (definition)  (manifest)  (namespace)
//! ```
//!
//! The Custom tier matches the raw id with its suffix removed, so custom
//! registrations need not be well-formed identifiers. Every later tier
//! requires one. A composite whose units lead back to itself is rejected.

use crate::provider::ProviderRegistry;
use crate::store::TestStore;
use testgrid_core::{
    FunctionTest, Result, SharedTest, TestError, TestId, find_builtin, split_suffix,
};
use testgrid_logic::{
    CompositeDefinition, InMemoryMetadataStore, MetadataStore, build_composite, load_definition,
    save_definition,
};
use tracing::debug;

/// One resolution tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolverKind {
    /// One-off registrations in the store
    Custom,
    /// `<ns>.composite_metric.*` rebuilt from a persisted definition
    Composite,
    /// Link-time manifest of the built-in namespace
    Builtin,
    /// Provider registered for the identifier's namespace
    Provider,
}

/// Default resolution precedence
pub const DEFAULT_RESOLUTION_ORDER: [ResolverKind; 4] = [
    ResolverKind::Custom,
    ResolverKind::Composite,
    ResolverKind::Builtin,
    ResolverKind::Provider,
];

/// Identifier -> implementation resolution over injected registries
pub struct TestLoader {
    store: TestStore,
    providers: ProviderRegistry,
    definitions: Box<dyn MetadataStore>,
    order: Vec<ResolverKind>,
    /// Composites whose units are being resolved, outermost first
    resolving: Vec<String>,
}

impl TestLoader {
    /// Loader over the given registries with the default precedence
    pub fn new(
        store: TestStore,
        providers: ProviderRegistry,
        definitions: Box<dyn MetadataStore>,
    ) -> Self {
        Self {
            store,
            providers,
            definitions,
            order: DEFAULT_RESOLUTION_ORDER.to_vec(),
            resolving: Vec::new(),
        }
    }

    /// Override the resolution precedence
    pub fn with_order(mut self, order: Vec<ResolverKind>) -> Self {
        self.order = order;
        self
    }

    /// Current resolution precedence
    pub fn resolution_order(&self) -> &[ResolverKind] {
        &self.order
    }

    /// Test store
    pub fn store(&self) -> &TestStore {
        &self.store
    }

    /// Mutable test store
    pub fn store_mut(&mut self) -> &mut TestStore {
        &mut self.store
    }

    /// Provider registry
    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Mutable provider registry
    pub fn providers_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.providers
    }

    /// Resolve an identifier, reusing already-loaded implementations
    pub fn load(&mut self, raw_id: &str) -> Result<SharedTest> {
        self.load_with(raw_id, false)
    }

    /// Resolve an identifier, bypassing any cached implementation
    pub fn reload(&mut self, raw_id: &str) -> Result<SharedTest> {
        self.load_with(raw_id, true)
    }

    /// Resolve an identifier; `reload` forces a fresh built-in/provider load
    pub fn load_with(&mut self, raw_id: &str, reload: bool) -> Result<SharedTest> {
        let (base, _) = split_suffix(raw_id);
        let mut parsed: Option<TestId> = None;

        for kind in self.order.clone() {
            if kind == ResolverKind::Custom {
                if let Some(test) = self.store.get_custom(base) {
                    debug!(test_id = base, tier = ?kind, "Resolved");
                    return Ok(test);
                }
                continue;
            }

            let id = match &parsed {
                Some(id) => id.clone(),
                None => {
                    let id = TestId::parse(raw_id)?;
                    parsed = Some(id.clone());
                    id
                }
            };

            let resolved = match kind {
                ResolverKind::Custom => None,
                ResolverKind::Composite if id.is_composite() => Some(self.load_composite(&id)?),
                ResolverKind::Builtin if id.is_builtin() => Some(self.load_builtin(&id, reload)?),
                ResolverKind::Provider if self.providers.has(id.namespace()) => {
                    Some(self.load_from_provider(&id, reload)?)
                }
                _ => None,
            };
            if let Some(test) = resolved {
                debug!(test_id = base, tier = ?kind, "Resolved");
                return Ok(test);
            }
        }

        let namespace = match parsed {
            Some(id) => id.namespace().to_string(),
            None => TestId::parse(raw_id)?.namespace().to_string(),
        };
        Err(TestError::load(
            base,
            format!("No test provider registered for namespace '{}'", namespace),
        ))
    }

    fn load_builtin(&mut self, id: &TestId, reload: bool) -> Result<SharedTest> {
        let base = id.base_id();
        if !reload {
            if let Some(test) = self.store.get_loaded(&base) {
                return Ok(test);
            }
        }
        let def = find_builtin(&base).ok_or_else(|| {
            TestError::load(&base, "Test is not part of the built-in catalog")
        })?;
        let test = FunctionTest::from_def(def).shared();
        self.store.register(id, Some(test.clone()));
        Ok(test)
    }

    fn load_from_provider(&mut self, id: &TestId, reload: bool) -> Result<SharedTest> {
        let base = id.base_id();
        if !reload {
            if let Some(test) = self.store.get_loaded(&base) {
                return Ok(test);
            }
        }
        let provider = self.providers.get(id.namespace()).ok_or_else(|| {
            TestError::load(&base, format!("No provider for namespace '{}'", id.namespace()))
        })?;
        let resolved = provider.load(&id.provider_path()).map_err(|e| {
            TestError::load_with_source(
                &base,
                format!("Provider for namespace '{}' failed to load the test", id.namespace()),
                e,
            )
        })?;
        let test = resolved.into_test(&base);
        self.store.register(id, Some(test.clone()));
        Ok(test)
    }

    fn load_composite(&mut self, id: &TestId) -> Result<SharedTest> {
        let base = id.base_id();
        let definition = self.composite_definition(id)?.ok_or_else(|| {
            TestError::load(
                &base,
                "No stored definition for this composite metric; run it once with unit metrics",
            )
        })?;
        if self.resolving.contains(&base) {
            let chain = self.resolving.join(" -> ");
            return Err(TestError::load(
                &base,
                format!("cyclic composite definition: {} -> {}", chain, base),
            ));
        }

        self.resolving.push(base);
        let composite = build_composite(id.leaf(), &definition, |unit| self.load(unit));
        self.resolving.pop();
        Ok(std::sync::Arc::new(composite?))
    }

    /// Persisted definition of a composite, if any
    pub fn composite_definition(&self, id: &TestId) -> Result<Option<CompositeDefinition>> {
        let base = id.base_id();
        load_definition(self.definitions.as_ref(), &base).map_err(|e| {
            TestError::load_with_source(&base, "Failed to read composite definition", e)
        })
    }

    /// Persist a composite definition so the composite can be loaded by name
    pub fn save_composite(&mut self, id: &TestId, definition: &CompositeDefinition) -> Result<()> {
        if !id.is_composite() {
            return Err(TestError::ConflictingArguments(format!(
                "unit metrics only apply to composite metric identifiers, got '{}'",
                id
            )));
        }
        let base = id.base_id();
        definition.check_leaf_names(&base)?;
        save_definition(self.definitions.as_mut(), &base, definition).map_err(|e| {
            TestError::load_with_source(&base, "Failed to persist composite definition", e)
        })
    }
}

impl Default for TestLoader {
    fn default() -> Self {
        Self::new(
            TestStore::with_builtin_manifest(),
            ProviderRegistry::new(),
            Box::new(InMemoryMetadataStore::new()),
        )
    }
}

impl std::fmt::Debug for TestLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestLoader")
            .field("store", &self.store)
            .field("providers", &self.providers)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{LocalTestProvider, TestProvider};
    use std::sync::Arc;
    use testgrid_core::{BoundInputs, Params, RawOutput, Resolved};

    fn named(name: &str) -> SharedTest {
        FunctionTest::new(name, &[], |_, _| Ok(RawOutput::scalar(1.0))).shared()
    }

    fn loader() -> TestLoader {
        TestLoader::new(
            TestStore::new(),
            ProviderRegistry::new(),
            Box::new(InMemoryMetadataStore::new()),
        )
    }

    struct FailingProvider;

    impl TestProvider for FailingProvider {
        fn load(&self, path: &str) -> anyhow::Result<Resolved> {
            anyhow::bail!("cannot import {}", path)
        }
    }

    struct FunctionProvider;

    impl TestProvider for FunctionProvider {
        fn load(&self, _path: &str) -> anyhow::Result<Resolved> {
            Ok(Resolved::Function {
                required_inputs: vec![],
                default_params: Params::new(),
                func: Arc::new(|_, _| Ok(RawOutput::scalar(7.0))),
            })
        }
    }

    #[test]
    fn test_custom_wins_over_every_tier() {
        let mut loader = loader();
        let custom = named("custom");
        loader
            .store_mut()
            .register_custom("validmind.data_validation.Anything", custom.clone())
            .unwrap();

        let loaded = loader.load("validmind.data_validation.Anything:x").unwrap();
        assert!(Arc::ptr_eq(&loaded, &custom));
    }

    #[test]
    fn test_unknown_namespace_is_load_error() {
        let mut loader = loader();
        match loader.load("nobody.checks.Leaf") {
            Err(TestError::LoadTest { test_id, message, .. }) => {
                assert_eq!(test_id, "nobody.checks.Leaf");
                assert!(message.contains("nobody"));
            }
            other => panic!("unexpected: {:?}", other.map(|t| t.metadata().name)),
        }
    }

    #[test]
    fn test_malformed_id_without_custom_entry() {
        let mut loader = loader();
        assert!(matches!(
            loader.load("NoDots"),
            Err(TestError::MalformedIdentifier { .. })
        ));
    }

    #[test]
    fn test_provider_failure_is_wrapped() {
        let mut loader = loader();
        loader.providers_mut().register("acme", Arc::new(FailingProvider));
        let err = loader.load("acme.a.Leaf").err().unwrap();
        assert!(matches!(err, TestError::LoadTest { .. }));
        let cause = std::error::Error::source(&err).unwrap();
        assert_eq!(cause.to_string(), "cannot import a.Leaf");
    }

    #[test]
    fn test_provider_functions_are_adapted_and_cached() {
        let mut loader = loader();
        loader.providers_mut().register("fx", Arc::new(FunctionProvider));

        let first = loader.load("fx.metrics.Seven").unwrap();
        assert_eq!(first.metadata().name, "Seven");
        assert_eq!(
            first.run(&BoundInputs::new(), &Params::new()).unwrap().as_scalar(),
            Some(7.0)
        );

        let again = loader.load("fx.metrics.Seven").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        let fresh = loader.reload("fx.metrics.Seven").unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
    }

    #[test]
    fn test_local_provider_through_loader() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Rows.toml"),
            "[[metrics]]\nname = \"rows\"\nexpr = \"row_count\"\n",
        )
        .unwrap();
        let mut loader = loader();
        loader
            .providers_mut()
            .register("local", Arc::new(LocalTestProvider::new(dir.path())));
        assert_eq!(loader.load("local.Rows").unwrap().metadata().name, "Rows");
        assert!(loader.load("local.Missing").is_err());
    }

    #[test]
    fn test_composite_requires_definition() {
        let mut loader = loader();
        let err = loader.load("validmind.composite_metric.Nothing").err().unwrap();
        assert!(matches!(err, TestError::LoadTest { .. }));
    }

    #[test]
    fn test_composite_reloads_from_definition() {
        let mut loader = loader();
        loader.store_mut().register_custom("m1", named("m1")).unwrap();
        loader.store_mut().register_custom("m2", named("m2")).unwrap();

        let id = TestId::parse("validmind.composite_metric.Pair").unwrap();
        let definition = CompositeDefinition {
            unit_metric_ids: vec!["m1".to_string(), "m2".to_string()],
            output_template: None,
        };
        loader.save_composite(&id, &definition).unwrap();

        let composite = loader.load("validmind.composite_metric.Pair").unwrap();
        assert_eq!(composite.metadata().name, "Pair");
        let out = composite.run(&BoundInputs::new(), &Params::new()).unwrap();
        assert_eq!(out.value, Some(serde_json::json!([{"m1": 1.0, "m2": 1.0}])));
    }

    #[test]
    fn test_cyclic_composites_are_load_errors() {
        let mut loader = loader();
        loader.store_mut().register_custom("m1", named("m1")).unwrap();
        let define = |loader: &mut TestLoader, id: &str, units: &[&str]| {
            let definition = CompositeDefinition {
                unit_metric_ids: units.iter().map(|u| u.to_string()).collect(),
                output_template: None,
            };
            loader.save_composite(&TestId::parse(id).unwrap(), &definition).unwrap();
        };

        define(&mut loader, "acme.composite_metric.Loop", &["m1", "acme.composite_metric.Loop"]);
        let err = loader.load("acme.composite_metric.Loop").err().unwrap();
        assert!(matches!(err, TestError::LoadTest { .. }));
        assert!(err.to_string().contains("cyclic composite definition"));

        define(&mut loader, "acme.composite_metric.A", &["acme.composite_metric.B"]);
        define(&mut loader, "acme.composite_metric.B", &["m1", "acme.composite_metric.A:x"]);
        assert!(matches!(
            loader.load("acme.composite_metric.A"),
            Err(TestError::LoadTest { .. })
        ));

        // The guard is released after a failure
        define(&mut loader, "acme.composite_metric.A", &["m1"]);
        assert!(loader.load("acme.composite_metric.B").is_ok());
    }

    #[test]
    fn test_save_composite_rejects_plain_ids() {
        let mut loader = loader();
        let id = TestId::parse("validmind.unit_metrics.Accuracy").unwrap();
        let definition = CompositeDefinition {
            unit_metric_ids: vec![],
            output_template: None,
        };
        assert!(matches!(
            loader.save_composite(&id, &definition),
            Err(TestError::ConflictingArguments(_))
        ));
    }

    #[test]
    fn test_save_composite_rejects_shared_leaf_names() {
        let mut loader = loader();
        let id = TestId::parse("acme.composite_metric.Scores").unwrap();
        let definition = CompositeDefinition {
            unit_metric_ids: vec!["a.x.Accuracy".to_string(), "b.y.Accuracy".to_string()],
            output_template: None,
        };
        assert!(matches!(
            loader.save_composite(&id, &definition),
            Err(TestError::ConflictingArguments(_))
        ));
        assert_eq!(loader.composite_definition(&id).unwrap(), None);
    }

    #[test]
    fn test_custom_order() {
        let mut loader = loader().with_order(vec![ResolverKind::Provider, ResolverKind::Custom]);
        loader.providers_mut().register("fx", Arc::new(FunctionProvider));
        loader
            .store_mut()
            .register_custom("fx.metrics.Seven", named("custom"))
            .unwrap();
        assert_eq!(loader.load("fx.metrics.Seven").unwrap().metadata().name, "Seven");
        assert_eq!(loader.resolution_order()[0], ResolverKind::Provider);
    }

    #[test]
    fn test_builtin_outside_manifest() {
        let mut loader = loader();
        let err = loader.load("validmind.nowhere.Missing").err().unwrap();
        assert!(matches!(err, TestError::LoadTest { .. }));
    }
}
