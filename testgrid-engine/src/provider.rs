//! Test Providers
//!
//! A provider resolves identifiers of one namespace. The loader hands it
//! the identifier without namespace and suffix (`a.b.Leaf` for
//! `acme.a.b.Leaf:x`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use testgrid_core::{Resolved, SharedTest};
use testgrid_logic::DeclarativeTest;
use tracing::{debug, warn};

/// Pluggable loader for one namespace
pub trait TestProvider: Send + Sync {
    /// Resolve `path` (identifier without namespace and suffix)
    fn load(&self, path: &str) -> anyhow::Result<Resolved>;

    /// Paths this provider can resolve, if it can enumerate them
    fn list(&self) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Namespace -> provider, last write wins
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn TestProvider>>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provider of a namespace
    pub fn register(&mut self, namespace: impl Into<String>, provider: Arc<dyn TestProvider>) {
        let namespace = namespace.into();
        if self.providers.insert(namespace.clone(), provider).is_some() {
            warn!(namespace = %namespace, "Replacing existing test provider");
        } else {
            debug!(namespace = %namespace, "Registered test provider");
        }
    }

    /// Whether a namespace has a provider
    pub fn has(&self, namespace: &str) -> bool {
        self.providers.contains_key(namespace)
    }

    /// Provider of a namespace
    pub fn get(&self, namespace: &str) -> Option<Arc<dyn TestProvider>> {
        self.providers.get(namespace).cloned()
    }

    /// Registered namespaces, sorted
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}

// ============================================================================
// Local filesystem provider
// ============================================================================

/// Resolves `a.b.Leaf` to the declarative test `<root>/a/b/Leaf.toml`
#[derive(Debug, Clone)]
pub struct LocalTestProvider {
    root: PathBuf,
}

impl LocalTestProvider {
    /// Provider over a directory tree
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, path: &str) -> PathBuf {
        let mut file = self.root.clone();
        for segment in path.split('.') {
            file.push(segment);
        }
        file.set_extension("toml");
        file
    }
}

impl TestProvider for LocalTestProvider {
    fn load(&self, path: &str) -> anyhow::Result<Resolved> {
        let file = self.path_for(path);
        if !file.is_file() {
            anyhow::bail!("Test file not found: {}", file.display());
        }
        let test: SharedTest = Arc::new(DeclarativeTest::load(&file)?);
        Ok(Resolved::Implementation(test))
    }

    fn list(&self) -> anyhow::Result<Vec<String>> {
        let mut found = Vec::new();
        if self.root.is_dir() {
            collect_tests(&self.root, &mut Vec::new(), &mut found)?;
        }
        found.sort();
        Ok(found)
    }
}

fn collect_tests(dir: &Path, prefix: &mut Vec<String>, found: &mut Vec<String>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };
        if path.is_dir() {
            prefix.push(stem);
            collect_tests(&path, prefix, found)?;
            prefix.pop();
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            let mut segments = prefix.clone();
            segments.push(stem);
            found.push(segments.join("."));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use testgrid_core::{BoundInputs, Dataset, Params};

    const CHECK: &str = r#"
        description = "At least one row"
        [[checks]]
        name = "non_empty"
        expr = "row_count > 0"
    "#;

    #[test]
    fn test_local_provider_resolves_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data").join("quality")).unwrap();
        std::fs::write(dir.path().join("data/quality/NonEmpty.toml"), CHECK).unwrap();
        std::fs::write(dir.path().join("Top.toml"), CHECK).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let provider = LocalTestProvider::new(dir.path());
        assert_eq!(provider.list().unwrap(), vec!["Top", "data.quality.NonEmpty"]);

        let test = provider.load("data.quality.NonEmpty").unwrap().into_test("acme.data.quality.NonEmpty");
        assert_eq!(test.metadata().name, "NonEmpty");
        let out = test
            .run(
                &BoundInputs::new().with("dataset", Dataset::new("d", vec![Default::default()])),
                &Params::new(),
            )
            .unwrap();
        assert_eq!(out.passed, Some(true));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalTestProvider::new(dir.path());
        let err = provider.load("nope.Missing").unwrap_err();
        assert!(err.to_string().contains("Missing.toml"));
    }

    #[test]
    fn test_registry_last_write_wins() {
        let mut registry = ProviderRegistry::new();
        registry.register("acme", Arc::new(LocalTestProvider::new("/a")));
        registry.register("acme", Arc::new(LocalTestProvider::new("/b")));
        assert!(registry.has("acme"));
        assert!(!registry.has("other"));
        assert_eq!(registry.namespaces().collect::<Vec<_>>(), vec!["acme"]);
    }
}
