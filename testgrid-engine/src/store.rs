//! Test Store
//!
//! Identifier -> implementation map (an entry may be known but not loaded
//! yet), plus one-off custom registrations that shadow it. Entries are never
//! evicted.

use fxhash::FxHashMap;
use testgrid_core::{Result, SharedTest, TestError, TestId, builtin_tests, split_suffix};
use tracing::debug;

/// Explicit, injectable test store
#[derive(Default)]
pub struct TestStore {
    tests: FxHashMap<String, Option<SharedTest>>,
    custom: FxHashMap<String, SharedTest>,
}

impl TestStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with every link-time registered id, not yet loaded
    pub fn with_builtin_manifest() -> Self {
        let mut store = Self::new();
        for def in builtin_tests() {
            store.tests.entry(def.id.to_string()).or_insert(None);
        }
        store
    }

    /// Record an identifier, with its implementation once loaded
    pub fn register(&mut self, id: &TestId, test: Option<SharedTest>) {
        let key = id.base_id();
        match test {
            Some(test) => {
                debug!(test_id = %key, "Registered implementation");
                self.tests.insert(key, Some(test));
            }
            // Never downgrade a loaded entry
            None => {
                self.tests.entry(key).or_insert(None);
            }
        }
    }

    /// Register a one-off implementation that shadows every other tier.
    ///
    /// The id need not be a well-formed identifier; any `:suffix` is ignored.
    pub fn register_custom(&mut self, id: &str, test: SharedTest) -> Result<()> {
        let (key, _) = split_suffix(id);
        if key.trim().is_empty() {
            return Err(TestError::malformed(id, "custom test id is empty"));
        }
        debug!(test_id = key, "Registered custom test");
        self.custom.insert(key.to_string(), test);
        Ok(())
    }

    /// Custom entry first, then the loaded implementation, if any
    pub fn get(&self, id: &str) -> Option<SharedTest> {
        let (key, _) = split_suffix(id);
        self.get_custom(key)
            .or_else(|| self.tests.get(key).and_then(|t| t.clone()))
    }

    /// Custom entry only
    pub fn get_custom(&self, id: &str) -> Option<SharedTest> {
        let (key, _) = split_suffix(id);
        self.custom.get(key).cloned()
    }

    /// Loaded implementation only (custom entries ignored)
    pub fn get_loaded(&self, id: &str) -> Option<SharedTest> {
        let (key, _) = split_suffix(id);
        self.tests.get(key).and_then(|t| t.clone())
    }

    /// Whether the id is known, loaded or not
    pub fn contains(&self, id: &str) -> bool {
        let (key, _) = split_suffix(id);
        self.custom.contains_key(key) || self.tests.contains_key(key)
    }

    /// Every known id (regular and custom), sorted and deduplicated
    pub fn all_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .tests
            .keys()
            .chain(self.custom.keys())
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Custom ids, sorted
    pub fn custom_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.custom.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for TestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStore")
            .field("tests", &self.tests.len())
            .field("loaded", &self.tests.values().filter(|t| t.is_some()).count())
            .field("custom", &self.custom_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use testgrid_core::{FunctionTest, RawOutput};

    fn named(name: &str) -> SharedTest {
        FunctionTest::new(name, &[], |_, _| Ok(RawOutput::scalar(0.0))).shared()
    }

    #[test]
    fn test_custom_shadows_regular() {
        let mut store = TestStore::new();
        let id = TestId::parse("validmind.data_validation.ClassImbalance").unwrap();
        store.register(&id, Some(named("builtin")));
        store
            .register_custom("validmind.data_validation.ClassImbalance", named("custom"))
            .unwrap();

        let found = store.get("validmind.data_validation.ClassImbalance:train").unwrap();
        assert_eq!(found.metadata().name, "custom");
        assert_eq!(
            store.get_loaded(&id.to_string()).unwrap().metadata().name,
            "builtin"
        );
    }

    #[test]
    fn test_placeholder_entries() {
        let mut store = TestStore::new();
        let id = TestId::parse("ns.a.Leaf").unwrap();
        store.register(&id, None);
        assert!(store.contains("ns.a.Leaf"));
        assert!(store.get("ns.a.Leaf").is_none());

        let test = named("Leaf");
        store.register(&id, Some(test.clone()));
        store.register(&id, None);
        assert!(Arc::ptr_eq(&store.get("ns.a.Leaf").unwrap(), &test));
    }

    #[test]
    fn test_custom_ids_need_not_parse() {
        let mut store = TestStore::new();
        store.register_custom("m1", named("m1")).unwrap();
        assert!(store.register_custom("  ", named("x")).is_err());
        assert_eq!(store.all_ids(), vec!["m1"]);
    }
}
