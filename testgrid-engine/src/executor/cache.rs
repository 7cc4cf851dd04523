//! Run Cache
//!
//! Optional memoization in front of single runs. The key is an `FxHasher`
//! hash of the serialized identifier, bound input objects, params and unit
//! metrics; the cached value is the finished result. Inputs are hashed by
//! content, so two datasets sharing an input id get distinct keys.

use fxhash::{FxHashMap, FxHasher};
use serde::Serialize;
use std::hash::Hasher;
use testgrid_core::{BoundInputs, Dataset, InputObject, Model, Params, TestResult};

#[derive(Serialize)]
enum KeyObject<'a> {
    Dataset(&'a Dataset),
    Model(&'a Model),
}

impl<'a> From<&'a InputObject> for KeyObject<'a> {
    fn from(object: &'a InputObject) -> Self {
        match object {
            InputObject::Dataset(d) => KeyObject::Dataset(d),
            InputObject::Model(m) => KeyObject::Model(m),
        }
    }
}

#[derive(Serialize)]
struct CacheKey<'a> {
    test_id: &'a str,
    inputs: Vec<(&'a str, Vec<KeyObject<'a>>)>,
    params: &'a Params,
    unit_metrics: Option<&'a [String]>,
}

/// Memoized results by run key
#[derive(Debug, Default)]
pub struct RunCache {
    entries: FxHashMap<u64, TestResult>,
    hits: u64,
}

impl RunCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a run request
    pub fn key(
        test_id: &str,
        inputs: &BoundInputs,
        params: &Params,
        unit_metrics: Option<&[String]>,
    ) -> u64 {
        let key = CacheKey {
            test_id,
            inputs: inputs
                .iter()
                .map(|(role, value)| (role, value.objects().iter().map(KeyObject::from).collect()))
                .collect(),
            params,
            unit_metrics,
        };
        let mut hasher = FxHasher::default();
        // Strings, records and JSON values always serialize
        let bytes = serde_json::to_vec(&key).unwrap_or_default();
        hasher.write(&bytes);
        hasher.finish()
    }

    /// Cached result for a key
    pub fn get(&mut self, key: u64) -> Option<TestResult> {
        let found = self.entries.get(&key).cloned();
        if found.is_some() {
            self.hits += 1;
        }
        found
    }

    /// Remember a result
    pub fn insert(&mut self, key: u64, result: TestResult) {
        self.entries.insert(key, result);
    }

    /// Number of cached results
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lookups answered from the cache
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_depends_on_inputs_and_params() {
        let a = BoundInputs::new().with("dataset", Dataset::new("train", vec![]));
        let b = BoundInputs::new().with("dataset", Dataset::new("test", vec![]));
        let p1 = Params::new().with("k", 1);
        let p2 = Params::new().with("k", 2);

        let base = RunCache::key("ns.a.T", &a, &p1, None);
        assert_eq!(base, RunCache::key("ns.a.T", &a, &p1, None));
        assert_ne!(base, RunCache::key("ns.a.T", &b, &p1, None));
        assert_ne!(base, RunCache::key("ns.a.T", &a, &p2, None));
        assert_ne!(base, RunCache::key("ns.a.U", &a, &p1, None));
        assert_ne!(
            base,
            RunCache::key("ns.a.T", &a, &p1, Some(&["m1".to_string()]))
        );
    }

    #[test]
    fn test_key_depends_on_input_content_not_just_id() {
        let row = json!({"x": 1}).as_object().cloned().unwrap();
        let small = BoundInputs::new().with("dataset", Dataset::new("train", vec![row.clone(); 2]));
        let large = BoundInputs::new().with("dataset", Dataset::new("train", vec![row; 5]));
        let params = Params::new();
        assert_ne!(
            RunCache::key("ns.a.T", &small, &params, None),
            RunCache::key("ns.a.T", &large, &params, None)
        );

        let m1 = BoundInputs::new().with("model", Model::new("clf", "sklearn"));
        let m2 = BoundInputs::new().with("model", Model::new("clf", "sklearn").with_attribute("depth", 3));
        assert_ne!(
            RunCache::key("ns.a.T", &m1, &params, None),
            RunCache::key("ns.a.T", &m2, &params, None)
        );
    }

    #[test]
    fn test_hits_are_counted() {
        let mut cache = RunCache::new();
        assert!(cache.get(1).is_none());
        assert_eq!(cache.hits(), 0);
        assert!(cache.is_empty());
    }
}
