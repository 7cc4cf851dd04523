//! Catalog Listing
//!
//! Enumerates every identifier the loader can see (store manifest, custom
//! registrations, and whatever providers can enumerate), loads each one
//! without running it, and filters the descriptors.

use crate::loader::TestLoader;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use testgrid_core::{Params, Result, SharedTest, split_suffix};
use tracing::{debug, warn};

/// What `describe` and `list` report about a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestDescriptor {
    /// Identifier without suffix
    #[serde(rename = "ID")]
    pub id: String,
    /// Display name
    #[serde(rename = "Name")]
    pub name: String,
    /// Free-text description
    #[serde(rename = "Description")]
    pub description: String,
    /// Input roles the test requires
    #[serde(rename = "Required Inputs")]
    pub required_inputs: Vec<String>,
    /// Declared parameters with their defaults
    #[serde(rename = "Params")]
    pub params: Params,
    /// Task types
    #[serde(rename = "Tasks", default)]
    pub tasks: Vec<String>,
    /// Tags
    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
}

impl TestDescriptor {
    /// Describe a loaded implementation under `id`
    pub fn from_test(id: &str, test: &SharedTest) -> Self {
        let meta = test.metadata();
        Self {
            id: split_suffix(id).0.to_string(),
            name: meta.name,
            description: meta.description,
            required_inputs: test.required_inputs(),
            params: test.default_params(),
            tasks: meta.tasks,
            tags: meta.tags,
        }
    }

    /// Case-insensitive substring match over id, tasks and tags
    pub fn matches_filter(&self, filter: &str) -> bool {
        let needle = filter.to_lowercase();
        self.id.to_lowercase().contains(&needle)
            || self.tasks.iter().any(|t| t.to_lowercase().contains(&needle))
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }

    /// Whether the test declares `task` (case-insensitive)
    pub fn has_task(&self, task: &str) -> bool {
        self.tasks.iter().any(|t| t.eq_ignore_ascii_case(task))
    }

    /// Whether the test carries every tag in `tags` (case-insensitive)
    pub fn has_tags(&self, tags: &[String]) -> bool {
        tags.iter()
            .all(|wanted| self.tags.iter().any(|t| t.eq_ignore_ascii_case(wanted)))
    }
}

/// Listing filters; all of them narrow conjunctively
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Substring over id, tasks and tags
    pub filter: Option<String>,
    /// Exact task type
    pub task: Option<String>,
    /// Required tags
    pub tags: Vec<String>,
}

impl ListFilter {
    /// Filter with only a substring
    pub fn substring(filter: impl Into<String>) -> Self {
        Self {
            filter: Some(filter.into()),
            ..Self::default()
        }
    }

    /// Narrow to a task type
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Require a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Whether a descriptor passes every filter
    pub fn accepts(&self, descriptor: &TestDescriptor) -> bool {
        if let Some(filter) = &self.filter {
            if !descriptor.matches_filter(filter) {
                return false;
            }
        }
        if let Some(task) = &self.task {
            if !descriptor.has_task(task) {
                return false;
            }
        }
        descriptor.has_tags(&self.tags)
    }
}

/// Every identifier visible to the loader, sorted and deduplicated
pub fn all_ids(loader: &TestLoader) -> Vec<String> {
    let mut ids = loader.store().all_ids();
    for namespace in loader.providers().namespaces() {
        let Some(provider) = loader.providers().get(namespace) else {
            continue;
        };
        match provider.list() {
            Ok(paths) => ids.extend(paths.into_iter().map(|p| format!("{}.{}", namespace, p))),
            Err(e) => warn!(namespace, "Provider could not enumerate its tests: {}", e),
        }
    }
    ids.sort();
    ids.dedup();
    ids
}

/// Load and describe every test passing `filter`, sorted by id
pub fn list(loader: &mut TestLoader, filter: &ListFilter) -> Vec<TestDescriptor> {
    // Loading mutates the store, describing does not
    let loaded: Vec<(String, SharedTest)> = all_ids(loader)
        .into_iter()
        .filter_map(|id| match loader.load(&id) {
            Ok(test) => Some((id, test)),
            Err(e) => {
                debug!(test_id = %id, "Skipping unloadable test: {}", e);
                None
            }
        })
        .collect();

    let mut descriptors: Vec<TestDescriptor> = loaded
        .par_iter()
        .map(|(id, test)| TestDescriptor::from_test(id, test))
        .filter(|d| filter.accepts(d))
        .collect();
    descriptors.sort_by(|a, b| a.id.cmp(&b.id));
    descriptors
}

/// Describe one test without running it
pub fn describe(loader: &mut TestLoader, id: &str) -> Result<TestDescriptor> {
    let test = loader.load(id)?;
    Ok(TestDescriptor::from_test(id, &test))
}
