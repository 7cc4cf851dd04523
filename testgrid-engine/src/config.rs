//! Configuration loading from testgrid.toml
//!
//! TestGrid configuration can be specified in a `testgrid.toml` file in the project root.
//! The configuration is automatically discovered by walking up from the current directory.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use testgrid_report::OutputFormat;
use thiserror::Error;

/// Name of the discovered configuration file
pub const CONFIG_FILE_NAME: &str = "testgrid.toml";

/// Errors loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// TestGrid configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GridConfig {
    /// Test catalog configuration
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Runner configuration
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,
    /// Composite metric persistence
    #[serde(default)]
    pub composites: CompositesConfig,
}

/// Catalog configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    /// Local filesystem providers: namespace -> root directory
    #[serde(default)]
    pub providers: BTreeMap<String, PathBuf>,
}

/// Runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Show a progress bar during comparison runs
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
    /// Memoize single runs by identifier, inputs and params
    #[serde(default)]
    pub memoize: bool,
    /// Stop a suite at the first failing entry
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            show_progress: default_show_progress(),
            memoize: false,
            fail_fast: false,
        }
    }
}

fn default_show_progress() -> bool {
    true
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format: human, json, csv, markdown
    #[serde(default)]
    pub format: OutputFormat,
    /// Directory result payloads are logged to
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            directory: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("target/testgrid")
}

/// Composite metric persistence
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompositesConfig {
    /// Directory for persisted definitions; in-memory when unset
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl GridConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let dir = std::env::current_dir().ok()?;
        Self::discover_from(&dir)
    }

    /// Walk up from `start` looking for `testgrid.toml`
    pub fn discover_from(start: &Path) -> Option<Self> {
        let mut dir = start.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return match Self::load(&config_path) {
                    Ok(config) => Some(config),
                    Err(e) => {
                        tracing::warn!("Ignoring invalid configuration: {}", e);
                        None
                    }
                };
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Make provider roots and the composite store relative to the config file
    fn resolve_relative_to(&mut self, base: &Path) {
        for root in self.catalog.providers.values_mut() {
            if root.is_relative() {
                *root = base.join(&*root);
            }
        }
        if let Some(store) = &mut self.composites.store_path {
            if store.is_relative() {
                *store = base.join(&*store);
            }
        }
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# TestGrid Configuration
# https://github.com/ml-rust/testgrid

[catalog]
# Local test providers: namespace = "directory of declarative .toml tests"
# providers = { my_tests = "tests/grid" }

[runner]
# Show a progress bar during comparison runs
show_progress = true
# Memoize single runs keyed by identifier, input ids and params
memoize = false
# Stop a suite at the first failing test
fail_fast = false

[output]
# Default output format: human, json, csv, markdown
format = "human"
# Directory result payloads are logged to
directory = "target/testgrid"

[composites]
# Persist composite metric definitions here (uncomment to enable; in-memory otherwise)
# store_path = "target/testgrid/composites"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GridConfig::default();
        assert!(config.runner.show_progress);
        assert!(!config.runner.memoize);
        assert_eq!(config.output.format, OutputFormat::Human);
        assert!(config.catalog.providers.is_empty());
        assert!(config.composites.store_path.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [catalog]
            providers = { acme = "/opt/acme-tests" }

            [runner]
            fail_fast = true

            [output]
            format = "markdown"
        "#;

        let config: GridConfig = toml::from_str(toml_str).unwrap();
        assert!(config.runner.fail_fast);
        assert_eq!(config.output.format, OutputFormat::Markdown);
        assert_eq!(
            config.catalog.providers.get("acme"),
            Some(&PathBuf::from("/opt/acme-tests"))
        );
        // Defaults should still apply
        assert!(config.runner.show_progress);
        assert_eq!(config.output.directory, PathBuf::from("target/testgrid"));
    }

    #[test]
    fn test_default_toml_parses() {
        let config: GridConfig = toml::from_str(&GridConfig::default_toml()).unwrap();
        assert!(config.runner.show_progress);
        assert_eq!(config.output.format, OutputFormat::Human);
    }

    #[test]
    fn test_discover_walks_up_and_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[catalog]\nproviders = { acme = \"grid\" }\n[composites]\nstore_path = \"defs\"\n",
        )
        .unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = GridConfig::discover_from(&nested).unwrap();
        assert_eq!(config.catalog.providers["acme"], dir.path().join("grid"));
        assert_eq!(config.composites.store_path, Some(dir.path().join("defs")));
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[runner]\nfail_fast = \"yes\"\n").unwrap();
        assert!(matches!(GridConfig::load(&path), Err(ConfigError::Parse { .. })));
    }
}
