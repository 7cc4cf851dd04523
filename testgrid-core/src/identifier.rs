//! Test Identifiers
//!
//! A test identifier names one implementation:
//!
//! ```text
//! validmind.data_validation.ClassImbalance:train
//! ───┬───── ──────┬──────── ──────┬─────── ──┬──
//! namespace     path            leaf      suffix
//! ```
//!
//! The namespace selects the provider, the suffix disambiguates several
//! results produced by the same test. Identifiers serialize as their raw
//! string, so they round-trip through JSON without loss.

use crate::error::{Result, TestError};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Namespace of the tests that ship with the framework
pub const BUILTIN_NAMESPACE: &str = "validmind";

/// First path segment reserved for composite metrics
pub const COMPOSITE_PREFIX: &str = "composite_metric";

/// Parsed, validated test identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId {
    namespace: String,
    path: Vec<String>,
    leaf: String,
    suffix: Option<String>,
}

fn segment_re() -> &'static Regex {
    static SEGMENT_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: this regex literal is guaranteed to compile
    SEGMENT_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

fn namespace_re() -> &'static Regex {
    static NAMESPACE_RE: OnceLock<Regex> = OnceLock::new();
    // Safety: this regex literal is guaranteed to compile
    NAMESPACE_RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").unwrap())
}

/// Split a raw identifier into its body and optional `:suffix`.
///
/// Only the first `:` separates the suffix; the rest is kept verbatim.
pub fn split_suffix(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once(':') {
        Some((body, suffix)) => (body, Some(suffix)),
        None => (raw, None),
    }
}

/// Leaf name of a raw identifier: the text after the last `.`, suffix removed.
///
/// Works on identifiers that are not well-formed (custom registrations may
/// use bare names such as `"m1"`).
pub fn leaf_name(raw: &str) -> &str {
    let (body, _) = split_suffix(raw);
    body.rsplit('.').next().unwrap_or(body)
}

impl TestId {
    /// Parse a raw identifier
    pub fn parse(raw: &str) -> Result<Self> {
        let (body, suffix) = split_suffix(raw);

        let suffix = match suffix {
            Some(s) if s.is_empty() => {
                return Err(TestError::malformed(raw, "result suffix after ':' is empty"));
            }
            Some(s) if s.chars().any(char::is_whitespace) => {
                return Err(TestError::malformed(raw, "result suffix contains whitespace"));
            }
            Some(s) => Some(s.to_string()),
            None => None,
        };

        let (namespace, rest) = body
            .split_once('.')
            .ok_or_else(|| TestError::malformed(raw, "missing namespace separator '.'"))?;

        if !namespace_re().is_match(namespace) {
            return Err(TestError::malformed(
                raw,
                format!("invalid namespace '{}'", namespace),
            ));
        }

        let mut segments: Vec<String> = Vec::new();
        for segment in rest.split('.') {
            if segment.is_empty() {
                return Err(TestError::malformed(raw, "empty path segment"));
            }
            if !segment_re().is_match(segment) {
                return Err(TestError::malformed(
                    raw,
                    format!("invalid path segment '{}'", segment),
                ));
            }
            segments.push(segment.to_string());
        }

        // rest is non-empty after the checks above, so pop always succeeds
        let leaf = segments
            .pop()
            .ok_or_else(|| TestError::malformed(raw, "missing test name"))?;

        Ok(Self {
            namespace: namespace.to_string(),
            path: segments,
            leaf,
            suffix,
        })
    }

    /// Build an identifier from parts, validating them like [`TestId::parse`]
    pub fn from_parts<I, S>(namespace: &str, path: I, leaf: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut raw = String::from(namespace);
        for segment in path {
            raw.push('.');
            raw.push_str(segment.as_ref());
        }
        raw.push('.');
        raw.push_str(leaf);
        Self::parse(&raw)
    }

    /// Provider namespace (left of the first `.`)
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Segments between namespace and leaf
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Final segment, the test's class/function name
    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    /// Result disambiguation suffix
    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }

    /// Identifier text without the result suffix
    pub fn base_id(&self) -> String {
        let mut out = self.namespace.clone();
        for segment in &self.path {
            out.push('.');
            out.push_str(segment);
        }
        out.push('.');
        out.push_str(&self.leaf);
        out
    }

    /// Identifier text without namespace and suffix, as handed to providers
    pub fn provider_path(&self) -> String {
        let mut parts: Vec<&str> = self.path.iter().map(String::as_str).collect();
        parts.push(&self.leaf);
        parts.join(".")
    }

    /// Copy of this identifier carrying `suffix`
    pub fn with_suffix(&self, suffix: &str) -> Result<Self> {
        Self::parse(&format!("{}:{}", self.base_id(), suffix))
    }

    /// Copy of this identifier with the suffix removed
    pub fn without_suffix(&self) -> Self {
        Self {
            suffix: None,
            ..self.clone()
        }
    }

    /// Whether the identifier lives in the built-in namespace
    pub fn is_builtin(&self) -> bool {
        self.namespace == BUILTIN_NAMESPACE
    }

    /// Whether the identifier names a composite metric
    pub fn is_composite(&self) -> bool {
        self.path.first().map(String::as_str) == Some(COMPOSITE_PREFIX)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_id())?;
        if let Some(suffix) = &self.suffix {
            write!(f, ":{}", suffix)?;
        }
        Ok(())
    }
}

impl FromStr for TestId {
    type Err = TestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for TestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TestId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_identifier() {
        let id = TestId::parse("validmind.data_validation.ClassImbalance:train").unwrap();
        assert_eq!(id.namespace(), "validmind");
        assert_eq!(id.path(), ["data_validation".to_string()]);
        assert_eq!(id.leaf(), "ClassImbalance");
        assert_eq!(id.suffix(), Some("train"));
        assert_eq!(id.base_id(), "validmind.data_validation.ClassImbalance");
        assert_eq!(id.provider_path(), "data_validation.ClassImbalance");
        assert!(id.is_builtin());
    }

    #[test]
    fn test_round_trip() {
        for raw in [
            "ns.Leaf",
            "ns.a.b.Leaf",
            "validmind.model_validation.sklearn.ClassifierPerformance",
            "my-tests.checks.RowCount:holdout_2",
        ] {
            let id = TestId::parse(raw).unwrap();
            assert_eq!(id.to_string(), raw);
        }
    }

    #[test]
    fn test_missing_namespace_separator() {
        let err = TestId::parse("ClassImbalance").unwrap_err();
        assert!(matches!(err, TestError::MalformedIdentifier { .. }));

        // Suffix is stripped before the namespace check
        assert!(TestId::parse("Leaf:with.dot").is_err());
    }

    #[test]
    fn test_rejects_bad_segments() {
        assert!(TestId::parse("ns..Leaf").is_err());
        assert!(TestId::parse("ns.a.").is_err());
        assert!(TestId::parse("ns.a b.Leaf").is_err());
        assert!(TestId::parse("ns.Leaf:").is_err());
        assert!(TestId::parse(".a.Leaf").is_err());
    }

    #[test]
    fn test_composite_detection() {
        let id = TestId::parse("validmind.composite_metric.PerfSummary").unwrap();
        assert!(id.is_composite());
        assert!(!TestId::parse("validmind.unit_metrics.F1").unwrap().is_composite());
    }

    #[test]
    fn test_leaf_name_of_bare_ids() {
        assert_eq!(leaf_name("m1"), "m1");
        assert_eq!(leaf_name("ns.unit.Accuracy:x"), "Accuracy");
    }

    #[test]
    fn test_serde_as_string() {
        let id = TestId::parse("ns.a.Leaf:s").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ns.a.Leaf:s\"");
        let back: TestId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<TestId>("\"nodot\"").is_err());
    }

    #[test]
    fn test_with_suffix() {
        let id = TestId::parse("ns.a.Leaf").unwrap();
        let tagged = id.with_suffix("v2").unwrap();
        assert_eq!(tagged.to_string(), "ns.a.Leaf:v2");
        assert_eq!(tagged.without_suffix(), id);
    }
}
