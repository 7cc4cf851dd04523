//! Error Taxonomy
//!
//! Every failure the registry, loader, lifecycle and comparison runner can
//! surface. Nothing in the engine retries: errors go straight to the caller.

use thiserror::Error;

/// Convenience alias used across the TestGrid crates
pub type Result<T, E = TestError> = std::result::Result<T, E>;

/// Boxed cause attached to load failures
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced while resolving, validating, running or merging tests
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestError {
    /// Identifier syntax is invalid (no namespace separator, empty segment, ...)
    #[error("Malformed test identifier '{raw}': {reason}")]
    MalformedIdentifier {
        /// The raw identifier as supplied
        raw: String,
        /// Why it was rejected
        reason: String,
    },

    /// Resolution failed at some loader tier
    #[error("Failed to load test '{test_id}': {message}")]
    LoadTest {
        /// Identifier that could not be resolved
        test_id: String,
        /// Human-readable cause
        message: String,
        /// Originating error, if any
        #[source]
        source: Option<BoxedCause>,
    },

    /// A declared required input role has no bound value
    #[error("Missing required input '{role}' for test '{test_id}'")]
    MissingRequiredInput {
        /// Test being validated
        test_id: String,
        /// First unmet role
        role: String,
    },

    /// A bound input is present but unusable (wrong kind, missing column, ...)
    #[error("Invalid input '{role}': {message}")]
    InvalidInput {
        /// Role or input id concerned
        role: String,
        /// What went wrong
        message: String,
    },

    /// A parameter could not be read as the requested type
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParam {
        /// Parameter name
        name: String,
        /// What went wrong
        message: String,
    },

    /// Error raised by the test implementation itself, passed through unchanged
    #[error(transparent)]
    Run(anyhow::Error),

    /// A lifecycle instance was asked to run a second time
    #[error("Test '{test_id}' has already run; create a new instance to run it again")]
    AlreadyRun {
        /// Test identifier
        test_id: String,
    },

    /// Render/log requested before a result was attached
    #[error("Test '{test_id}' has no result yet; run it first")]
    NotRun {
        /// Test identifier
        test_id: String,
    },

    /// The implementation produced neither a value nor any figure
    #[error("Test '{test_id}' produced no value and no figures")]
    EmptyResult {
        /// Test identifier
        test_id: String,
    },

    /// Grid and plain arguments overlap, or arguments are otherwise inconsistent
    #[error("Conflicting arguments: {0}")]
    ConflictingArguments(String),

    /// Comparison results do not share the shape of the first run
    #[error("Cannot merge results for '{test_id}': run {run_index} {detail}")]
    MergeShapeMismatch {
        /// Test identifier
        test_id: String,
        /// Index of the first offending run in the plan
        run_index: usize,
        /// Description of the divergence
        detail: String,
    },
}

impl TestError {
    /// Build a load error without an underlying cause
    pub fn load(test_id: impl Into<String>, message: impl Into<String>) -> Self {
        TestError::LoadTest {
            test_id: test_id.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Build a load error wrapping the error that caused it
    pub fn load_with_source(
        test_id: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<BoxedCause>,
    ) -> Self {
        TestError::LoadTest {
            test_id: test_id.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Build a malformed-identifier error
    pub fn malformed(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        TestError::MalformedIdentifier {
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from the implementation rather than the engine
    pub fn is_implementation_error(&self) -> bool {
        matches!(self, TestError::Run(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_load_error_keeps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = TestError::load_with_source("ns.a.Leaf", "provider failed", io);

        assert!(err.to_string().contains("ns.a.Leaf"));
        let cause = err.source().expect("cause attached");
        assert_eq!(cause.to_string(), "no such file");
    }

    #[test]
    fn test_run_error_is_transparent() {
        let err = TestError::Run(anyhow::anyhow!("singular matrix"));
        assert_eq!(err.to_string(), "singular matrix");
        assert!(err.is_implementation_error());
    }
}
