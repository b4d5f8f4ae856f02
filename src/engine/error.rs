use thiserror::Error;

use crate::domain::{DefinitionError, ReqDbError, StepLookupError, TestError};

/// A programming-contract violation: the scenario context does not allow
/// the requested operation.
///
/// The session dumps the building context and the execution stack through
/// the error log before handing one out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid scenario context: {message}")]
pub struct ContextError {
    message: String,
}

impl ContextError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// What was wrong with the context.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised by the scenario engine.
///
/// Test errors are not engine errors: they are recorded in execution
/// records. These are the failures that abort a run.
#[derive(Debug, Error)]
pub enum Error {
    /// Contract violation.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// Invalid definition.
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// Requirement database failure.
    #[error(transparent)]
    ReqDb(#[from] ReqDbError),

    /// A step specification could not be resolved.
    #[error(transparent)]
    StepLookup(#[from] StepLookupError),

    /// `covers` and `verifies` need at least one link.
    #[error("at least one requirement link specification is required")]
    NoLinkSpecification,

    /// A test error other than a known issue was raised while building.
    #[error("scenario '{scenario}' failed while building: {error}")]
    Build {
        /// The scenario being built.
        scenario: String,
        /// The error raised.
        error: TestError,
    },

    /// A main scenario lacks an attribute the configuration expects.
    #[error("scenario '{scenario}' misses the expected attribute '{attribute}'")]
    MissingAttribute {
        /// The scenario.
        scenario: String,
        /// The missing attribute.
        attribute: String,
    },
}
