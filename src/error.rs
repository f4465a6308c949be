//! Error types for mock registration, dispatch and verification.

use crate::host::HostError;
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Errors surfaced by the mocking engine.
#[derive(Debug, Error)]
pub enum MockError {
    /// A command, module or mock could not be found.
    #[error("{what}")]
    NotFound { what: String },

    /// Alias indirection loops back on itself.
    #[error("alias cycle: {}", .chain.join(" -> "))]
    AliasCycle { chain: Vec<String> },

    /// A malformed scope descriptor was passed to an assertion.
    #[error("Parameter Scope must be one of 'Describe', 'Context', 'It', or a non-negative integer, got '{0}'")]
    InvalidScopeArgument(String),

    /// A verification did not hold.
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    /// A dispatch shim fired for a command with no mock record. Always a
    /// lifecycle bug: the shim outlived its record.
    #[error("internal error: dispatch shim invoked for '{key}' but no mock is registered")]
    InternalInconsistency { key: String },

    /// A parameter filter returned something other than a boolean.
    #[error("parameter filter {filter} returned {found}, expected a boolean")]
    NonBooleanFilter { filter: String, found: String },

    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// Errors raised by user code (filters, mock bodies, original commands),
    /// passed through untouched.
    #[error(transparent)]
    Script(#[from] anyhow::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl MockError {
    pub fn not_found(what: impl Into<String>) -> Self {
        MockError::NotFound { what: what.into() }
    }

    /// The assertion failure, if this error is one.
    pub fn as_assertion(&self) -> Option<&AssertionFailure> {
        match self {
            MockError::Assertion(failure) => Some(failure),
            _ => None,
        }
    }

    /// Wrap an error raised by user code. Engine errors that travelled
    /// through user code (a mock body calling another mocked command) are
    /// recovered rather than wrapped.
    pub fn from_script(err: anyhow::Error) -> Self {
        match err.downcast::<MockError>() {
            Ok(inner) => inner,
            Err(err) => MockError::Script(err),
        }
    }

    /// Convert into an error for user code, unwrapping script errors so they
    /// surface unchanged.
    pub fn into_script(self) -> anyhow::Error {
        match self {
            MockError::Script(inner) => inner,
            other => anyhow::Error::new(other),
        }
    }

    /// Fatal errors must abort the whole run rather than the current test.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MockError::InternalInconsistency { .. })
    }
}

/// What a failed verification expected and found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Call count did not satisfy `times` (exactly or at least).
    CallCount {
        expected: usize,
        actual: usize,
        exactly: bool,
    },
    /// Exclusive filter was violated by some calls.
    Exclusive { non_matching: usize },
    /// Verifiable mocks that were never invoked.
    UnmetVerifiable { mocks: Vec<UnmetMock> },
}

/// One verifiable block that never matched a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnmetMock {
    pub command: String,
    pub filter: String,
}

/// A verification failure, with the location of the assertion call.
#[derive(Debug, Clone)]
pub struct AssertionFailure {
    pub kind: FailureKind,
    pub message: String,
    pub location: &'static Location<'static>,
}

impl AssertionFailure {
    pub fn new(kind: FailureKind, message: String, location: &'static Location<'static>) -> Self {
        Self {
            kind,
            message,
            location,
        }
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (at {}:{})",
            self.message,
            self.location.file(),
            self.location.line()
        )
    }
}

impl std::error::Error for AssertionFailure {}

pub type Result<T> = std::result::Result<T, MockError>;
