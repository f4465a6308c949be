//! Call Verification
//!
//! Reads recorded call history to check how often a mocked command was
//! called, optionally restricted to calls matching a filter and to calls
//! attributed to a range of enclosing test groups.

use crate::error::{AssertionFailure, FailureKind, MockError, Result, UnmetMock};
use crate::filter::ParameterFilter;
use crate::mock::{CallRecord, MockKey};
use crate::registry::MockTable;
use crate::scope::{CallScope, ScopeProvider};
use crate::signature::Signature;
use std::panic::Location;

/// How recorded calls are split into matching and non-matching.
#[derive(Debug, Clone)]
pub enum CallFilter {
    /// Count calls matching the filter; others are ignored.
    Parameter(ParameterFilter),
    /// Count calls matching the filter; any other call fails the assertion.
    Exclusive(ParameterFilter),
}

impl CallFilter {
    pub fn filter(&self) -> &ParameterFilter {
        match self {
            CallFilter::Parameter(f) | CallFilter::Exclusive(f) => f,
        }
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, CallFilter::Exclusive(_))
    }
}

/// An `AssertCalled` request.
#[derive(Debug, Clone)]
pub struct CallAssertion {
    pub command: String,
    pub namespace: Option<String>,
    pub times: usize,
    pub exactly: bool,
    pub filter: CallFilter,
    /// Scope descriptor as given by the caller, validated before any lookup
    pub scope: Option<String>,
}

impl CallAssertion {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            namespace: None,
            times: 1,
            exactly: false,
            filter: CallFilter::Parameter(ParameterFilter::always()),
            scope: None,
        }
    }

    pub fn times(mut self, times: usize) -> Self {
        self.times = times;
        self
    }

    pub fn exactly(mut self) -> Self {
        self.exactly = true;
        self
    }

    pub fn filter(mut self, filter: ParameterFilter) -> Self {
        self.filter = CallFilter::Parameter(filter);
        self
    }

    pub fn exclusive(mut self, filter: ParameterFilter) -> Self {
        self.filter = CallFilter::Exclusive(filter);
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.namespace = Some(module.into());
        self
    }

    /// Scope descriptor: `It`, `Context`, `Describe` or a depth.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn in_scope(self, scope: CallScope) -> Self {
        self.scope(scope.to_string())
    }

    pub fn key(&self) -> MockKey {
        MockKey::new(self.namespace.as_deref(), &self.command)
    }

    fn call_scope(&self) -> Result<CallScope> {
        match &self.scope {
            Some(s) => s.parse(),
            None => Ok(CallScope::default()),
        }
    }

    fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{} in module {}", self.command, ns),
            None => self.command.clone(),
        }
    }
}

/// Recorded calls in scope, split by the assertion's filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub matching: usize,
    pub non_matching: usize,
}

/// Count the recorded calls an assertion looks at.
pub fn count_calls(
    table: &MockTable,
    scopes: &dyn ScopeProvider,
    extra_common: &[String],
    assertion: &CallAssertion,
) -> Result<CallCounts> {
    let scope = assertion.call_scope()?;
    let (history, signature): (Vec<CallRecord>, Signature) = table
        .with_record(&assertion.key(), |record| {
            (record.history.clone(), record.signature.clone())
        })
        .ok_or_else(|| {
            MockError::not_found(format!(
                "You did not declare a mock of the {} Command.",
                assertion.display_name()
            ))
        })?;

    let groups = scopes.scope_stack();
    let filter = assertion.filter.filter();
    let mut counts = CallCounts::default();
    for call in history.iter().filter(|c| scope.includes(c.scope, &groups)) {
        if filter.evaluate(&call.args, &signature, extra_common)? {
            counts.matching += 1;
        } else {
            counts.non_matching += 1;
        }
    }
    Ok(counts)
}

/// Check an assertion against recorded calls.
pub fn assert_called(
    table: &MockTable,
    scopes: &dyn ScopeProvider,
    extra_common: &[String],
    assertion: &CallAssertion,
    location: &'static Location<'static>,
) -> Result<CallCounts> {
    let counts = count_calls(table, scopes, extra_common, assertion)?;
    let name = assertion.display_name();
    let times = assertion.times;
    let actual = counts.matching;

    let failure = if (assertion.exactly || times == 0) && actual != times {
        Some(AssertionFailure::new(
            FailureKind::CallCount {
                expected: times,
                actual,
                exactly: true,
            },
            format!(
                "Expected {} to be called {} times exactly but was called {} times",
                name, times, actual
            ),
            location,
        ))
    } else if actual < times {
        Some(AssertionFailure::new(
            FailureKind::CallCount {
                expected: times,
                actual,
                exactly: false,
            },
            format!(
                "Expected {} to be called at least {} times but was called {} times",
                name, times, actual
            ),
            location,
        ))
    } else if assertion.filter.is_exclusive() && counts.non_matching > 0 {
        Some(AssertionFailure::new(
            FailureKind::Exclusive {
                non_matching: counts.non_matching,
            },
            format!(
                "Expected {} to only be called with parameter filter {}, but was called {} times with other arguments",
                name,
                assertion.filter.filter().description(),
                counts.non_matching
            ),
            location,
        ))
    } else {
        None
    };

    match failure {
        Some(failure) => Err(MockError::Assertion(failure)),
        None => Ok(counts),
    }
}

/// Fail listing every verifiable block that no call has matched yet.
pub fn assert_all_verifiable_called(
    table: &MockTable,
    location: &'static Location<'static>,
) -> Result<()> {
    let mut unmet = Vec::new();
    for key in table.keys() {
        table.with_record(&key, |record| {
            for block in record.blocks.iter().filter(|b| b.verifiable) {
                unmet.push(UnmetMock {
                    command: record.display_name(),
                    filter: block.filter.description().to_string(),
                });
            }
        });
    }

    if unmet.is_empty() {
        return Ok(());
    }

    let message = unmet
        .iter()
        .map(|m| format!("\n Expected {} to be called with {}", m.command, m.filter))
        .collect::<String>();
    Err(MockError::Assertion(AssertionFailure::new(
        FailureKind::UnmetVerifiable { mocks: unmet },
        message,
        location,
    )))
}
