//! Mock Engine
//!
//! [`MockEngine`] is the context object every mocking operation goes
//! through. It ties the host's command table, the live test-scope stack and
//! the shared mock table together. A host integration creates one engine for
//! the lifetime of a test run.
//!
//! # Example
//!
//! ```ignore
//! let engine = MockEngine::new(host.clone(), scopes.clone());
//!
//! engine.mock(
//!     MockDeclaration::new("Get-Item")
//!         .returns("A")
//!         .filter(ParameterFilter::equals([("Path", "/tmp")])),
//! )?;
//!
//! host.invoke(None, "Get-Item", &CallArgs::new().with("Path", "/tmp"), &[])?;
//!
//! engine.assert_called(&CallAssertion::new("Get-Item").times(1).exactly())?;
//! ```

use crate::config::MockConfig;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::host::Host;
use crate::lifecycle::{self, GroupExit};
use crate::mock::{CallRecord, MockKey};
use crate::registry::{MockDeclaration, MockTable};
use crate::scope::ScopeProvider;
use crate::verify::{self, CallAssertion, CallCounts};
use std::panic::Location;
use std::sync::Arc;

#[derive(Clone)]
pub struct MockEngine {
    host: Arc<dyn Host>,
    dispatcher: Dispatcher,
}

impl MockEngine {
    pub fn new(host: Arc<dyn Host>, scopes: Arc<dyn ScopeProvider>) -> Self {
        Self::with_config(host, scopes, MockConfig::default())
    }

    pub fn with_config(
        host: Arc<dyn Host>,
        scopes: Arc<dyn ScopeProvider>,
        config: MockConfig,
    ) -> Self {
        let dispatcher = Dispatcher::new(MockTable::new(), scopes, Arc::new(config));
        Self { host, dispatcher }
    }

    pub fn table(&self) -> &MockTable {
        self.dispatcher.table()
    }

    pub fn config(&self) -> &MockConfig {
        self.dispatcher.config()
    }

    fn scopes(&self) -> &dyn ScopeProvider {
        self.dispatcher.scopes().as_ref()
    }

    /// Declare a mock block for a command.
    pub fn mock(&self, declaration: MockDeclaration) -> Result<()> {
        let scope = self.scopes().current_scope();
        self.table()
            .register(self.host.as_ref(), &self.dispatcher, declaration, scope)
    }

    /// Remove a mock ahead of its scope's exit. Returns whether one existed.
    pub fn remove_mock(&self, command: &str, namespace: Option<&str>) -> bool {
        self.table()
            .unregister(self.host.as_ref(), &MockKey::new(namespace, command))
    }

    /// Remove every mock, restoring all host bindings.
    pub fn remove_all(&self) -> usize {
        let keys = self.table().keys();
        keys.iter()
            .filter(|key| self.table().unregister(self.host.as_ref(), key))
            .count()
    }

    /// Recorded calls to a mocked command, oldest first.
    pub fn call_history(&self, command: &str, namespace: Option<&str>) -> Option<Vec<CallRecord>> {
        self.table()
            .with_record(&MockKey::new(namespace, command), |record| {
                record.history.clone()
            })
    }

    /// Count calls an assertion would look at, without asserting.
    pub fn count_calls(&self, assertion: &CallAssertion) -> Result<CallCounts> {
        verify::count_calls(
            self.table(),
            self.scopes(),
            &self.config().extra_common_parameters,
            assertion,
        )
    }

    /// Fail unless the mocked command was called as `assertion` describes.
    #[track_caller]
    pub fn assert_called(&self, assertion: &CallAssertion) -> Result<CallCounts> {
        let location = Location::caller();
        verify::assert_called(
            self.table(),
            self.scopes(),
            &self.config().extra_common_parameters,
            assertion,
            location,
        )
    }

    /// Fail if any block declared verifiable has not matched a call.
    #[track_caller]
    pub fn assert_all_verifiable_called(&self) -> Result<()> {
        verify::assert_all_verifiable_called(self.table(), Location::caller())
    }

    /// Hook for the end of a test case.
    pub fn exit_test_case(&self) -> usize {
        lifecycle::exit_test_case(self.table(), self.scopes())
    }

    /// Hook for the end of a test group, before its frame is popped.
    pub fn exit_group(&self) -> GroupExit {
        lifecycle::exit_group(
            self.table(),
            self.host.as_ref(),
            self.scopes(),
            self.config(),
        )
    }
}
