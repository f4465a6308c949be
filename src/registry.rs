//! Mock Table
//!
//! The process-wide map from `(namespace, command)` to [`MockRecord`]. The
//! table is shared between the engine and every installed dispatch shim.
//! The lock is never held while user code (filters, mock bodies, original
//! commands) or host rebinding runs, so a mock body may call other mocked
//! commands.

use crate::dispatch::Dispatcher;
use crate::error::{MockError, Result};
use crate::filter::ParameterFilter;
use crate::host::{CommandRef, Host, SessionId};
use crate::mock::{MockBody, MockKey, MockRecord};
use crate::resolver::resolve;
use crate::scope::ScopeId;
use crate::shim::DispatchShim;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// One `Mock` declaration.
#[derive(Debug, Clone)]
pub struct MockDeclaration {
    pub command: String,
    pub namespace: Option<String>,
    pub body: MockBody,
    pub filter: ParameterFilter,
    pub verifiable: bool,
}

impl MockDeclaration {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            namespace: None,
            body: MockBody::default(),
            filter: ParameterFilter::always(),
            verifiable: false,
        }
    }

    pub fn body(mut self, body: MockBody) -> Self {
        self.body = body;
        self
    }

    /// Replace the command with one returning `value`.
    pub fn returns(self, value: impl Into<crate::value::Value>) -> Self {
        self.body(MockBody::returns(value))
    }

    pub fn filter(mut self, filter: ParameterFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn verifiable(mut self) -> Self {
        self.verifiable = true;
        self
    }

    /// Mock the command as seen from inside `module`.
    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.namespace = Some(module.into());
        self
    }

    pub fn key(&self) -> MockKey {
        MockKey::new(self.namespace.as_deref(), &self.command)
    }
}

/// Shared handle to the mock table.
#[derive(Clone, Default)]
pub struct MockTable {
    records: Arc<Mutex<HashMap<MockKey, MockRecord>>>,
}

impl MockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, HashMap<MockKey, MockRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, key: &MockKey) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn keys(&self) -> Vec<MockKey> {
        let mut keys: Vec<MockKey> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Run `f` against the record for `key`, if there is one.
    pub fn with_record<R>(&self, key: &MockKey, f: impl FnOnce(&MockRecord) -> R) -> Option<R> {
        self.lock().get(key).map(f)
    }

    pub fn with_record_mut<R>(
        &self,
        key: &MockKey,
        f: impl FnOnce(&mut MockRecord) -> R,
    ) -> Option<R> {
        self.lock().get_mut(key).map(f)
    }

    /// The stored original behind the shim bound as `shim_name`, if any.
    pub fn original_for_shim(&self, shim_name: &str) -> Option<CommandRef> {
        self.lock()
            .values()
            .find(|record| record.shim_name.eq_ignore_ascii_case(shim_name))
            .map(|record| record.original.clone())
    }

    /// Declare a mock block. The first declaration for a key resolves the
    /// command and installs the dispatch shim; later ones only add a block.
    pub fn register(
        &self,
        host: &dyn Host,
        dispatcher: &Dispatcher,
        declaration: MockDeclaration,
        scope: Option<ScopeId>,
    ) -> Result<()> {
        let key = declaration.key();
        let MockDeclaration {
            command,
            namespace,
            body,
            filter,
            verifiable,
        } = declaration;

        let added = self.with_record_mut(&key, |record| {
            record.add_block(filter.clone(), body.clone(), verifiable, scope)
        });
        if added.is_some() {
            tracing::debug!(mock = %key, filter = filter.description(), "added mock block");
            return Ok(());
        }

        let resolved = resolve(host, self, &command, namespace.as_deref())?;
        let shim_name = shim_name(&dispatcher.config().shim_prefix, &key);
        let mut record = MockRecord::new(
            key.clone(),
            &command,
            namespace.as_deref(),
            resolved.command,
            resolved.session,
            shim_name,
            scope,
        );
        record.add_block(filter, body, verifiable, scope);

        let shim: CommandRef = Arc::new(DispatchShim::new(
            key.clone(),
            &record.shim_name,
            &record.signature,
            dispatcher.clone(),
        ));
        install(host, &mut record, shim)?;

        info!(
            mock = %key,
            shim = %record.shim_name,
            session = %record.session,
            aliases = ?record.aliases,
            "installed dispatch shim"
        );
        self.lock().insert(key, record);
        Ok(())
    }

    /// Remove the mock for `key` and restore the host's bindings. Safe to
    /// call when the mock is already gone; returns whether anything was
    /// removed. Host failures are logged and skipped.
    pub fn unregister(&self, host: &dyn Host, key: &MockKey) -> bool {
        let record = match self.lock().remove(key) {
            Some(record) => record,
            None => return false,
        };
        uninstall(host, &record);
        info!(mock = %key, calls = record.history.len(), "removed mock");
        true
    }
}

/// Synthetic name the shim for `key` is bound under. Module mocks carry a
/// `module_` marker so they never collide with a global mock.
fn shim_name(prefix: &str, key: &MockKey) -> String {
    match key.namespace() {
        Some(module) => format!("{}_module_{}_{}", prefix, module, key.name()),
        None => format!("{}_{}_{}", prefix, SessionId::GLOBAL, key.name()),
    }
}

/// Bind the shim under its synthetic name and route the command's names to
/// it. On failure everything already installed is rolled back.
fn install(host: &dyn Host, record: &mut MockRecord, shim: CommandRef) -> Result<()> {
    let session = record.session.clone();
    host.bind(&session, &record.shim_name, shim)?;

    let mut aliases = vec![record.command_name.clone()];
    if let Some(module) = &record.signature.module {
        if record.signature.name.eq_ignore_ascii_case(&record.command_name) {
            aliases.push(format!("{}\\{}", module, record.signature.name));
        }
    }

    for alias in aliases {
        match host.set_alias(&session, &alias, &record.shim_name) {
            Ok(displaced) => {
                if alias == record.command_name {
                    record.displaced_alias = displaced;
                }
                record.aliases.push(alias);
            }
            Err(e) => {
                uninstall(host, record);
                return Err(MockError::Host(e));
            }
        }
    }
    Ok(())
}

fn uninstall(host: &dyn Host, record: &MockRecord) {
    let session = &record.session;
    for alias in &record.aliases {
        if let Err(e) = host.remove_alias(session, alias) {
            warn!(alias = %alias, error = %e, "failed to remove mock alias");
        }
    }
    if let Some(target) = &record.displaced_alias {
        if let Err(e) = host.set_alias(session, &record.command_name, target) {
            warn!(alias = %record.command_name, error = %e, "failed to restore displaced alias");
        }
    }
    if let Err(e) = host.unbind(session, &record.shim_name) {
        warn!(shim = %record.shim_name, error = %e, "failed to unbind dispatch shim");
    }
}
