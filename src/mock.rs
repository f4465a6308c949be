//! Mock Records
//!
//! A [`MockRecord`] holds everything needed to intercept one command: the
//! original command and its signature, the declared [`MockBlock`]s, the call
//! history and the aliases routing calls to the shim.

use crate::args::CallArgs;
use crate::filter::ParameterFilter;
use crate::host::{CommandRef, SessionId};
use crate::scope::ScopeId;
use crate::signature::Signature;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Registry key: the namespace a mock was declared for plus the command
/// name, both compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MockKey {
    namespace: Option<String>,
    name: String,
}

impl MockKey {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace
                .filter(|ns| !ns.is_empty())
                .map(str::to_ascii_lowercase),
            name: name.to_ascii_lowercase(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for MockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}\\{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// What a mock body sees when it runs.
#[derive(Debug)]
pub struct MockInvocation<'a> {
    pub command: &'a str,
    pub args: &'a CallArgs,
    /// The streamed item being processed, if the call came from a pipeline
    pub input: Option<&'a Value>,
    /// Session the original command lives in
    pub session: &'a SessionId,
}

type BodyFn = dyn Fn(&MockInvocation<'_>) -> anyhow::Result<Value> + Send + Sync;

/// The stand-in implementation of a mock block. A `$null` result emits
/// nothing.
#[derive(Clone)]
pub struct MockBody(Arc<BodyFn>);

impl MockBody {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&MockInvocation<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        MockBody(Arc::new(body))
    }

    /// A body that always returns `value`.
    pub fn returns(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::new(move |_| Ok(value.clone()))
    }

    pub fn call(&self, invocation: &MockInvocation<'_>) -> anyhow::Result<Value> {
        (self.0)(invocation)
    }
}

impl Default for MockBody {
    fn default() -> Self {
        Self::returns(Value::Null)
    }
}

impl fmt::Debug for MockBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MockBody")
    }
}

/// One declared behavior for a mocked command.
#[derive(Debug, Clone)]
pub struct MockBlock {
    /// Stable within a record, so a block can be found again after the
    /// table lock was released
    pub id: u64,
    pub filter: ParameterFilter,
    pub body: MockBody,
    /// Still waiting to be matched by a call
    pub verifiable: bool,
    /// Group the block was declared in
    pub scope: Option<ScopeId>,
}

/// One intercepted call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub args: CallArgs,
    /// Group the call is attributed to. `None` while the test case that
    /// made the call is still running.
    pub scope: Option<ScopeId>,
}

/// Everything the engine knows about one mocked command.
pub struct MockRecord {
    pub key: MockKey,
    /// Command name as the user wrote it
    pub command_name: String,
    pub namespace: Option<String>,
    pub original: CommandRef,
    pub session: SessionId,
    pub signature: Signature,
    /// Filtered blocks after all default blocks; newest of each group last
    pub blocks: Vec<MockBlock>,
    pub history: Vec<CallRecord>,
    pub shim_name: String,
    /// Aliases routed to the shim, removed on teardown
    pub aliases: Vec<String>,
    /// Alias target displaced by the bare-name alias, restored on teardown
    pub displaced_alias: Option<String>,
    pub scope: Option<ScopeId>,
    next_block_id: u64,
}

impl MockRecord {
    pub fn new(
        key: MockKey,
        command_name: &str,
        namespace: Option<&str>,
        original: CommandRef,
        session: SessionId,
        shim_name: String,
        scope: Option<ScopeId>,
    ) -> Self {
        let signature = original.signature().clone();
        Self {
            key,
            command_name: command_name.to_string(),
            namespace: namespace.map(str::to_string),
            original,
            session,
            signature,
            blocks: Vec::new(),
            history: Vec::new(),
            shim_name,
            aliases: Vec::new(),
            displaced_alias: None,
            scope,
            next_block_id: 0,
        }
    }

    /// Add a block, keeping every filtered block ahead of the default ones
    /// in matching order.
    pub fn add_block(
        &mut self,
        filter: ParameterFilter,
        body: MockBody,
        verifiable: bool,
        scope: Option<ScopeId>,
    ) -> u64 {
        let id = self.next_block_id;
        self.next_block_id += 1;
        let block = MockBlock {
            id,
            filter,
            body,
            verifiable,
            scope,
        };
        if block.filter.is_default() {
            let defaults = self
                .blocks
                .iter()
                .take_while(|b| b.filter.is_default())
                .count();
            self.blocks.insert(defaults, block);
        } else {
            self.blocks.push(block);
        }
        id
    }

    /// Blocks in the order calls are matched against them.
    pub fn matching_order(&self) -> impl Iterator<Item = &MockBlock> {
        self.blocks.iter().rev()
    }

    pub fn block_mut(&mut self, id: u64) -> Option<&mut MockBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    /// Name used in messages, e.g. `Get-Item` or `Get-Item in module Storage`.
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{} in module {}", self.command_name, ns),
            None => self.command_name.clone(),
        }
    }
}

impl fmt::Debug for MockRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRecord")
            .field("key", &self.key)
            .field("session", &self.session)
            .field("shim_name", &self.shim_name)
            .field("blocks", &self.blocks.len())
            .field("history", &self.history.len())
            .field("aliases", &self.aliases)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FnCommand;

    fn record() -> MockRecord {
        let original: CommandRef = Arc::new(FnCommand::new(Signature::cmdlet("Get-Item"), |_, _| {
            Ok(Vec::new())
        }));
        MockRecord::new(
            MockKey::new(None, "Get-Item"),
            "Get-Item",
            None,
            original,
            SessionId::global(),
            "MockShim_global_get-item".into(),
            None,
        )
    }

    fn order(record: &MockRecord) -> Vec<u64> {
        record.matching_order().map(|b| b.id).collect()
    }

    #[test]
    fn test_filtered_blocks_precede_defaults() {
        let mut rec = record();
        let default_a = rec.add_block(ParameterFilter::always(), MockBody::default(), false, None);
        let filtered_a = rec.add_block(
            ParameterFilter::equals([("Path", "a")]),
            MockBody::default(),
            false,
            None,
        );
        let default_b = rec.add_block(ParameterFilter::always(), MockBody::default(), false, None);
        let filtered_b = rec.add_block(
            ParameterFilter::equals([("Path", "b")]),
            MockBody::default(),
            false,
            None,
        );

        assert_eq!(order(&rec), vec![filtered_b, filtered_a, default_b, default_a]);
    }

    #[test]
    fn test_key_is_case_insensitive() {
        assert_eq!(
            MockKey::new(Some("Storage"), "Get-Item"),
            MockKey::new(Some("storage"), "GET-ITEM")
        );
        assert_eq!(MockKey::new(Some(""), "x"), MockKey::new(None, "x"));
        assert_eq!(MockKey::new(Some("Storage"), "Get-Item").to_string(), "storage\\get-item");
    }
}
