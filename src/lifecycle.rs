//! Scope-exit handling for mocks and call history.
//!
//! The test-group system calls these hooks while the exiting scope is still
//! on its stack: [`exit_test_case`] when a test case finishes and
//! [`exit_group`] before a group frame is popped.

use crate::config::MockConfig;
use crate::host::Host;
use crate::mock::MockKey;
use crate::registry::MockTable;
use crate::scope::{ScopeKind, ScopeProvider};
use tracing::debug;

/// Attribute calls made by the finishing test case to its enclosing group.
/// Returns how many calls were attributed.
pub fn exit_test_case(table: &MockTable, scopes: &dyn ScopeProvider) -> usize {
    let group = scopes.current_scope();
    let mut attributed = 0;
    for record in table.lock().values_mut() {
        for call in record.history.iter_mut().filter(|c| c.scope.is_none()) {
            call.scope = group;
            attributed += 1;
        }
    }
    attributed
}

/// What an [`exit_group`] pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupExit {
    /// Mocks owned by the exiting group, torn down
    pub removed: Vec<MockKey>,
    /// Blocks declared in the exiting group, dropped from surviving mocks
    pub pruned_blocks: usize,
    /// Calls re-attributed to the parent group
    pub rehomed_calls: usize,
}

/// Tear down mocks owned by the innermost group and re-home everything else
/// that refers to it. Mocks owned by the root group persist when
/// `persist_root_mocks` is set. Never fails: teardown is best effort.
pub fn exit_group(
    table: &MockTable,
    host: &dyn Host,
    scopes: &dyn ScopeProvider,
    config: &MockConfig,
) -> GroupExit {
    let stack = scopes.scope_stack();
    let exiting = match stack.last() {
        Some(frame) => frame,
        None => return GroupExit::default(),
    };
    let parent = stack.len().checked_sub(2).map(|i| stack[i].id);
    let is_root = exiting.kind == ScopeKind::Root || parent.is_none();
    let mut outcome = GroupExit::default();

    if is_root && config.persist_root_mocks {
        debug!(group = %exiting.id, "root group exit, mocks persist");
        return outcome;
    }

    {
        let mut records = table.lock();
        for (key, record) in records.iter_mut() {
            if record.scope == Some(exiting.id) {
                outcome.removed.push(key.clone());
                continue;
            }

            let before = record.blocks.len();
            record.blocks.retain(|b| b.scope != Some(exiting.id));
            outcome.pruned_blocks += before - record.blocks.len();

            for call in record
                .history
                .iter_mut()
                .filter(|c| c.scope == Some(exiting.id))
            {
                call.scope = parent;
                outcome.rehomed_calls += 1;
            }
        }
    }

    outcome.removed.sort();
    for key in &outcome.removed {
        table.unregister(host, key);
    }

    debug!(
        group = %exiting.id,
        name = %exiting.name,
        removed = outcome.removed.len(),
        pruned = outcome.pruned_blocks,
        rehomed = outcome.rehomed_calls,
        "group exit"
    );
    outcome
}
