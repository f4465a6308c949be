//! Command Resolution
//!
//! Resolves the name a mock is declared for to the implementation that should
//! stand behind it. Alias chains are followed explicitly with a visited set,
//! and a chain ending at an installed dispatch shim resolves to that mock's
//! stored original, so mocking an already mocked command never wraps a shim
//! in another shim.

use crate::error::{MockError, Result};
use crate::host::{CommandEntry, CommandRef, Host, SessionId};
use crate::registry::MockTable;
use std::collections::HashSet;

/// The outcome of resolving a command name.
#[derive(Clone)]
pub struct ResolvedCommand {
    pub command: CommandRef,
    /// Context the command lives in and mock bodies run against
    pub session: SessionId,
    /// Names followed through aliases, starting with the requested one
    pub chain: Vec<String>,
}

impl std::fmt::Debug for ResolvedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedCommand")
            .field("command", &self.command.signature().name)
            .field("session", &self.session)
            .field("chain", &self.chain)
            .finish()
    }
}

/// Resolve `name` as seen from `namespace` (the global session when `None`).
pub fn resolve(
    host: &dyn Host,
    table: &MockTable,
    name: &str,
    namespace: Option<&str>,
) -> Result<ResolvedCommand> {
    let session = host.session(namespace).map_err(|_| {
        MockError::not_found(format!(
            "Could not find module '{}'",
            namespace.unwrap_or_default()
        ))
    })?;

    let mut visited = HashSet::new();
    let mut chain = vec![name.to_string()];
    let mut current = name.to_string();
    visited.insert(current.to_ascii_lowercase());

    let command = loop {
        match host.lookup(&session, &current)? {
            None => {
                return Err(MockError::not_found(not_found_message(name, namespace)));
            }
            Some(CommandEntry::Alias { target, .. }) => {
                chain.push(target.clone());
                if !visited.insert(target.to_ascii_lowercase()) {
                    return Err(MockError::AliasCycle { chain });
                }
                current = target;
            }
            Some(CommandEntry::Command(command)) => break command,
        }
    };

    if let Some(original) = table.original_for_shim(&command.signature().name) {
        tracing::debug!(
            command = name,
            shim = %command.signature().name,
            "resolved to an installed shim, using its original"
        );
        return Ok(ResolvedCommand {
            command: original,
            session,
            chain,
        });
    }

    Ok(ResolvedCommand {
        command,
        session,
        chain,
    })
}

fn not_found_message(name: &str, namespace: Option<&str>) -> String {
    match namespace {
        Some(module) => format!(
            "Could not find Command {} in module {}",
            name, module
        ),
        None => format!("Could not find Command {}", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{FnCommand, MemoryHost};
    use crate::signature::Signature;

    fn host_with_get_item() -> MemoryHost {
        let host = MemoryHost::new();
        host.define(FnCommand::new(Signature::cmdlet("Get-Item"), |_, _| {
            Ok(Vec::new())
        }));
        host
    }

    #[test]
    fn test_follows_alias_chain() -> Result<()> {
        let host = host_with_get_item();
        host.define_alias("gi", "Get-Item");
        host.define_alias("item", "gi");

        let resolved = resolve(&host, &MockTable::new(), "item", None)?;
        assert_eq!(resolved.command.signature().name, "Get-Item");
        assert_eq!(resolved.chain, vec!["item", "gi", "Get-Item"]);
        assert!(resolved.session.is_global());
        Ok(())
    }

    #[test]
    fn test_alias_cycle_is_detected() {
        let host = MemoryHost::new();
        host.define_alias("a", "b");
        host.define_alias("b", "A");

        let err = resolve(&host, &MockTable::new(), "a", None).unwrap_err();
        match err {
            MockError::AliasCycle { chain } => assert_eq!(chain, vec!["a", "b", "A"]),
            other => panic!("expected alias cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_command() {
        let host = MemoryHost::new();
        let err = resolve(&host, &MockTable::new(), "Get-Nothing", None).unwrap_err();
        assert!(matches!(err, MockError::NotFound { .. }));
        assert_eq!(err.to_string(), "Could not find Command Get-Nothing");
    }

    #[test]
    fn test_private_command_resolves_in_module_session() -> Result<()> {
        let host = MemoryHost::new();
        host.define_private(
            "Storage",
            FnCommand::new(Signature::function("Read-Blob"), |_, _| Ok(Vec::new())),
        );

        let resolved = resolve(&host, &MockTable::new(), "Read-Blob", Some("Storage"))?;
        assert_eq!(resolved.session, SessionId::module("Storage"));
        assert!(resolve(&host, &MockTable::new(), "Read-Blob", None).is_err());
        Ok(())
    }

    #[test]
    fn test_unknown_module() {
        let host = host_with_get_item();
        let err = resolve(&host, &MockTable::new(), "Get-Item", Some("Missing")).unwrap_err();
        assert_eq!(err.to_string(), "Could not find module 'Missing'");
    }
}
