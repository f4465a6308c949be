//! Host Environment Capabilities
//!
//! The engine never rewires callables itself. It asks a [`Host`] to resolve
//! names, bind commands under names, and install or remove aliases. A
//! scripting runtime embedding the engine implements [`Host`] over its own
//! command table; [`MemoryHost`] is a self-contained implementation used by
//! the scenario runner and the tests.
//!
//! # Example
//!
//! ```ignore
//! let host = MemoryHost::new();
//! host.define(FnCommand::new(
//!     Signature::cmdlet("Get-Item").param(Parameter::new("Path").at(0)),
//!     |args, _input| Ok(vec![args.get("Path").cloned().unwrap_or_default()]),
//! ));
//! let out = host.invoke(None, "Get-Item", &CallArgs::new().with("Path", "/tmp"), &[])?;
//! ```

mod memory;

pub use memory::{FnCommand, MemoryHost};

use crate::args::CallArgs;
use crate::signature::{Parameter, Signature};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors from host binding operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("module '{0}' is not loaded")]
    SessionNotFound(String),

    #[error("cannot bind '{name}': {message}")]
    Binding { name: String, message: String },
}

/// Identity of an evaluation context commands live in: the global session
/// or a loaded module's private session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    pub const GLOBAL: &'static str = "global";

    pub fn global() -> Self {
        SessionId(Self::GLOBAL.to_string())
    }

    /// A module's private session. Module ids carry a `module:` prefix so a
    /// module named `Global` never shares the global session.
    pub fn module(name: &str) -> Self {
        SessionId(format!("module:{}", name.to_ascii_lowercase()))
    }

    pub fn is_global(&self) -> bool {
        self.0 == Self::GLOBAL
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A callable implementation known to the host.
pub trait Command: Send + Sync {
    fn signature(&self) -> &Signature;

    /// Run the command once with its arguments and the complete collection
    /// of streamed input items (empty when not called from a pipeline).
    fn invoke(&self, args: &CallArgs, input: &[Value]) -> anyhow::Result<Vec<Value>>;

    /// Parameters computed at call time, for commands whose signature has
    /// `dynamic_params` set.
    fn dynamic_parameters(&self, _args: &CallArgs) -> anyhow::Result<Vec<Parameter>> {
        Ok(Vec::new())
    }
}

pub type CommandRef = Arc<dyn Command>;

/// What a name resolves to in one lookup step.
#[derive(Clone)]
pub enum CommandEntry {
    Alias { name: String, target: String },
    Command(CommandRef),
}

impl fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandEntry::Alias { name, target } => write!(f, "Alias({} -> {})", name, target),
            CommandEntry::Command(cmd) => write!(f, "Command({})", cmd.signature().name),
        }
    }
}

/// Command table operations the engine needs from its host.
///
/// Name comparisons are expected to be case-insensitive.
pub trait Host: Send + Sync {
    /// The session a namespace's commands live in; `None` is the global session.
    fn session(&self, namespace: Option<&str>) -> Result<SessionId, HostError>;

    /// One resolution step for `name` as seen from `session`, following the
    /// host's standard precedence. Aliases are returned, not followed.
    fn lookup(&self, session: &SessionId, name: &str) -> Result<Option<CommandEntry>, HostError>;

    /// Bind `command` under `name` in `session`, replacing any binding.
    fn bind(&self, session: &SessionId, name: &str, command: CommandRef) -> Result<(), HostError>;

    /// Remove the binding of `name` in `session`, returning it.
    fn unbind(&self, session: &SessionId, name: &str) -> Result<Option<CommandRef>, HostError>;

    /// Install `alias -> target` in `session`. Returns the target of an alias
    /// of the same name this displaced in that session.
    fn set_alias(
        &self,
        session: &SessionId,
        alias: &str,
        target: &str,
    ) -> Result<Option<String>, HostError>;

    /// Remove `alias` from `session`, returning its target if it existed.
    fn remove_alias(&self, session: &SessionId, alias: &str) -> Result<Option<String>, HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_named_global_has_its_own_session() {
        let module = SessionId::module("Global");
        assert_ne!(module, SessionId::global());
        assert!(!module.is_global());
        assert_eq!(module, SessionId::module("GLOBAL"));
        assert_eq!(module.to_string(), "module:global");
    }
}
