//! In-memory host command table.

use super::{Command, CommandEntry, CommandRef, Host, HostError, SessionId};
use crate::args::CallArgs;
use crate::signature::{Parameter, Signature};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Maximum alias hops `MemoryHost::invoke` follows before giving up.
const MAX_ALIAS_DEPTH: usize = 32;

type CommandFn = dyn Fn(&CallArgs, &[Value]) -> anyhow::Result<Vec<Value>> + Send + Sync;
type DynamicParamFn = dyn Fn(&CallArgs) -> Vec<Parameter> + Send + Sync;

/// A command backed by a Rust closure.
pub struct FnCommand {
    signature: Signature,
    body: Arc<CommandFn>,
    dynamic: Option<Arc<DynamicParamFn>>,
}

impl FnCommand {
    pub fn new<F>(signature: Signature, body: F) -> Self
    where
        F: Fn(&CallArgs, &[Value]) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        Self {
            signature,
            body: Arc::new(body),
            dynamic: None,
        }
    }

    /// Attach a dynamic-parameter hook. Marks the signature dynamic.
    pub fn with_dynamic_parameters<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CallArgs) -> Vec<Parameter> + Send + Sync + 'static,
    {
        self.signature.dynamic_params = true;
        self.dynamic = Some(Arc::new(hook));
        self
    }
}

impl Command for FnCommand {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn invoke(&self, args: &CallArgs, input: &[Value]) -> anyhow::Result<Vec<Value>> {
        (self.body)(args, input)
    }

    fn dynamic_parameters(&self, args: &CallArgs) -> anyhow::Result<Vec<Parameter>> {
        Ok(self.dynamic.as_ref().map(|hook| hook(args)).unwrap_or_default())
    }
}

#[derive(Default)]
struct SessionTable {
    /// lowercase alias -> (alias as written, target)
    aliases: HashMap<String, (String, String)>,
    /// lowercase name -> command
    commands: HashMap<String, CommandRef>,
}

impl SessionTable {
    fn lookup(&self, name: &str) -> Option<CommandEntry> {
        let key = name.to_ascii_lowercase();
        if let Some((alias, target)) = self.aliases.get(&key) {
            return Some(CommandEntry::Alias {
                name: alias.clone(),
                target: target.clone(),
            });
        }
        if let Some((module, bare)) = key.split_once('\\') {
            return self
                .commands
                .get(bare)
                .filter(|c| {
                    c.signature()
                        .module
                        .as_deref()
                        .map_or(false, |m| m.eq_ignore_ascii_case(module))
                })
                .cloned()
                .map(CommandEntry::Command);
        }
        self.commands.get(&key).cloned().map(CommandEntry::Command)
    }
}

/// A session-aware command table.
///
/// There is one global session plus one private session per loaded module.
/// Lookups from a module session try the module's own table first, then fall
/// back to the global one. Within a table aliases take precedence over
/// commands.
pub struct MemoryHost {
    sessions: Mutex<HashMap<SessionId, SessionTable>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        let mut sessions = HashMap::new();
        sessions.insert(SessionId::global(), SessionTable::default());
        Self {
            sessions: Mutex::new(sessions),
        }
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<SessionId, SessionTable>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a module session. Loading an already loaded module is a no-op.
    pub fn load_module(&self, name: &str) -> SessionId {
        let id = SessionId::module(name);
        self.tables().entry(id.clone()).or_default();
        id
    }

    /// Define a command visible from every session. A command exported by
    /// a module also loads that module's session.
    pub fn define(&self, command: impl Command + 'static) -> CommandRef {
        let command: CommandRef = Arc::new(command);
        if let Some(module) = &command.signature().module {
            self.load_module(module);
        }
        self.tables()
            .entry(SessionId::global())
            .or_default()
            .commands
            .insert(command.signature().name.to_ascii_lowercase(), command.clone());
        command
    }

    /// Define a private command visible only inside `module`.
    pub fn define_private(&self, module: &str, command: impl Command + 'static) -> CommandRef {
        let command: CommandRef = Arc::new(command);
        let session = self.load_module(module);
        self.tables()
            .entry(session)
            .or_default()
            .commands
            .insert(command.signature().name.to_ascii_lowercase(), command.clone());
        command
    }

    /// Define a global alias.
    pub fn define_alias(&self, alias: &str, target: &str) {
        self.tables()
            .entry(SessionId::global())
            .or_default()
            .aliases
            .insert(
                alias.to_ascii_lowercase(),
                (alias.to_string(), target.to_string()),
            );
    }

    /// Whether `alias` is currently installed in `session`'s own table.
    pub fn has_alias(&self, session: &SessionId, alias: &str) -> bool {
        self.tables()
            .get(session)
            .map_or(false, |t| t.aliases.contains_key(&alias.to_ascii_lowercase()))
    }

    /// Names of all aliases installed in `session`'s own table.
    pub fn aliases(&self, session: &SessionId) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables()
            .get(session)
            .map(|t| t.aliases.values().map(|(alias, _)| alias.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Resolve `name` from `namespace` through any alias chain to a command.
    pub fn resolve_command(&self, namespace: Option<&str>, name: &str) -> anyhow::Result<CommandRef> {
        let session = self.session(namespace)?;
        let mut current = name.to_string();
        for _ in 0..MAX_ALIAS_DEPTH {
            match self.lookup(&session, &current)? {
                Some(CommandEntry::Alias { target, .. }) => current = target,
                Some(CommandEntry::Command(command)) => return Ok(command),
                None => anyhow::bail!("The term '{}' is not recognized as a command", name),
            }
        }
        anyhow::bail!("alias chain for '{}' is too deep", name)
    }

    /// Call `name` as code running in `namespace` would.
    pub fn invoke(
        &self,
        namespace: Option<&str>,
        name: &str,
        args: &CallArgs,
        input: &[Value],
    ) -> anyhow::Result<Vec<Value>> {
        let command = self.resolve_command(namespace, name)?;
        command.invoke(args, input)
    }
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for MemoryHost {
    fn session(&self, namespace: Option<&str>) -> Result<SessionId, HostError> {
        let id = match namespace {
            Some(module) => SessionId::module(module),
            None => SessionId::global(),
        };
        if self.tables().contains_key(&id) {
            Ok(id)
        } else {
            Err(HostError::SessionNotFound(namespace.unwrap_or_default().to_string()))
        }
    }

    fn lookup(&self, session: &SessionId, name: &str) -> Result<Option<CommandEntry>, HostError> {
        let tables = self.tables();
        let own = tables
            .get(session)
            .ok_or_else(|| HostError::SessionNotFound(session.to_string()))?;
        if let Some(entry) = own.lookup(name) {
            return Ok(Some(entry));
        }
        if session.is_global() {
            return Ok(None);
        }
        Ok(tables
            .get(&SessionId::global())
            .and_then(|global| global.lookup(name)))
    }

    fn bind(&self, session: &SessionId, name: &str, command: CommandRef) -> Result<(), HostError> {
        check_name(name)?;
        let mut tables = self.tables();
        let table = tables
            .get_mut(session)
            .ok_or_else(|| HostError::SessionNotFound(session.to_string()))?;
        table.commands.insert(name.to_ascii_lowercase(), command);
        Ok(())
    }

    fn unbind(&self, session: &SessionId, name: &str) -> Result<Option<CommandRef>, HostError> {
        let mut tables = self.tables();
        let table = tables
            .get_mut(session)
            .ok_or_else(|| HostError::SessionNotFound(session.to_string()))?;
        Ok(table.commands.remove(&name.to_ascii_lowercase()))
    }

    fn set_alias(
        &self,
        session: &SessionId,
        alias: &str,
        target: &str,
    ) -> Result<Option<String>, HostError> {
        check_name(alias)?;
        let mut tables = self.tables();
        let table = tables
            .get_mut(session)
            .ok_or_else(|| HostError::SessionNotFound(session.to_string()))?;
        Ok(table
            .aliases
            .insert(
                alias.to_ascii_lowercase(),
                (alias.to_string(), target.to_string()),
            )
            .map(|(_, previous)| previous))
    }

    fn remove_alias(&self, session: &SessionId, alias: &str) -> Result<Option<String>, HostError> {
        let mut tables = self.tables();
        let table = tables
            .get_mut(session)
            .ok_or_else(|| HostError::SessionNotFound(session.to_string()))?;
        Ok(table
            .aliases
            .remove(&alias.to_ascii_lowercase())
            .map(|(_, target)| target))
    }
}

fn check_name(name: &str) -> Result<(), HostError> {
    if name.trim().is_empty() {
        return Err(HostError::Binding {
            name: name.to_string(),
            message: "command names must not be empty".to_string(),
        });
    }
    Ok(())
}
