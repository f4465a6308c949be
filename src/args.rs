//! Call Arguments

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// The arguments of one call: named (bound) parameters in binding order,
/// plus any arguments that did not bind to a named parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    #[serde(default)]
    pub named: Vec<(String, Value)>,
    #[serde(default)]
    pub positional: Vec<Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`CallArgs::set`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder form of [`CallArgs::push_positional`].
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.push_positional(value);
        self
    }

    /// Bind a named argument, replacing an existing binding of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self
            .named
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.named.push((name, value)),
        }
    }

    pub fn push_positional(&mut self, value: impl Into<Value>) {
        self.positional.push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.named.is_empty() && self.positional.is_empty()
    }
}
