//! Command Signatures
//!
//! A [`Signature`] is the declarative description of a command's calling
//! convention. It is captured once when a command is first mocked and reused
//! by the dispatch shim and the filter evaluator on every call.

use serde::{Deserialize, Serialize};

/// Cross-cutting parameters every advanced command accepts.
pub const COMMON_PARAMETERS: &[&str] = &[
    "Verbose",
    "Debug",
    "ErrorAction",
    "WarningAction",
    "InformationAction",
    "ErrorVariable",
    "WarningVariable",
    "InformationVariable",
    "OutVariable",
    "OutBuffer",
    "PipelineVariable",
];

/// Parameters added when a command supports should-process.
pub const SHOULD_PROCESS_PARAMETERS: &[&str] = &["WhatIf", "Confirm"];

/// Parameter added when a command supports transactions.
pub const TRANSACTION_PARAMETERS: &[&str] = &["UseTransaction"];

/// Parameters added when a command supports paging.
pub const PAGING_PARAMETERS: &[&str] = &["First", "Skip", "IncludeTotalCount"];

/// What kind of callable a signature describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Function,
    Cmdlet,
    Application,
}

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Position for positional binding, if any
    #[serde(default)]
    pub position: Option<usize>,
    #[serde(default)]
    pub mandatory: bool,
    /// Binds from streamed pipeline input
    #[serde(default)]
    pub from_pipeline: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Parameter sets this parameter belongs to (empty = all sets)
    #[serde(default)]
    pub parameter_sets: Vec<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: None,
            mandatory: false,
            from_pipeline: false,
            aliases: Vec::new(),
            parameter_sets: Vec::new(),
        }
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn from_pipeline(mut self) -> Self {
        self.from_pipeline = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Whether `name` refers to this parameter, by name or alias.
    pub fn answers_to(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// The full calling convention of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    /// Module the command was exported from, if any
    #[serde(default)]
    pub module: Option<String>,
    pub kind: CommandKind,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Command declares advanced binding and so carries the common parameters
    #[serde(default)]
    pub advanced: bool,
    #[serde(default)]
    pub supports_should_process: bool,
    #[serde(default)]
    pub supports_transactions: bool,
    #[serde(default)]
    pub supports_paging: bool,
    /// Command computes extra parameters at call time
    #[serde(default)]
    pub dynamic_params: bool,
    #[serde(default)]
    pub default_parameter_set: Option<String>,
}

impl Signature {
    pub fn function(name: impl Into<String>) -> Self {
        Self::new(name, CommandKind::Function)
    }

    pub fn cmdlet(name: impl Into<String>) -> Self {
        Self {
            advanced: true,
            ..Self::new(name, CommandKind::Cmdlet)
        }
    }

    pub fn new(name: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            name: name.into(),
            module: None,
            kind,
            parameters: Vec::new(),
            advanced: false,
            supports_should_process: false,
            supports_transactions: false,
            supports_paging: false,
            dynamic_params: false,
            default_parameter_set: None,
        }
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn advanced(mut self) -> Self {
        self.advanced = true;
        self
    }

    pub fn should_process(mut self) -> Self {
        self.advanced = true;
        self.supports_should_process = true;
        self
    }

    pub fn transactions(mut self) -> Self {
        self.supports_transactions = true;
        self
    }

    pub fn paging(mut self) -> Self {
        self.advanced = true;
        self.supports_paging = true;
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic_params = true;
        self
    }

    /// Whether any parameter binds from streamed input.
    pub fn accepts_pipeline_input(&self) -> bool {
        self.parameters.iter().any(|p| p.from_pipeline)
    }

    pub fn find_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.answers_to(name))
    }

    /// Whether `name` is a host-standard cross-cutting parameter for this
    /// command, and not one the command declares itself.
    pub fn is_common_parameter(&self, name: &str, extra: &[String]) -> bool {
        if self.parameters.iter().any(|p| p.name.eq_ignore_ascii_case(name)) {
            return false;
        }
        let matches = |table: &[&str]| table.iter().any(|c| c.eq_ignore_ascii_case(name));

        (self.advanced && matches(COMMON_PARAMETERS))
            || (self.supports_should_process && matches(SHOULD_PROCESS_PARAMETERS))
            || (self.supports_transactions && matches(TRANSACTION_PARAMETERS))
            || (self.supports_paging && matches(PAGING_PARAMETERS))
            || extra.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Module-qualified display name, e.g. `Storage\Get-Item`.
    pub fn qualified_name(&self) -> String {
        match &self.module {
            Some(module) => format!("{}\\{}", module, self.name),
            None => self.name.clone(),
        }
    }
}
