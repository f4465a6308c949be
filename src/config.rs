//! Engine configuration.

use crate::error::{MockError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Scope-depth adjustment applied when falling back to a variable-assignment
/// command: the original runs two dispatch layers below the caller, so its
/// scope argument has to reach two levels further out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeBiasConfig {
    /// Commands whose scope argument is adjusted
    pub commands: Vec<String>,
    /// Name of the scope-depth parameter
    pub parameter: String,
    pub depth: i64,
}

impl Default for ScopeBiasConfig {
    fn default() -> Self {
        Self {
            commands: vec!["Set-Variable".to_string()],
            parameter: "Scope".to_string(),
            depth: 2,
        }
    }
}

impl ScopeBiasConfig {
    pub fn applies_to(&self, command: &str) -> bool {
        self.commands.iter().any(|c| c.eq_ignore_ascii_case(command))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MockConfig {
    /// Keep mocks declared in the root group alive for the whole run
    pub persist_root_mocks: bool,
    /// Prefix of the synthetic name the dispatch shim is bound under
    pub shim_prefix: String,
    pub scope_bias: ScopeBiasConfig,
    /// Host-specific parameters hidden from filters in addition to the
    /// standard cross-cutting ones
    pub extra_common_parameters: Vec<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            persist_root_mocks: true,
            shim_prefix: "MockShim".to_string(),
            scope_bias: ScopeBiasConfig::default(),
            extra_common_parameters: Vec::new(),
        }
    }
}

impl MockConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MockConfig =
            serde_json::from_str(json).map_err(|e| MockError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| MockError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        if self.shim_prefix.trim().is_empty() {
            return Err(MockError::Config("shim_prefix must not be empty".into()));
        }
        if self.scope_bias.parameter.trim().is_empty() {
            return Err(MockError::Config("scope_bias.parameter must not be empty".into()));
        }
        Ok(())
    }
}
