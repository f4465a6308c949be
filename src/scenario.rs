//! Scenario Runner
//!
//! Runs a scripted sequence of scope changes, mock declarations, calls and
//! assertions against a [`MemoryHost`]. Scenarios are JSON documents:
//!
//! ```json
//! {
//!   "commands": [
//!     { "name": "Get-Item", "kind": "cmdlet",
//!       "parameters": [{ "name": "Path", "position": 0 }] }
//!   ],
//!   "steps": [
//!     { "step": "enter", "kind": "describe", "name": "items" },
//!     { "step": "mock", "command": "Get-Item", "returns": "A",
//!       "filter": { "Path": "/tmp" } },
//!     { "step": "call", "command": "Get-Item", "args": { "Path": "/tmp" },
//!       "expect": ["A"] },
//!     { "step": "assert_called", "command": "Get-Item", "times": 1, "exactly": true },
//!     { "step": "leave" }
//!   ]
//! }
//! ```
//!
//! Commands without `returns` echo their name, named arguments and streamed
//! input, which makes fallback to the original visible in the report.

use crate::args::CallArgs;
use crate::config::MockConfig;
use crate::engine::MockEngine;
use crate::error::{MockError, Result};
use crate::filter::ParameterFilter;
use crate::host::{FnCommand, MemoryHost};
use crate::registry::MockDeclaration;
use crate::scope::{ScopeKind, ScopeProvider, TestScopeStack};
use crate::signature::{CommandKind, Parameter, Signature};
use crate::value::Value;
use crate::verify::CallAssertion;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub commands: Vec<CommandDef>,
    /// Global aliases, alias name to target
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MockError::Config(format!("invalid scenario: {}", e)))
    }
}

/// A command the scenario's host provides.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandDef {
    pub name: String,
    #[serde(default)]
    pub module: Option<String>,
    /// Only visible inside `module`
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_kind")]
    pub kind: CommandKind,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub advanced: bool,
    /// Fixed output; when absent the command echoes its name and input
    #[serde(default)]
    pub returns: Option<Value>,
}

fn default_kind() -> CommandKind {
    CommandKind::Function
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Describe,
    Context,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Enter {
        kind: GroupKind,
        name: String,
    },
    Leave,
    EnterTest {
        #[serde(default)]
        name: String,
    },
    LeaveTest,
    Mock {
        command: String,
        #[serde(default)]
        module: Option<String>,
        #[serde(default)]
        returns: Option<Value>,
        /// Parameter name to required value
        #[serde(default)]
        filter: Option<Value>,
        #[serde(default)]
        verifiable: bool,
    },
    Call {
        command: String,
        /// Module the call is made from
        #[serde(default)]
        from: Option<String>,
        #[serde(default)]
        args: Option<Value>,
        #[serde(default)]
        positional: Vec<Value>,
        #[serde(default)]
        input: Vec<Value>,
        #[serde(default)]
        expect: Option<Vec<Value>>,
    },
    AssertCalled {
        command: String,
        #[serde(default)]
        module: Option<String>,
        #[serde(default = "default_times")]
        times: usize,
        #[serde(default)]
        exactly: bool,
        #[serde(default)]
        filter: Option<Value>,
        #[serde(default)]
        exclusive: bool,
        #[serde(default)]
        scope: Option<String>,
    },
    AssertVerifiable,
}

fn default_times() -> usize {
    1
}

impl Step {
    /// Short description used in reports and by `mockr check`.
    pub fn label(&self) -> String {
        match self {
            Step::Enter { kind, name } => format!("enter {:?} '{}'", kind, name),
            Step::Leave => "leave".to_string(),
            Step::EnterTest { name } => format!("enter test '{}'", name),
            Step::LeaveTest => "leave test".to_string(),
            Step::Mock { command, .. } => format!("mock {}", command),
            Step::Call { command, .. } => format!("call {}", command),
            Step::AssertCalled { command, .. } => format!("assert called {}", command),
            Step::AssertVerifiable => "assert verifiable".to_string(),
        }
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub step: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepReport>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| !s.ok)
    }
}

/// Filter built from a `{ "Param": value, ... }` map.
fn equality_filter(filter: &Option<Value>) -> Result<ParameterFilter> {
    match filter {
        None => Ok(ParameterFilter::always()),
        Some(Value::Map(fields)) => Ok(ParameterFilter::equals(fields.clone())),
        Some(other) => Err(MockError::Config(format!(
            "filter must be an object of parameter values, got {}",
            other.type_name()
        ))),
    }
}

fn call_args(args: &Option<Value>, positional: &[Value]) -> Result<CallArgs> {
    let mut call = CallArgs::new();
    match args {
        None | Some(Value::Null) => {}
        Some(Value::Map(fields)) => {
            for (name, value) in fields {
                call.set(name.clone(), value.clone());
            }
        }
        Some(other) => {
            return Err(MockError::Config(format!(
                "args must be an object, got {}",
                other.type_name()
            )))
        }
    }
    call.positional = positional.to_vec();
    Ok(call)
}

fn define_command(host: &MemoryHost, def: &CommandDef) {
    let mut signature = Signature::new(&def.name, def.kind);
    signature.parameters = def.parameters.clone();
    signature.advanced = def.advanced || def.kind == CommandKind::Cmdlet;
    if !def.private {
        signature.module = def.module.clone();
    }

    let name = def.name.clone();
    let returns = def.returns.clone();
    let command = FnCommand::new(signature, move |args, input| {
        Ok(match &returns {
            Some(value) => vec![value.clone()],
            None => vec![Value::Map(vec![
                ("original".to_string(), Value::from(name.as_str())),
                ("args".to_string(), Value::Map(args.named.clone())),
                ("input".to_string(), Value::List(input.to_vec())),
            ])],
        })
    });

    match (&def.module, def.private) {
        (Some(module), true) => {
            host.define_private(module, command);
        }
        _ => {
            host.define(command);
        }
    }
}

/// Run a scenario. Step failures are reported, not returned; only fatal
/// engine errors abort the run.
pub fn run(scenario: &Scenario, config: MockConfig) -> Result<ScenarioReport> {
    let host = Arc::new(MemoryHost::new());
    for def in &scenario.commands {
        define_command(&host, def);
    }
    for (alias, target) in &scenario.aliases {
        host.define_alias(alias, target);
    }

    let scopes = Arc::new(TestScopeStack::new());
    let engine = MockEngine::with_config(host.clone(), scopes.clone(), config);
    let mut reports = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        let result = run_step(&engine, &host, &scopes, step);
        let report = match result {
            Ok(output) => StepReport {
                index,
                step: step.label(),
                ok: true,
                detail: None,
                output,
            },
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => StepReport {
                index,
                step: step.label(),
                ok: false,
                detail: Some(e.to_string()),
                output: None,
            },
        };
        tracing::debug!(index, step = %report.step, ok = report.ok, "scenario step");
        reports.push(report);
    }

    if scopes.is_inside_test_case() {
        engine.exit_test_case();
        scopes.leave_test();
    }
    while scopes.depth() > 1 {
        engine.exit_group();
        scopes.leave_group();
    }
    engine.exit_group();

    Ok(ScenarioReport { steps: reports })
}

fn run_step(
    engine: &MockEngine,
    host: &MemoryHost,
    scopes: &TestScopeStack,
    step: &Step,
) -> Result<Option<Vec<Value>>> {
    match step {
        Step::Enter { kind, name } => {
            let kind = match kind {
                GroupKind::Describe => ScopeKind::Describe,
                GroupKind::Context => ScopeKind::Context,
            };
            scopes.enter_group(kind, name.clone());
        }
        Step::Leave => {
            if scopes.depth() <= 1 {
                return Err(MockError::Config("no group to leave".into()));
            }
            engine.exit_group();
            scopes.leave_group();
        }
        Step::EnterTest { .. } => scopes.enter_test(),
        Step::LeaveTest => {
            engine.exit_test_case();
            scopes.leave_test();
        }
        Step::Mock {
            command,
            module,
            returns,
            filter,
            verifiable,
        } => {
            let mut declaration = MockDeclaration::new(command.clone())
                .returns(returns.clone().unwrap_or_default())
                .filter(equality_filter(filter)?);
            if let Some(module) = module {
                declaration = declaration.module(module.clone());
            }
            if *verifiable {
                declaration = declaration.verifiable();
            }
            engine.mock(declaration)?;
        }
        Step::Call {
            command,
            from,
            args,
            positional,
            input,
            expect,
        } => {
            let args = call_args(args, positional)?;
            let output = host
                .invoke(from.as_deref(), command, &args, input)
                .map_err(MockError::from_script)?;
            if let Some(expected) = expect {
                if &output != expected {
                    return Err(MockError::Config(format!(
                        "expected output {} but got {}",
                        Value::List(expected.clone()),
                        Value::List(output)
                    )));
                }
            }
            return Ok(Some(output));
        }
        Step::AssertCalled {
            command,
            module,
            times,
            exactly,
            filter,
            exclusive,
            scope,
        } => {
            let filter = equality_filter(filter)?;
            let mut assertion = CallAssertion::new(command.clone()).times(*times);
            assertion = if *exclusive {
                assertion.exclusive(filter)
            } else {
                assertion.filter(filter)
            };
            if *exactly {
                assertion = assertion.exactly();
            }
            if let Some(module) = module {
                assertion = assertion.module(module.clone());
            }
            if let Some(scope) = scope {
                assertion = assertion.scope(scope.clone());
            }
            engine.assert_called(&assertion)?;
        }
        Step::AssertVerifiable => engine.assert_all_verifiable_called()?,
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASIC: &str = r#"{
        "commands": [
            { "name": "Get-Item", "kind": "cmdlet",
              "parameters": [{ "name": "Path", "position": 0 }] }
        ],
        "steps": [
            { "step": "enter", "kind": "describe", "name": "items" },
            { "step": "mock", "command": "Get-Item", "returns": "A",
              "filter": { "Path": "/tmp" } },
            { "step": "call", "command": "Get-Item", "args": { "Path": "/tmp" },
              "expect": ["A"] },
            { "step": "call", "command": "Get-Item", "args": { "Path": "/etc" } },
            { "step": "assert_called", "command": "Get-Item", "times": 1, "exactly": true },
            { "step": "assert_called", "command": "Get-Item", "times": 2, "exactly": true },
            { "step": "leave" }
        ]
    }"#;

    #[test]
    fn test_basic_scenario_report() -> Result<()> {
        let scenario = Scenario::from_json_str(BASIC)?;
        let report = run(&scenario, MockConfig::default())?;

        assert_eq!(report.steps.len(), 7);
        let failures: Vec<_> = report.failures().map(|s| s.index).collect();
        assert_eq!(failures, vec![5]);
        assert!(report.steps[5]
            .detail
            .as_deref()
            .unwrap()
            .contains("to be called 2 times exactly but was called 1 times"));

        let fallback = report.steps[3].output.as_ref().unwrap();
        assert_eq!(fallback[0].field("original"), Some(&Value::from("Get-Item")));
        Ok(())
    }

    #[test]
    fn test_invalid_scenario() {
        let err = Scenario::from_json_str(r#"{"steps": [{"step": "dance"}]}"#).unwrap_err();
        assert!(err.to_string().starts_with("config error: invalid scenario"));
    }

    #[test]
    fn test_non_object_filter_fails_step() -> Result<()> {
        let scenario = Scenario::from_json_str(
            r#"{
                "commands": [{ "name": "f" }],
                "steps": [{ "step": "mock", "command": "f", "filter": [1] }]
            }"#,
        )?;
        let report = run(&scenario, MockConfig::default())?;
        assert!(!report.passed());
        Ok(())
    }
}
