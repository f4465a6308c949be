//! Call Dispatcher
//!
//! Decides, per intercepted call, whether a mock block handles it or the
//! original command must run. A call goes through three phases:
//!
//! ```text
//! Begin ──> Process(item) ──> ... ──> End
//!  reset     match a block,            run the original once with every
//!  state     or buffer the item        buffered item, if any process
//!                                      step found no matching block
//! ```
//!
//! `Process` runs once per streamed item, or once with no item when the
//! command was not called from a pipeline.

use crate::args::CallArgs;
use crate::config::{MockConfig, ScopeBiasConfig};
use crate::error::{MockError, Result};
use crate::filter::ParameterFilter;
use crate::host::CommandRef;
use crate::mock::{CallRecord, MockInvocation, MockKey};
use crate::registry::MockTable;
use crate::scope::ScopeProvider;
use crate::signature::{Parameter, Signature};
use crate::value::Value;
use std::sync::Arc;
use tracing::debug;

/// One phase of an intercepted call.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchPhase {
    Begin,
    Process(Option<Value>),
    End,
}

/// Per-call accumulator, alive from `Begin` to `End`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallState {
    pub args: CallArgs,
    /// Some process step found no matching block
    pub should_execute_original: bool,
    /// Streamed items no block handled, forwarded to the original at `End`
    pub buffered_input: Vec<Value>,
}

impl CallState {
    pub fn new(args: CallArgs) -> Self {
        Self {
            args,
            should_execute_original: false,
            buffered_input: Vec::new(),
        }
    }
}

/// Everything a dispatch shim needs at call time.
#[derive(Clone)]
pub struct Dispatcher {
    table: MockTable,
    scopes: Arc<dyn ScopeProvider>,
    config: Arc<MockConfig>,
}

impl Dispatcher {
    pub fn new(table: MockTable, scopes: Arc<dyn ScopeProvider>, config: Arc<MockConfig>) -> Self {
        Self {
            table,
            scopes,
            config,
        }
    }

    pub fn table(&self) -> &MockTable {
        &self.table
    }

    pub fn scopes(&self) -> &Arc<dyn ScopeProvider> {
        &self.scopes
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    /// Advance `state` through one phase of a call to the mock for `key`,
    /// returning the output produced by that phase.
    pub fn dispatch(
        &self,
        key: &MockKey,
        phase: DispatchPhase,
        state: &mut CallState,
    ) -> Result<Vec<Value>> {
        match phase {
            DispatchPhase::Begin => {
                let args = std::mem::take(&mut state.args);
                *state = CallState::new(args);
                Ok(Vec::new())
            }
            DispatchPhase::Process(item) => self.process(key, state, item),
            DispatchPhase::End => self.complete(key, state),
        }
    }

    fn process(&self, key: &MockKey, state: &mut CallState, item: Option<Value>) -> Result<Vec<Value>> {
        let (candidates, signature) = self
            .table
            .with_record(key, |record| {
                let candidates: Vec<(u64, ParameterFilter)> = record
                    .matching_order()
                    .map(|block| (block.id, block.filter.clone()))
                    .collect();
                (candidates, record.signature.clone())
            })
            .ok_or_else(|| inconsistency(key))?;

        let args = bind_pipeline_item(&state.args, &signature, item.as_ref());
        let extra = &self.config.extra_common_parameters;
        let mut matched = None;
        for (id, filter) in candidates {
            if filter.evaluate(&args, &signature, extra)? {
                matched = Some(id);
                break;
            }
        }

        let call_scope = if self.scopes.is_inside_test_case() {
            None
        } else {
            self.scopes.current_scope()
        };

        let hit = matched.and_then(|id| {
            self.table
                .with_record_mut(key, |record| {
                    let body = record.block_mut(id).map(|block| {
                        block.verifiable = false;
                        block.body.clone()
                    })?;
                    record.history.push(CallRecord {
                        args: args.clone(),
                        scope: call_scope,
                    });
                    Some((
                        body,
                        record.command_name.clone(),
                        record.session.clone(),
                        record.history.len(),
                    ))
                })
                .flatten()
        });

        match hit {
            Some((body, command, session, calls)) => {
                debug!(mock = %key, block = ?matched, calls, "mock block matched");
                let invocation = MockInvocation {
                    command: &command,
                    args: &args,
                    input: item.as_ref(),
                    session: &session,
                };
                let output = body.call(&invocation).map_err(MockError::from_script)?;
                Ok(if output.is_null() { Vec::new() } else { vec![output] })
            }
            None => {
                debug!(mock = %key, "no mock block matched, deferring to original");
                state.should_execute_original = true;
                if let Some(item) = item {
                    state.buffered_input.push(item);
                }
                Ok(Vec::new())
            }
        }
    }

    fn complete(&self, key: &MockKey, state: &mut CallState) -> Result<Vec<Value>> {
        if !state.should_execute_original {
            return Ok(Vec::new());
        }

        let original = self.original(key)?;
        let mut args = state.args.clone();
        let bias = &self.config.scope_bias;
        if bias.applies_to(&original.signature().name) {
            bias_scope_argument(&mut args, bias);
        }

        let input = std::mem::take(&mut state.buffered_input);
        debug!(mock = %key, items = input.len(), "invoking original command");
        original
            .invoke(&args, &input)
            .map_err(MockError::from_script)
    }

    /// Dynamic parameters of the original, for the shim's dynamic hook.
    pub fn dynamic_parameters(&self, key: &MockKey, args: &CallArgs) -> Result<Vec<Parameter>> {
        let original = self.original(key)?;
        if !original.signature().dynamic_params {
            return Ok(Vec::new());
        }
        original
            .dynamic_parameters(args)
            .map_err(MockError::from_script)
    }

    fn original(&self, key: &MockKey) -> Result<CommandRef> {
        self.table
            .with_record(key, |record| record.original.clone())
            .ok_or_else(|| inconsistency(key))
    }
}

/// Arguments as seen while handling one streamed item: the item is bound to
/// the parameter that takes pipeline input, unless the caller bound that
/// parameter explicitly.
fn bind_pipeline_item(args: &CallArgs, signature: &Signature, item: Option<&Value>) -> CallArgs {
    let mut bound = args.clone();
    if let Some(item) = item {
        let target = signature
            .parameters
            .iter()
            .find(|p| p.from_pipeline && !p.aliases.iter().any(|a| args.contains(a)));
        if let Some(param) = target {
            if !args.contains(&param.name) {
                bound.set(param.name.clone(), item.clone());
            }
        }
    }
    bound
}

fn inconsistency(key: &MockKey) -> MockError {
    MockError::InternalInconsistency {
        key: key.to_string(),
    }
}

/// Push a variable-assignment command's scope argument further out, since
/// the original runs below two dispatch layers. Numeric depths grow by
/// `bias.depth`; `Local` or no scope argument at all becomes `bias.depth`.
/// Anything else, including a depth that would overflow, is untouched.
pub fn bias_scope_argument(args: &mut CallArgs, bias: &ScopeBiasConfig) {
    let adjusted = match args.get(&bias.parameter) {
        None => Some(bias.depth),
        Some(Value::Int(n)) => n.checked_add(bias.depth),
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                n.checked_add(bias.depth)
            } else if s.eq_ignore_ascii_case("Local") {
                Some(bias.depth)
            } else {
                None
            }
        }
        Some(_) => None,
    };
    if let Some(depth) = adjusted {
        args.set(bias.parameter.clone(), Value::Int(depth));
    }
}
