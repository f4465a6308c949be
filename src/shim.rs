//! Dispatch Shim
//!
//! The stand-in command bound in place of a mocked original. It carries the
//! original's parameter list verbatim (under a synthetic name) so callers
//! bind exactly as before, and forwards every call to the [`Dispatcher`].
//!
//! Hosts that stream pipeline input drive a call explicitly:
//!
//! ```ignore
//! let mut call = shim.begin(args);
//! for item in items {
//!     output.extend(call.process(Some(item))?);
//! }
//! output.extend(call.end()?);
//! ```
//!
//! Hosts that collect input first just use [`Command::invoke`].

use crate::args::CallArgs;
use crate::dispatch::{CallState, DispatchPhase, Dispatcher};
use crate::error::{MockError, Result};
use crate::host::Command;
use crate::mock::MockKey;
use crate::signature::{Parameter, Signature};
use crate::value::Value;

pub struct DispatchShim {
    key: MockKey,
    signature: Signature,
    dispatcher: Dispatcher,
}

impl DispatchShim {
    /// Build a shim mirroring `original`'s signature under `shim_name`.
    pub fn new(key: MockKey, shim_name: &str, original: &Signature, dispatcher: Dispatcher) -> Self {
        let signature = Signature {
            name: shim_name.to_string(),
            module: None,
            ..original.clone()
        };
        Self {
            key,
            signature,
            dispatcher,
        }
    }

    pub fn key(&self) -> &MockKey {
        &self.key
    }

    /// Start one logical call.
    pub fn begin(&self, args: CallArgs) -> Result<ShimCall<'_>> {
        let mut state = CallState::new(args);
        self.dispatcher
            .dispatch(&self.key, DispatchPhase::Begin, &mut state)?;
        Ok(ShimCall {
            shim: self,
            state,
            processed: false,
        })
    }
}

impl Command for DispatchShim {
    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn invoke(&self, args: &CallArgs, input: &[Value]) -> anyhow::Result<Vec<Value>> {
        let run = || -> Result<Vec<Value>> {
            let mut call = self.begin(args.clone())?;
            let mut output = Vec::new();
            for item in input {
                output.extend(call.process(Some(item.clone()))?);
            }
            output.extend(call.end()?);
            Ok(output)
        };
        run().map_err(MockError::into_script)
    }

    fn dynamic_parameters(&self, args: &CallArgs) -> anyhow::Result<Vec<Parameter>> {
        if !self.signature.dynamic_params {
            return Ok(Vec::new());
        }
        self.dispatcher
            .dynamic_parameters(&self.key, args)
            .map_err(MockError::into_script)
    }
}

/// One call in progress through a shim. Consumed by [`ShimCall::end`].
pub struct ShimCall<'a> {
    shim: &'a DispatchShim,
    state: CallState,
    processed: bool,
}

impl ShimCall<'_> {
    /// Handle one streamed item, or the single non-pipeline invocation when
    /// `item` is `None`.
    pub fn process(&mut self, item: Option<Value>) -> Result<Vec<Value>> {
        self.processed = true;
        self.shim
            .dispatcher
            .dispatch(&self.shim.key, DispatchPhase::Process(item), &mut self.state)
    }

    /// Finish the call, running the original if some item went unhandled.
    pub fn end(mut self) -> Result<Vec<Value>> {
        let mut output = Vec::new();
        if !self.processed {
            output.extend(self.process(None)?);
        }
        output.extend(
            self.shim
                .dispatcher
                .dispatch(&self.shim.key, DispatchPhase::End, &mut self.state)?,
        );
        Ok(output)
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }
}
