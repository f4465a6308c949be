//! mockr: call interception and verification for scripting test frameworks
//!
//! Given the name of a command, the engine installs a dispatch shim in its
//! place. Each call to the shim is matched against the declared mock blocks;
//! a matching block runs instead of the original and the call is recorded,
//! otherwise the call falls through to the original unchanged. Recorded
//! calls can then be verified by count, filter and test scope.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 MockEngine                   │
//! │                                              │
//! │  registry  - mock table, shim install        │
//! │  resolver  - alias chains, shim detection    │
//! │  dispatch  - block matching, fallback        │
//! │  filter    - parameter filters               │
//! │  verify    - call count assertions           │
//! │  lifecycle - scope exit teardown / rehoming  │
//! │                                              │
//! ├──────────────────────────────────────────────┤
//! │   Host (command table)  │  ScopeProvider     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Matching precedence: the most recently declared block with a parameter
//! filter wins; a block without a filter only applies when no filtered block
//! matches.

pub mod args;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod filter;
pub mod host;
pub mod lifecycle;
pub mod mock;
pub mod registry;
pub mod resolver;
pub mod scenario;
pub mod scope;
pub mod shim;
pub mod signature;
pub mod value;
pub mod verify;

pub use args::CallArgs;
pub use config::MockConfig;
pub use engine::MockEngine;
pub use error::{AssertionFailure, FailureKind, MockError};
pub use filter::{FilterScope, ParameterFilter};
pub use host::{Command, FnCommand, Host, MemoryHost, SessionId};
pub use mock::{MockBody, MockInvocation};
pub use registry::MockDeclaration;
pub use scope::{CallScope, ScopeKind, ScopeProvider, TestScopeStack};
pub use signature::{Parameter, Signature};
pub use value::Value;
pub use verify::{CallAssertion, CallCounts};
