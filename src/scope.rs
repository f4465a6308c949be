//! Test Scopes
//!
//! The engine does not own the test-group hierarchy. It reads it through a
//! [`ScopeProvider`]: the stack of enclosing groups (innermost last) and
//! whether a test case is currently running. [`TestScopeStack`] is a simple
//! provider the test-group system (or a test) drives by entering and leaving
//! groups.

use crate::error::MockError;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Identity of one test group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

impl ScopeId {
    pub fn new(raw: u64) -> Self {
        ScopeId(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of a test group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// The whole run
    Root,
    Describe,
    Context,
}

impl ScopeKind {
    pub fn hint(&self) -> &'static str {
        match self {
            ScopeKind::Root => "Root",
            ScopeKind::Describe => "Describe",
            ScopeKind::Context => "Context",
        }
    }
}

/// One entry of the group stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeFrame {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub name: String,
}

/// Read access to the live test-group state.
pub trait ScopeProvider: Send + Sync {
    /// Enclosing groups, outermost (root) first, innermost last.
    fn scope_stack(&self) -> Vec<ScopeFrame>;

    fn is_inside_test_case(&self) -> bool;

    /// The innermost enclosing group.
    fn current_scope(&self) -> Option<ScopeId> {
        self.scope_stack().last().map(|frame| frame.id)
    }
}

/// Which recorded calls an assertion looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallScope {
    /// Calls attributed to groups at most `k` levels above the current test.
    Depth(u32),
    /// Only calls made by the currently running test case.
    TestCase,
    /// Calls up to the nearest enclosing group of this kind.
    Kind(ScopeKind),
}

impl Default for CallScope {
    fn default() -> Self {
        CallScope::Depth(0)
    }
}

impl FromStr for CallScope {
    type Err = MockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("It") {
            return Ok(CallScope::TestCase);
        }
        if trimmed.eq_ignore_ascii_case("Describe") {
            return Ok(CallScope::Kind(ScopeKind::Describe));
        }
        if trimmed.eq_ignore_ascii_case("Context") {
            return Ok(CallScope::Kind(ScopeKind::Context));
        }
        trimmed
            .parse::<u32>()
            .map(CallScope::Depth)
            .map_err(|_| MockError::InvalidScopeArgument(s.to_string()))
    }
}

impl fmt::Display for CallScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallScope::Depth(k) => write!(f, "{}", k),
            CallScope::TestCase => write!(f, "It"),
            CallScope::Kind(kind) => write!(f, "{}", kind.hint()),
        }
    }
}

impl CallScope {
    /// Whether a call attributed to `call_scope` is visible from `groups`
    /// (outermost first). `None` means the call happened in the running test
    /// case and is always visible.
    pub fn includes(&self, call_scope: Option<ScopeId>, groups: &[ScopeFrame]) -> bool {
        let call_scope = match call_scope {
            None => return true,
            Some(id) => id,
        };

        let target = match self {
            CallScope::TestCase => return false,
            CallScope::Depth(k) => Some(*k as usize),
            CallScope::Kind(_) => None,
        };

        for (depth, group) in groups.iter().rev().enumerate() {
            if target.map_or(false, |k| depth > k) {
                return false;
            }
            if group.id == call_scope {
                return true;
            }
            if let CallScope::Kind(kind) = self {
                if group.kind == *kind {
                    return false;
                }
            }
        }
        false
    }
}

#[derive(Debug)]
struct StackState {
    frames: Vec<ScopeFrame>,
    in_test: bool,
}

/// A mutable group stack with a root frame that is never popped.
#[derive(Debug)]
pub struct TestScopeStack {
    state: Mutex<StackState>,
    next_id: AtomicU64,
}

impl TestScopeStack {
    pub fn new() -> Self {
        let root = ScopeFrame {
            id: ScopeId(0),
            kind: ScopeKind::Root,
            name: "<root>".to_string(),
        };
        Self {
            state: Mutex::new(StackState {
                frames: vec![root],
                in_test: false,
            }),
            next_id: AtomicU64::new(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, StackState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Push a group and return its identity.
    pub fn enter_group(&self, kind: ScopeKind, name: impl Into<String>) -> ScopeId {
        let id = ScopeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state().frames.push(ScopeFrame {
            id,
            kind,
            name: name.into(),
        });
        id
    }

    /// Pop the innermost group. The root frame stays.
    pub fn leave_group(&self) -> Option<ScopeFrame> {
        let mut state = self.state();
        if state.frames.len() > 1 {
            state.frames.pop()
        } else {
            None
        }
    }

    pub fn enter_test(&self) {
        self.state().in_test = true;
    }

    pub fn leave_test(&self) {
        self.state().in_test = false;
    }

    pub fn depth(&self) -> usize {
        self.state().frames.len()
    }
}

impl Default for TestScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeProvider for TestScopeStack {
    fn scope_stack(&self) -> Vec<ScopeFrame> {
        self.state().frames.clone()
    }

    fn is_inside_test_case(&self) -> bool {
        self.state().in_test
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(stack: &TestScopeStack) -> Vec<ScopeFrame> {
        stack.scope_stack()
    }

    #[test]
    fn test_parse_scope_descriptors() {
        assert_eq!("It".parse::<CallScope>().unwrap(), CallScope::TestCase);
        assert_eq!(
            "describe".parse::<CallScope>().unwrap(),
            CallScope::Kind(ScopeKind::Describe)
        );
        assert_eq!("2".parse::<CallScope>().unwrap(), CallScope::Depth(2));
        assert!(matches!(
            "-1".parse::<CallScope>(),
            Err(MockError::InvalidScopeArgument(s)) if s == "-1"
        ));
        assert!(matches!(
            "Module".parse::<CallScope>(),
            Err(MockError::InvalidScopeArgument(_))
        ));
    }

    #[test]
    fn test_display_round_trips() {
        for scope in [
            CallScope::Depth(3),
            CallScope::TestCase,
            CallScope::Kind(ScopeKind::Context),
        ] {
            assert_eq!(scope.to_string().parse::<CallScope>().unwrap(), scope);
        }
    }

    #[test]
    fn test_depth_scope_walks_outwards() {
        let stack = TestScopeStack::new();
        let describe = stack.enter_group(ScopeKind::Describe, "outer");
        let context = stack.enter_group(ScopeKind::Context, "inner");
        let groups = frames(&stack);

        assert!(CallScope::Depth(0).includes(Some(context), &groups));
        assert!(!CallScope::Depth(0).includes(Some(describe), &groups));
        assert!(CallScope::Depth(1).includes(Some(describe), &groups));
        assert!(CallScope::Depth(0).includes(None, &groups));
    }

    #[test]
    fn test_kind_scope_stops_at_nearest_group_of_kind() {
        let stack = TestScopeStack::new();
        let describe = stack.enter_group(ScopeKind::Describe, "outer");
        let context = stack.enter_group(ScopeKind::Context, "inner");
        let groups = frames(&stack);

        let in_context = CallScope::Kind(ScopeKind::Context);
        assert!(in_context.includes(Some(context), &groups));
        assert!(!in_context.includes(Some(describe), &groups));

        let in_describe = CallScope::Kind(ScopeKind::Describe);
        assert!(in_describe.includes(Some(context), &groups));
        assert!(in_describe.includes(Some(describe), &groups));
        assert!(!in_describe.includes(Some(stack.root()), &groups));
    }

    #[test]
    fn test_test_case_scope_only_sees_unattributed_calls() {
        let stack = TestScopeStack::new();
        let describe = stack.enter_group(ScopeKind::Describe, "d");
        let groups = frames(&stack);
        assert!(CallScope::TestCase.includes(None, &groups));
        assert!(!CallScope::TestCase.includes(Some(describe), &groups));
    }

    #[test]
    fn test_root_frame_is_never_popped() {
        let stack = TestScopeStack::new();
        stack.enter_group(ScopeKind::Describe, "d");
        assert!(stack.leave_group().is_some());
        assert!(stack.leave_group().is_none());
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.current_scope(), Some(stack.root()));
    }
}
