//! Integration tests for mock installation, module sessions and scope exit

use mockr::mock::MockKey;
use mockr::{
    CallArgs, CallAssertion, FnCommand, MemoryHost, MockConfig, MockDeclaration, MockEngine,
    MockError, Parameter, ParameterFilter, ScopeKind, SessionId, Signature, TestScopeStack, Value,
};
use std::sync::Arc;

struct Fixture {
    host: Arc<MemoryHost>,
    scopes: Arc<TestScopeStack>,
    engine: MockEngine,
}

fn fixture_with(config: MockConfig) -> Fixture {
    let host = Arc::new(MemoryHost::new());
    host.define(FnCommand::new(
        Signature::cmdlet("Get-Item")
            .param(Parameter::new("Path").at(0))
            .in_module("Storage"),
        |_, _| Ok(vec![Value::from("real")]),
    ));
    let scopes = Arc::new(TestScopeStack::new());
    let engine = MockEngine::with_config(host.clone(), scopes.clone(), config);
    Fixture {
        host,
        scopes,
        engine,
    }
}

fn fixture() -> Fixture {
    fixture_with(MockConfig::default())
}

fn get_item(f: &Fixture, from: Option<&str>, path: &str) -> Vec<Value> {
    f.host
        .invoke(from, "Get-Item", &CallArgs::new().with("Path", path), &[])
        .expect("call Get-Item")
}

fn count(f: &Fixture, scope: &str) -> usize {
    f.engine
        .count_calls(&CallAssertion::new("Get-Item").scope(scope))
        .expect("count calls")
        .matching
}

#[test]
fn test_repeated_declarations_share_one_shim() {
    let f = fixture();
    f.engine
        .mock(MockDeclaration::new("Get-Item").returns("A"))
        .unwrap();
    let aliases = f.host.aliases(&SessionId::global());
    assert_eq!(aliases, vec!["Get-Item", "Storage\\Get-Item"]);

    f.engine
        .mock(
            MockDeclaration::new("GET-ITEM")
                .returns("B")
                .filter(ParameterFilter::equals([("Path", "/tmp")])),
        )
        .unwrap();
    assert_eq!(f.host.aliases(&SessionId::global()), aliases);
    assert_eq!(f.engine.table().len(), 1);

    assert_eq!(get_item(&f, None, "/tmp"), vec![Value::from("B")]);
    assert_eq!(get_item(&f, None, "/etc"), vec![Value::from("A")]);
    let qualified = f
        .host
        .invoke(None, "Storage\\Get-Item", &CallArgs::new(), &[])
        .unwrap();
    assert_eq!(qualified, vec![Value::from("A")]);
}

#[test]
fn test_group_exit_removes_the_groups_mocks() {
    let f = fixture();
    f.scopes.enter_group(ScopeKind::Describe, "items");
    f.engine
        .mock(MockDeclaration::new("Get-Item").returns("A"))
        .unwrap();
    assert_eq!(get_item(&f, None, "/tmp"), vec![Value::from("A")]);

    let exit = f.engine.exit_group();
    f.scopes.leave_group();
    assert_eq!(exit.removed, vec![MockKey::new(None, "Get-Item")]);
    assert!(f.engine.table().is_empty());
    assert!(f.host.aliases(&SessionId::global()).is_empty());
    assert_eq!(get_item(&f, None, "/tmp"), vec![Value::from("real")]);
}

#[test]
fn test_group_exit_prunes_blocks_declared_inside() {
    let f = fixture();
    f.engine
        .mock(MockDeclaration::new("Get-Item").returns("outer"))
        .unwrap();

    f.scopes.enter_group(ScopeKind::Describe, "inner");
    f.engine
        .mock(
            MockDeclaration::new("Get-Item")
                .returns("inner")
                .filter(ParameterFilter::equals([("Path", "/tmp")])),
        )
        .unwrap();
    assert_eq!(get_item(&f, None, "/tmp"), vec![Value::from("inner")]);

    let exit = f.engine.exit_group();
    f.scopes.leave_group();
    assert!(exit.removed.is_empty());
    assert_eq!(exit.pruned_blocks, 1);
    assert_eq!(exit.rehomed_calls, 1);
    assert_eq!(get_item(&f, None, "/tmp"), vec![Value::from("outer")]);
}

#[test]
fn test_calls_are_rehomed_as_groups_close() {
    let f = fixture();
    f.engine
        .mock(MockDeclaration::new("Get-Item").returns("A"))
        .unwrap();

    f.scopes.enter_group(ScopeKind::Describe, "describe");
    f.scopes.enter_test();
    get_item(&f, None, "/d");
    assert_eq!(count(&f, "It"), 1);
    assert_eq!(f.engine.exit_test_case(), 1);
    f.scopes.leave_test();
    assert_eq!(count(&f, "It"), 0);

    f.scopes.enter_group(ScopeKind::Context, "context");
    f.scopes.enter_test();
    get_item(&f, None, "/c");
    assert_eq!(count(&f, "It"), 1);
    assert_eq!(f.engine.exit_test_case(), 1);
    f.scopes.leave_test();

    assert_eq!(count(&f, "Context"), 1);
    assert_eq!(count(&f, "Describe"), 2);
    assert_eq!(count(&f, "0"), 1);
    assert_eq!(count(&f, "1"), 2);

    let exit = f.engine.exit_group();
    f.scopes.leave_group();
    assert_eq!(exit.rehomed_calls, 1);
    assert_eq!(count(&f, "0"), 2);

    let exit = f.engine.exit_group();
    f.scopes.leave_group();
    assert_eq!(exit.rehomed_calls, 2);
    assert_eq!(count(&f, "0"), 2);

    let exit = f.engine.exit_group();
    assert!(exit.removed.is_empty());
    assert_eq!(f.engine.table().len(), 1);
}

#[test]
fn test_root_mocks_go_when_not_persisted() {
    let f = fixture_with(MockConfig {
        persist_root_mocks: false,
        ..MockConfig::default()
    });
    f.engine
        .mock(MockDeclaration::new("Get-Item").returns("A"))
        .unwrap();
    let exit = f.engine.exit_group();
    assert_eq!(exit.removed.len(), 1);
    assert_eq!(get_item(&f, None, "/tmp"), vec![Value::from("real")]);
}

#[test]
fn test_module_mock_over_global_mock_wraps_the_original() {
    let f = fixture();
    f.engine
        .mock(MockDeclaration::new("Get-Item").returns("global"))
        .unwrap();
    f.engine
        .mock(
            MockDeclaration::new("Get-Item")
                .module("Storage")
                .returns("module"),
        )
        .unwrap();

    let key = MockKey::new(Some("Storage"), "Get-Item");
    let (original, session) = f
        .engine
        .table()
        .with_record(&key, |r| {
            (r.original.signature().name.clone(), r.session.clone())
        })
        .unwrap();
    assert_eq!(original, "Get-Item");
    assert_eq!(session, SessionId::module("Storage"));

    assert_eq!(get_item(&f, Some("Storage"), "/x"), vec![Value::from("module")]);
    assert_eq!(get_item(&f, None, "/x"), vec![Value::from("global")]);

    assert!(f.engine.remove_mock("Get-Item", None));
    assert_eq!(get_item(&f, Some("storage"), "/x"), vec![Value::from("module")]);
    assert_eq!(get_item(&f, None, "/x"), vec![Value::from("real")]);

    assert_eq!(f.engine.remove_all(), 1);
    assert_eq!(get_item(&f, Some("Storage"), "/x"), vec![Value::from("real")]);
}

#[test]
fn test_private_commands_are_mocked_inside_their_module() {
    let f = fixture();
    f.host.define_private(
        "Storage",
        FnCommand::new(Signature::function("Read-Blob"), |_, _| {
            Ok(vec![Value::from("blob")])
        }),
    );

    let err = f
        .engine
        .mock(MockDeclaration::new("Read-Blob").returns("fake"))
        .unwrap_err();
    assert_eq!(err.to_string(), "Could not find Command Read-Blob");

    f.engine
        .mock(
            MockDeclaration::new("Read-Blob")
                .module("Storage")
                .returns("fake"),
        )
        .unwrap();
    let out = f
        .host
        .invoke(Some("Storage"), "Read-Blob", &CallArgs::new(), &[])
        .unwrap();
    assert_eq!(out, vec![Value::from("fake")]);
}

#[test]
fn test_unknown_module_is_reported() {
    let f = fixture();
    let err = f
        .engine
        .mock(MockDeclaration::new("Get-Item").module("Nope"))
        .unwrap_err();
    assert!(matches!(err, MockError::NotFound { .. }));
    assert_eq!(err.to_string(), "Could not find module 'Nope'");
    assert!(f.engine.table().is_empty());
}

#[test]
fn test_mocking_through_an_alias_restores_it() {
    let f = fixture();
    f.host.define_alias("gi", "Get-Item");
    f.engine
        .mock(MockDeclaration::new("gi").returns("aliased"))
        .unwrap();

    let out = f.host.invoke(None, "gi", &CallArgs::new(), &[]).unwrap();
    assert_eq!(out, vec![Value::from("aliased")]);
    assert_eq!(get_item(&f, None, "/x"), vec![Value::from("real")]);

    assert!(f.engine.remove_mock("GI", None));
    assert!(f.host.has_alias(&SessionId::global(), "gi"));
    let out = f.host.invoke(None, "gi", &CallArgs::new(), &[]).unwrap();
    assert_eq!(out, vec![Value::from("real")]);
}
