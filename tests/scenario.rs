//! Integration tests for the JSON scenario runner

use mockr::scenario::{self, Scenario};
use mockr::{MockConfig, Value};
use std::io::Write;

const FILES: &str = r#"{
    "commands": [
        { "name": "Get-Item", "kind": "cmdlet",
          "parameters": [{ "name": "Path", "position": 0, "from_pipeline": true }] },
        { "name": "Set-Variable", "kind": "cmdlet",
          "parameters": [{ "name": "Name" }, { "name": "Value" }, { "name": "Scope" }] }
    ],
    "aliases": { "gi": "Get-Item" },
    "steps": [
        { "step": "enter", "kind": "describe", "name": "files" },
        { "step": "mock", "command": "Get-Item", "returns": "A",
          "filter": { "Path": "/tmp" }, "verifiable": true },
        { "step": "enter_test", "name": "reads tmp" },
        { "step": "call", "command": "gi", "args": { "Path": "/tmp" }, "expect": ["A"] },
        { "step": "call", "command": "Get-Item", "input": ["/etc", "/var"] },
        { "step": "assert_called", "command": "Get-Item", "times": 1, "exactly": true,
          "scope": "It" },
        { "step": "assert_verifiable" },
        { "step": "leave_test" },
        { "step": "mock", "command": "Set-Variable", "filter": { "Name": "never" } },
        { "step": "call", "command": "Set-Variable", "args": { "Name": "x", "Scope": 1 } },
        { "step": "assert_called", "command": "Get-Item", "times": 2 },
        { "step": "leave" }
    ]
}"#;

fn output_of(report: &scenario::ScenarioReport, index: usize) -> &Value {
    &report.steps[index].output.as_ref().expect("step output")[0]
}

#[test]
fn test_files_scenario() {
    let scenario = Scenario::from_json_str(FILES).expect("parse scenario");
    let report = scenario::run(&scenario, MockConfig::default()).expect("run scenario");

    let failed: Vec<usize> = report.failures().map(|s| s.index).collect();
    assert_eq!(failed, vec![10]);
    assert!(report.steps[10]
        .detail
        .as_deref()
        .unwrap_or_default()
        .starts_with("Expected Get-Item to be called at least 2 times but was called 1 times"));

    let fallback = output_of(&report, 4);
    assert_eq!(fallback.field("original"), Some(&Value::from("Get-Item")));
    assert_eq!(
        fallback.field("input"),
        Some(&Value::from(vec!["/etc", "/var"]))
    );

    let set_variable = output_of(&report, 9);
    let scope = set_variable.field("args").and_then(|a| a.field("Scope"));
    assert_eq!(scope, Some(&Value::Int(3)));
}

#[test]
fn test_step_labels_describe_each_step() {
    let scenario = Scenario::from_json_str(FILES).expect("parse scenario");
    let labels: Vec<String> = scenario.steps.iter().map(|s| s.label()).collect();
    assert_eq!(labels.len(), 12);
    assert_eq!(labels[1], "mock Get-Item");
    assert_eq!(labels[2], "enter test 'reads tmp'");
    assert_eq!(labels[3], "call gi");
    assert_eq!(labels[6], "assert verifiable");
    assert_eq!(labels[11], "leave");
}

#[test]
fn test_config_file_changes_scope_bias() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, r#"{{ "scope_bias": {{ "depth": 5 }} }}"#).expect("write config");
    let config = MockConfig::from_path(file.path()).expect("load config");
    assert_eq!(config.scope_bias.depth, 5);
    assert_eq!(config.scope_bias.parameter, "Scope");

    let scenario = Scenario::from_json_str(FILES).expect("parse scenario");
    let report = scenario::run(&scenario, config).expect("run scenario");
    let scope = output_of(&report, 9)
        .field("args")
        .and_then(|a| a.field("Scope"))
        .cloned();
    assert_eq!(scope, Some(Value::Int(6)));
}

#[test]
fn test_unknown_command_fails_only_its_step() {
    let scenario = Scenario::from_json_str(
        r#"{
            "commands": [{ "name": "Get-Item", "returns": "real" }],
            "steps": [
                { "step": "mock", "command": "Get-Nothing" },
                { "step": "call", "command": "Get-Item", "expect": ["real"] },
                { "step": "call", "command": "Get-Item", "expect": ["other"] }
            ]
        }"#,
    )
    .expect("parse scenario");
    let report = scenario::run(&scenario, MockConfig::default()).expect("run scenario");

    assert!(!report.passed());
    assert_eq!(
        report.steps[0].detail.as_deref(),
        Some("Could not find Command Get-Nothing")
    );
    assert!(report.steps[1].ok);
    assert!(report.steps[2]
        .detail
        .as_deref()
        .unwrap_or_default()
        .contains("expected output @(other) but got @(real)"));
}

#[test]
fn test_report_serializes_to_json() {
    let scenario = Scenario::from_json_str(FILES).expect("parse scenario");
    let report = scenario::run(&scenario, MockConfig::default()).expect("run scenario");
    let json = serde_json::to_value(&report).expect("serialize report");

    let steps = json["steps"].as_array().expect("steps array");
    assert_eq!(steps.len(), 12);
    assert_eq!(steps[3]["output"], serde_json::json!(["A"]));
    assert_eq!(steps[10]["ok"], serde_json::json!(false));
    assert!(steps[0].get("detail").is_none());
}
