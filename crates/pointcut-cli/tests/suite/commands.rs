use std::path::PathBuf;

use assert_cmd::Command;
use pointcut_test_utils::fixtures::{target_fixture, TARGET};
use predicates::prelude::*;
use tempfile::TempDir;

const FOO: &str = "Lcom/example/Target;foo()V";

fn pointcut() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pointcut"));
    cmd.env_remove("RUST_LOG").env_remove("POINTCUT_CONFIG_PATH");
    cmd
}

/// A classpath directory holding the fixture class, and the path of its
/// `.class` file.
fn classpath() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(format!("{TARGET}.class"));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, target_fixture().bytes).unwrap();
    (dir, path)
}

fn json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}); stderr: {}",
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

#[test]
fn help_mentions_every_command() {
    pointcut().arg("--help").assert().success().stdout(
        predicate::str::contains("dump")
            .and(predicate::str::contains("frames"))
            .and(predicate::str::contains("locals"))
            .and(predicate::str::contains("resolve"))
            .and(predicate::str::contains("check"))
            .and(predicate::str::contains("complete")),
    );
}

#[test]
fn dump_lists_methods() {
    let (dir, class) = classpath();
    let output = pointcut()
        .current_dir(dir.path())
        .args(["dump", "--json"])
        .arg(&class)
        .output()
        .unwrap();
    assert!(output.status.success());
    let dump = json(&output);
    assert_eq!(dump["class"], TARGET);
    let names: Vec<_> = dump["methods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"mixed".to_string()), "{names:?}");
    assert!(names.contains(&"lambda$run$0".to_string()), "{names:?}");
}

#[test]
fn resolve_prints_every_match() {
    let (dir, class) = classpath();
    let output = pointcut()
        .current_dir(dir.path())
        .args(["resolve", "--json", "--method", "calls", "--at", "INVOKE", "--target", FOO])
        .arg(&class)
        .output()
        .unwrap();
    assert!(output.status.success());
    let matches = json(&output)["matches"].as_array().unwrap().clone();
    assert_eq!(matches.len(), 5);
    assert_eq!(matches[0]["label"], FOO);
}

#[test]
fn resolve_first_stops_early() {
    let (dir, class) = classpath();
    let output = pointcut()
        .current_dir(dir.path())
        .args(["resolve", "--json", "--first", "--method", "calls", "--at", "INVOKE", "--target", FOO])
        .arg(&class)
        .output()
        .unwrap();
    assert_eq!(json(&output)["matches"].as_array().unwrap().len(), 1);
}

#[test]
fn unresolved_exits_with_one() {
    let (dir, class) = classpath();
    pointcut()
        .current_dir(dir.path())
        .args(["resolve", "--method", "calls", "--at", "INVOKE", "--target", FOO, "--ordinal", "10"])
        .arg(&class)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("rejected by ordinal"));
}

#[test]
fn errors_exit_with_two() {
    let (dir, class) = classpath();
    pointcut()
        .current_dir(dir.path())
        .args(["resolve", "--method", "calls", "--at", "NOWHERE"])
        .arg(&class)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("NOWHERE"));

    pointcut()
        .current_dir(dir.path())
        .args(["resolve", "--method", "absent", "--at", "HEAD"])
        .arg(&class)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("absent"));

    pointcut()
        .current_dir(dir.path())
        .args(["dump"])
        .arg(dir.path().join("missing.class"))
        .assert()
        .code(2);
}

#[test]
fn spec_json_and_options_combine() {
    let (dir, class) = classpath();
    let spec = format!(r#"{{"value": "INVOKE", "target": "{FOO}", "ordinal": 0}}"#);
    let output = pointcut()
        .current_dir(dir.path())
        .args(["resolve", "--json", "--method", "calls", "--spec", &spec, "--ordinal", "3"])
        .arg(&class)
        .output()
        .unwrap();
    assert!(output.status.success());
    let matches = json(&output)["matches"].as_array().unwrap().clone();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["candidate"], 3);
}

#[test]
fn field_with_opcode_mnemonic() {
    let (dir, class) = classpath();
    let output = pointcut()
        .current_dir(dir.path())
        .args([
            "resolve",
            "--json",
            "--method",
            "mixed(Ljava/lang/String;)I",
            "--at",
            "FIELD",
            "--target",
            "Lcom/example/Target;values:[I",
            "--opcode",
            "getfield",
            "--arg",
            "array=length",
        ])
        .arg(&class)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(json(&output)["matches"].as_array().unwrap().len(), 1);
}

#[test]
fn check_reports_the_diagnostic() {
    let (dir, class) = classpath();
    pointcut()
        .current_dir(dir.path())
        .args(["check", "--method", "tail", "--at", "TAIL"])
        .arg(&class)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));

    pointcut()
        .current_dir(dir.path())
        .args(["check", "--method", "tail", "--at", "INVOKE", "--target", "Lcom/example/Target;log(Ljava/lang/String;)V"])
        .arg(&class)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("AT_UNRESOLVED"));
}

#[test]
fn complete_lists_field_targets() {
    let (dir, class) = classpath();
    pointcut()
        .current_dir(dir.path())
        .args(["complete", "--method", "mixed", "--at", "FIELD"])
        .arg(&class)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("Lcom/example/Target;values:[I")
                .and(predicate::str::contains("Lcom/example/Target;count:I")),
        );
}

#[test]
fn locals_at_an_instruction() {
    let (dir, class) = classpath();
    let output = pointcut()
        .current_dir(dir.path())
        .args(["locals", "--json", "--method", "local"])
        .arg(&class)
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows = json(&output)["rows"].as_array().unwrap().clone();
    let last = rows.last().expect("at least one instruction");
    assert!(
        last["locals"]
            .as_array()
            .unwrap()
            .iter()
            .any(|local| local["name"] == "x" && local["desc"] == "I"),
        "{last:#}"
    );
}

#[test]
fn frames_of_a_method() {
    let (dir, class) = classpath();
    pointcut()
        .current_dir(dir.path())
        .args(["frames", "--method", "eachList"])
        .arg(&class)
        .assert()
        .success()
        .stdout(predicate::str::contains("java/util/Iterator"));
}

#[test]
fn config_is_validated() {
    let (dir, class) = classpath();
    std::fs::write(dir.path().join("pointcut.toml"), "[resolve]\nfuzzy = 1\n").unwrap();
    pointcut()
        .current_dir(dir.path())
        .args(["dump"])
        .arg(&class)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("config"));

    let config = dir.path().join("other.toml");
    std::fs::write(&config, "[logging]\nlevel = \"error\"\n").unwrap();
    pointcut()
        .current_dir(dir.path())
        .args(["dump", "--config"])
        .arg(&config)
        .arg(&class)
        .assert()
        .success();
}
