use std::path::{Path, PathBuf};
use std::process::Command;

fn temp_workspace(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("protomut-cli-{name}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp workspace");
    root
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(name)
}

fn run_cli(ws: &Path, args: &[&str]) -> std::process::Output {
    let config = ws.join("protomut.toml");
    Command::new(env!("CARGO_BIN_EXE_protomut"))
        .arg("--config")
        .arg(&config)
        .args(args)
        .output()
        .expect("run cli")
}

fn stdout_json(out: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&out.stdout).expect("stdout json")
}

#[test]
fn init_prints_a_valid_instance() {
    let ws = temp_workspace("init");
    let schema = fixture("tree.schema.json");
    let out = run_cli(&ws, &["init", "--schema", schema.to_str().expect("utf8"), "--json"]);
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let doc = stdout_json(&out);
    assert_eq!(doc["id"], 0);

    let meta = run_cli(
        &ws,
        &["init", "--schema", schema.to_str().expect("utf8"), "--root", "Meta", "--json"],
    );
    assert_eq!(meta.status.code(), Some(0));
    let doc = stdout_json(&meta);
    assert_eq!(doc["owner"], "");
    assert_eq!(doc["revision"], 1);
}

#[test]
fn mutate_is_reproducible_and_validates() {
    let ws = temp_workspace("mutate");
    let schema = fixture("tree.schema.json");
    let sample = fixture("tree.sample.json");
    let schema = schema.to_str().expect("utf8");
    let sample = sample.to_str().expect("utf8");

    let mut outputs = Vec::new();
    for name in ["a.json", "b.json"] {
        let target = ws.join(name);
        let out = run_cli(
            &ws,
            &[
                "mutate",
                "--schema",
                schema,
                "--input",
                sample,
                "--seed",
                "77",
                "--runs",
                "20",
                "--out",
                target.to_str().expect("utf8"),
            ],
        );
        assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
        outputs.push(std::fs::read(&target).expect("read output"));
    }
    assert_eq!(outputs[0], outputs[1]);

    let target = ws.join("a.json");
    let check = run_cli(
        &ws,
        &["validate", "--schema", schema, "--input", target.to_str().expect("utf8")],
    );
    assert_eq!(check.status.code(), Some(0));
}

#[test]
fn mutate_show_log_reports_records() {
    let ws = temp_workspace("log");
    let schema = fixture("tree.schema.json");
    let sample = fixture("tree.sample.json");
    let out = run_cli(
        &ws,
        &[
            "--json",
            "mutate",
            "--schema",
            schema.to_str().expect("utf8"),
            "--input",
            sample.to_str().expect("utf8"),
            "--show-log",
        ],
    );
    assert_eq!(out.status.code(), Some(0));
    let log: serde_json::Value = serde_json::from_slice(&out.stderr).expect("log json");
    let records = log.as_array().expect("array");
    assert!(!records.is_empty());
    assert!(records[0]["op"]["kind"].is_string());
    stdout_json(&out);
}

#[test]
fn crossover_of_two_inputs_is_valid() {
    let ws = temp_workspace("crossover");
    let schema = fixture("tree.schema.json");
    let schema = schema.to_str().expect("utf8");
    let other = ws.join("other.json");
    std::fs::write(&other, br#"{"id": 500, "count": 12, "tags": ["z"]}"#).expect("write other");
    let merged = ws.join("merged.json");

    let out = run_cli(
        &ws,
        &[
            "crossover",
            "--schema",
            schema,
            fixture("tree.sample.json").to_str().expect("utf8"),
            other.to_str().expect("utf8"),
            "--seed",
            "3",
            "--out",
            merged.to_str().expect("utf8"),
        ],
    );
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let check = run_cli(
        &ws,
        &["validate", "--schema", schema, "--input", merged.to_str().expect("utf8")],
    );
    assert_eq!(check.status.code(), Some(0));
}

#[test]
fn validate_flags_out_of_range_and_missing_fields() {
    let ws = temp_workspace("validate");
    let schema = fixture("tree.schema.json");
    let schema = schema.to_str().expect("utf8");

    let bad = ws.join("bad.json");
    std::fs::write(&bad, br#"{"id": 5000}"#).expect("write bad");
    let out = run_cli(&ws, &["--json", "validate", "--schema", schema, "--input", bad.to_str().expect("utf8")]);
    assert_eq!(out.status.code(), Some(1));
    let doc = stdout_json(&out);
    assert_eq!(doc["status"], "invalid");
    assert!(doc["detail"].as_str().expect("detail").contains("Node.id"));

    let missing = ws.join("missing.json");
    std::fs::write(&missing, br#"{"meta": {"owner": "x"}}"#).expect("write missing");
    let out = run_cli(&ws, &["validate", "--schema", schema, "--input", missing.to_str().expect("utf8")]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn bad_schema_is_an_error_exit() {
    let ws = temp_workspace("bad-schema");
    let schema = ws.join("schema.json");
    std::fs::write(&schema, br#"{"messages": [{"name": "M", "fields": [{"name": "x", "number": 0, "type": "bool"}]}]}"#)
        .expect("write schema");
    let out = run_cli(&ws, &["--json", "init", "--schema", schema.to_str().expect("utf8")]);
    assert_eq!(out.status.code(), Some(2));
    let doc = stdout_json(&out);
    assert_eq!(doc["status"], "error");
}

#[test]
fn config_file_limits_depth() {
    let ws = temp_workspace("config");
    std::fs::write(ws.join("protomut.toml"), "max_depth = 0\n").expect("write config");
    let schema = ws.join("chain.json");
    std::fs::write(
        &schema,
        br#"{"messages": [{"name": "Chain", "fields": [
            {"name": "v", "number": 1, "type": "int32", "label": "required"},
            {"name": "next", "number": 2, "type": "message", "message": "Chain", "label": "required"}
        ]}]}"#,
    )
    .expect("write schema");
    let out = run_cli(&ws, &["--json", "init", "--schema", schema.to_str().expect("utf8")]);
    assert_eq!(out.status.code(), Some(0));
    let doc = stdout_json(&out);
    assert_eq!(doc["v"], 0);
    assert!(doc.get("next").is_none());
}
