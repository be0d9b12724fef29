//! Integration tests for `logtree classify`, `tree` and `patterns validate`.
//!
//! Pattern and config files are written to temp directories; records are
//! captured through an in-memory JSON lines sink.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use logtree_cli::cli::PatternOpts;
use logtree_cli::commands::classify::classify_stream;
use logtree_cli::commands::patterns::validate_files;
use logtree_cli::commands::tree::TreeReport;
use logtree_cli::commands::{build_classifier, load_config};
use logtree_cli::sinks::JsonLinesSink;

const APP_PATTERNS: &str = r#"
patterns:
  - name: custom_int
    parent: events
    pattern: "%{INT:customvalue}"
  - name: custom_str
    parent: events
    pattern: "%{LD:customvalue}"
  - name: custom_key
    parent: custom_str
    field: customvalue
    pattern: "key=%{LD:keyvalue}"
"#;

fn write_project(dir: &TempDir) -> PathBuf {
    fs::create_dir_all(dir.path().join("patterns")).expect("should create patterns dir");
    fs::write(dir.path().join("patterns/app.yaml"), APP_PATTERNS).expect("should write patterns");

    let config_path = dir.path().join("logtree.toml");
    fs::write(
        &config_path,
        "[patterns]\nfiles = [\"patterns/app.yaml\"]\nstats = true\n\n[output]\nsink = \"noop\"\n",
    )
    .expect("should write config");
    config_path
}

async fn classify_lines(
    config_path: &Path,
    opts: &PatternOpts,
    input: &str,
) -> Vec<serde_json::Value> {
    let loaded = load_config(Some(config_path)).await.expect("config should load");
    let classifier = build_classifier(&loaded, opts, false)
        .await
        .expect("classifier should build");

    let mut sink = JsonLinesSink::new("test", Vec::new());
    classify_stream(&classifier, input.as_bytes(), &mut sink)
        .await
        .expect("classification should succeed");

    let out = String::from_utf8(sink.into_inner().expect("flush")).expect("valid UTF-8");
    out.lines()
        .map(|l| serde_json::from_str(l).expect("one JSON object per line"))
        .collect()
}

#[tokio::test]
async fn test_classify_with_config_relative_pattern_files() {
    // Given: A config that references a pattern file relative to itself
    let dir = TempDir::new().expect("should create temp dir");
    let config_path = write_project(&dir);

    // When: Classifying a mixed input
    let input = "4\nrandom string\nkey=keyval\n2020-04-14T14:11:21+03:00\tlocalhost\t1234\tlogline\n";
    let records = classify_lines(&config_path, &PatternOpts::default(), input).await;

    // Then: Each line gets the most specific type
    let types: Vec<_> = records.iter().map(|r| r["eventType"].clone()).collect();
    assert_eq!(types, vec!["custom_int", "custom_str", "custom_key", "logevents"]);
    assert_eq!(records[0]["customvalue"], 4);
    assert_eq!(records[2]["keyvalue"], "keyval");
    assert_eq!(records[3]["host"], "localhost");
}

#[tokio::test]
async fn test_classify_only_types_restricts_tree() {
    let dir = TempDir::new().expect("should create temp dir");
    let config_path = write_project(&dir);

    let opts = PatternOpts {
        only_types: vec!["custom_key".to_owned()],
        ..PatternOpts::default()
    };
    let records = classify_lines(&config_path, &opts, "4\nkey=x\n").await;

    assert_eq!(records[0]["eventType"], "custom_str");
    assert_eq!(records[1]["eventType"], "custom_key");
}

#[tokio::test]
async fn test_classify_extra_pattern_file_from_command_line() {
    let dir = TempDir::new().expect("should create temp dir");
    let config_path = write_project(&dir);

    let extra = dir.path().join("extra.yaml");
    fs::write(
        &extra,
        "grok:\n  TICKET: \"[A-Z]+-[0-9]+\"\npatterns:\n  - name: ticket\n    order: 1\n    pattern: \"%{TICKET:ticket} %{GREEDYDATA:msg}\"\n",
    )
    .expect("should write extra patterns");

    let opts = PatternOpts {
        patterns: vec![extra],
        ..PatternOpts::default()
    };
    let records = classify_lines(&config_path, &opts, "OPS-7 rotate keys\n").await;

    assert_eq!(records[0]["eventType"], "ticket");
    assert_eq!(records[0]["ticket"], "OPS-7");
    assert_eq!(records[0]["__match"], serde_json::json!(["events", "ticket"]));
}

#[tokio::test]
async fn test_tree_report_for_project() {
    let dir = TempDir::new().expect("should create temp dir");
    let config_path = write_project(&dir);

    let loaded = load_config(Some(config_path.as_path())).await.expect("config should load");
    let classifier = build_classifier(&loaded, &PatternOpts::default(), false)
        .await
        .expect("classifier should build");
    let report = TreeReport::from_tree(classifier.snapshot().tree(), false);

    assert_eq!(report.pattern_count, 5);
    assert!(report.rendered.starts_with("+ events\n"));
    assert!(report.rendered.contains("+++ custom_key\n"));
}

#[tokio::test]
async fn test_malformed_pattern_file_is_a_pattern_error() {
    let dir = TempDir::new().expect("should create temp dir");
    let config_path = dir.path().join("logtree.toml");
    fs::write(dir.path().join("broken.yaml"), "patterns: [: {").expect("should write patterns");
    fs::write(&config_path, "[patterns]\nfiles = [\"broken.yaml\"]\n").expect("should write config");

    let loaded = load_config(Some(config_path.as_path())).await.expect("config should load");
    let err = build_classifier(&loaded, &PatternOpts::default(), false)
        .await
        .expect_err("malformed pattern file should fail");
    assert_eq!(err.exit_code(), 3);
}

#[tokio::test]
async fn test_missing_pattern_file_is_skipped() {
    let dir = TempDir::new().expect("should create temp dir");
    let config_path = write_project(&dir);

    let opts = PatternOpts {
        patterns: vec![dir.path().join("missing.yaml")],
        ..PatternOpts::default()
    };
    let records = classify_lines(&config_path, &opts, "4\n").await;
    assert_eq!(records[0]["eventType"], "custom_int");
}

#[tokio::test]
async fn test_patterns_validate_directory() {
    let dir = TempDir::new().expect("should create temp dir");
    write_project(&dir);

    let report = validate_files(&[dir.path().join("patterns")]).await;
    assert!(report.is_valid(), "report: {report:?}");
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].patterns, 3);
    assert_eq!(report.compiled, 5);
}
