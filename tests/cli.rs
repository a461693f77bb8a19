use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn retrofit_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_retrofit"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let src = root.join("src");
    fs::create_dir_all(src.join("jobs")).unwrap();
    fs::create_dir_all(root.join("config")).unwrap();

    fs::write(
        src.join("jobs").join("backup.com"),
        "$ SET NOON\n$ ON ERROR THEN GOTO FAIL\n$ BACKUP/IMAGE DUA0: MUA0:ORDERS.BCK/SAVE_SET\n$ EXIT\n$FAIL:\n$ WRITE SYS$OUTPUT \"backup to tape failed\"\n$ STOP\n",
    )
    .unwrap();
    fs::write(
        src.join("loader.c"),
        "#include <stdio.h>\n\nint load_orders(FILE *f) {\n  char line[256];\n  while (fgets(line, sizeof line, f)) {\n    insert_order(line);\n  }\n  return 0;\n}\n",
    )
    .unwrap();
    fs::write(
        src.join("orders.sqlmod"),
        "SELECT order_id FROM orders WHERE status = 'OPEN';\nINSERT INTO audit_log VALUES (1);\n",
    )
    .unwrap();
    fs::write(
        src.join("README.txt"),
        "Nightly operations.\n\nThe backup job writes the orders save set to tape.\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/retrofit.sqlite"

[indexing]
root = "{}/src"

[retrieval]
max_context_chars = 4000

[llm]
base_url = "http://127.0.0.1:9"
timeout_secs = 2
"#,
        root.display(),
        root.display()
    );

    let config_path = root.join("config").join("retrofit.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_retrofit(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = retrofit_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RETROFIT_OLLAMA_URL")
        .env_remove("RETROFIT_OLLAMA_MODEL")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run retrofit binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_retrofit(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, _, success) = run_retrofit(&config_path, &["init"]);
    assert!(success, "second init failed");
}

#[test]
fn test_index_reports_counts() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_retrofit(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("scanned:   4"), "got: {}", stdout);
    assert!(stdout.contains("updated:   4"), "got: {}", stdout);
    assert!(stdout.trim_end().ends_with("ok"));

    let (stdout, _, _) = run_retrofit(&config_path, &["index"]);
    assert!(stdout.contains("updated:   0"), "got: {}", stdout);
    assert!(stdout.contains("unchanged: 4"), "got: {}", stdout);
}

#[test]
fn test_index_missing_root_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nope");

    let (_, stderr, success) =
        run_retrofit(&config_path, &["index", "--root", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("not found") || stderr.contains("nope"), "got: {}", stderr);
}

#[test]
fn test_query_json_has_line_ranges() {
    let (_tmp, config_path) = setup_test_env();
    run_retrofit(&config_path, &["index"]);

    let (stdout, stderr, success) =
        run_retrofit(&config_path, &["query", "tape", "--format", "json"]);
    assert!(success, "query failed: {}", stderr);

    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    for hit in hits {
        assert!(hit["start_line"].as_i64().unwrap() >= 1);
        assert!(hit["end_line"].as_i64().unwrap() >= hit["start_line"].as_i64().unwrap());
        assert!(hit["chunk_id"].is_i64());
    }
}

#[test]
fn test_query_type_filter_and_quotes() {
    let (_tmp, config_path) = setup_test_env();
    run_retrofit(&config_path, &["index"]);

    let (stdout, _, success) = run_retrofit(&config_path, &["query", "tape", "--type", "dcl"]);
    assert!(success);
    assert!(stdout.contains("backup.com"));
    assert!(!stdout.contains("README.txt"));

    let (stdout, stderr, success) = run_retrofit(&config_path, &["query", "\"tape\" OR 'x"]);
    assert!(success, "quoted query failed: {}", stderr);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_get_chunk() {
    let (_tmp, config_path) = setup_test_env();
    run_retrofit(&config_path, &["index"]);

    let (stdout, _, _) = run_retrofit(&config_path, &["query", "insert_order", "--format", "json"]);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let id = hits[0]["chunk_id"].as_i64().unwrap().to_string();

    let (stdout, stderr, success) = run_retrofit(&config_path, &["get", &id]);
    assert!(success, "get failed: {}", stderr);
    assert!(stdout.contains("loader.c"));
    assert!(stdout.contains("kind:        function"));
    assert!(stdout.contains("lines:       3-9"));

    let (_, _, success) = run_retrofit(&config_path, &["get", "999999"]);
    assert!(!success);
}

#[test]
fn test_explain_context_and_rules() {
    let (_tmp, config_path) = setup_test_env();
    run_retrofit(&config_path, &["index"]);

    let (stdout, stderr, success) = run_retrofit(&config_path, &["explain", "backup"]);
    assert!(success, "explain failed: {}", stderr);
    assert!(stdout.contains("[1] "));
    assert!(stdout.contains("Citations:"));

    let (stdout, stderr, success) =
        run_retrofit(&config_path, &["explain", "backup", "--mode", "rules", "--type", "dcl"]);
    assert!(success, "rules failed: {}", stderr);
    assert!(stdout.contains("Labels: FAIL"), "got: {}", stdout);
    assert!(stdout.contains("THEN GOTO FAIL"));
}

#[test]
fn test_explain_llm_unreachable_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_retrofit(&config_path, &["index"]);

    let (_, stderr, success) = run_retrofit(&config_path, &["explain", "backup", "--mode", "llm"]);
    assert!(!success);
    assert!(stderr.contains("Ollama"), "got: {}", stderr);
}

#[test]
fn test_explain_llm_without_context_skips_call() {
    let (_tmp, config_path) = setup_test_env();
    run_retrofit(&config_path, &["index"]);

    let (_, stderr, success) =
        run_retrofit(&config_path, &["explain", "zebra giraffe", "--mode", "llm"]);
    assert!(success, "expected no LLM call: {}", stderr);
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();
    run_retrofit(&config_path, &["index"]);

    let (stdout, _, success) = run_retrofit(&config_path, &["stats", "--format", "json"]);
    assert!(success);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["documents"], 4);
    assert_eq!(stats["by_type"].as_array().unwrap().len(), 4);
}
