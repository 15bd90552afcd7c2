use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn kbr_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("kbr");
    path
}

/// Offline configuration: no generation, hash embeddings, no web pages.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/kbr.sqlite"

[cache]
dir = "{root}/cache"

[embedding]
provider = "hash"
dims = 64

[generation]
provider = "disabled"

[collector]
token_env = "KBR_CLI_TEST_TOKEN_NEVER_SET"

[knowledge.accounting]
urls = []

[knowledge.management]
urls = []
"#,
        root = root.display()
    );

    let config_path = config_dir.join("kbr.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_kbr(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = kbr_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run kbr binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database_and_cache() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_kbr(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/kbr.sqlite").exists());
    assert!(tmp.path().join("cache").is_dir());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_kbr(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_kbr(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_stats_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();
    run_kbr(&config_path, &["init"]);

    let (stdout, stderr, success) = run_kbr(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Documents:   0"));
    assert!(stdout.contains("accounting"));
    assert!(stdout.contains("not built"));
}

#[test]
fn test_process_with_nothing_to_do() {
    let (_tmp, config_path) = setup_test_env();
    run_kbr(&config_path, &["init"]);

    let (stdout, _, success) = run_kbr(&config_path, &["process"]);
    assert!(success);
    assert!(stdout.contains("documents chunked: 0"));
    assert!(stdout.contains("ok"));

    let (stdout, _, success) = run_kbr(&config_path, &["embed", "pending"]);
    assert!(success);
    assert!(stdout.contains("all fragments up to date"));
}

#[test]
fn test_collect_requires_token() {
    let (_tmp, config_path) = setup_test_env();
    run_kbr(&config_path, &["init"]);

    let (_, stderr, success) = run_kbr(&config_path, &["collect", "551342"]);
    assert!(!success);
    assert!(stderr.contains("KBR_CLI_TEST_TOKEN_NEVER_SET"));
}

#[test]
fn test_classify_without_generator_is_general() {
    let (_tmp, config_path) = setup_test_env();
    run_kbr(&config_path, &["init"]);

    let (stdout, stderr, success) =
        run_kbr(&config_path, &["classify", "Como emitir uma nota fiscal?"]);
    assert!(success, "classify failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(stdout.trim(), "general");
}

#[test]
fn test_ask_without_content_or_generator_is_friendly() {
    let (_tmp, config_path) = setup_test_env();
    run_kbr(&config_path, &["init"]);

    let (stdout, stderr, success) = run_kbr(
        &config_path,
        &["ask", "Qual o prazo da ECF?", "--category", "accounting"],
    );
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Sorry"));
}

#[test]
fn test_build_without_content_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_kbr(&config_path, &["init"]);

    let (_, stderr, success) = run_kbr(&config_path, &["build", "management"]);
    assert!(!success);
    assert!(stderr.contains("management"));

    let (_, stderr, success) = run_kbr(&config_path, &["build", "database"]);
    assert!(!success);
    assert!(stderr.contains("no knowledge base"));
}

#[test]
fn test_feedback_and_usage_stats() {
    let (_tmp, config_path) = setup_test_env();
    run_kbr(&config_path, &["init"]);

    let (_, _, success) = run_kbr(&config_path, &["stats"]);
    assert!(success);

    for _ in 0..2 {
        let (_, stderr, success) = run_kbr(
            &config_path,
            &["ask", "Olá, tudo bem?", "--category", "general"],
        );
        assert!(success, "ask failed: {}", stderr);
    }

    let (stdout, stderr, success) =
        run_kbr(&config_path, &["feedback", "positive", "Olá, tudo bem?"]);
    assert!(success, "feedback failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("rating: positive"));
    let (_, _, success) = run_kbr(
        &config_path,
        &["feedback", "negative", "Olá, tudo bem?", "--response", "Sorry"],
    );
    assert!(success);

    let (_, stderr, success) = run_kbr(&config_path, &["feedback", "great", "Olá"]);
    assert!(!success);
    assert!(stderr.contains("positive, negative, neutral"));

    let (stdout, _, success) = run_kbr(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Interactions: 2"));
    assert!(stdout.contains("Feedback:     2"));
    assert!(stdout.contains("Success rate: 50%"));
    assert!(stdout.contains("general"));
    assert!(stdout.contains("Olá, tudo bem?"));
}

#[test]
fn test_stats_without_feedback_shows_no_success_rate() {
    let (_tmp, config_path) = setup_test_env();
    run_kbr(&config_path, &["init"]);

    let (stdout, _, success) = run_kbr(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Interactions: 0"));
    assert!(stdout.contains("Success rate: n/a"));
}
