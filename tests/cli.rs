//! Binary-level integration tests: run the compiled `askdoc` binary against
//! a temp database with stub generator/embedder scripts.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn askdoc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("askdoc");
    path
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let bin_dir = root.join("bin");
    fs::create_dir_all(&bin_dir).unwrap();

    // Stub generator: emits one fixed Q&A pair regardless of input.
    let generator = write_script(
        &bin_dir,
        "qagen.sh",
        "#!/bin/sh\n\
         echo '[{\"question\":\"What is the return window?\",\"answer\":\"30 days\"}]'\n",
    );

    // Stub embedder: consumes stdin, emits a fixed 3-dim vector. Every
    // text embeds identically, so any query matches with similarity 1.
    let embedder = write_script(
        &bin_dir,
        "embed.sh",
        "#!/bin/sh\n\
         cat > /dev/null\n\
         echo '[1.0, 0.0, 0.0]'\n",
    );

    // Test document
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("policy.txt"),
        "Our return policy allows 30-day refunds.",
    )
    .unwrap();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/askdoc.sqlite"

[generation]
backend = "local"
command = "{generator}"

[embedding]
provider = "command"
command = "{embedder}"
dims = 3

[server]
bind = "127.0.0.1:7411"
"#,
        root = root.display(),
        generator = generator.display(),
        embedder = embedder.display(),
    );

    let config_path = config_dir.join("askdoc.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_askdoc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = askdoc_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run askdoc binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn doc_path(config_path: &Path) -> String {
    // tmp/config/askdoc.toml -> tmp/files/policy.txt
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("files/policy.txt").display().to_string()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_askdoc(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_askdoc(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_askdoc(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_persists_document_and_items() {
    let (_tmp, config_path) = setup_test_env();
    run_askdoc(&config_path, &["init"]);

    let file = doc_path(&config_path);
    let (stdout, stderr, success) = run_askdoc(
        &config_path,
        &[
            "ingest",
            &file,
            "--project",
            "p1",
            "--hint",
            "returns policy",
        ],
    );
    assert!(
        success,
        "ingest failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("qa items: 1"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_with_blank_hint_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_askdoc(&config_path, &["init"]);

    let file = doc_path(&config_path);
    let (stdout, stderr, success) = run_askdoc(
        &config_path,
        &["ingest", &file, "--project", "p1", "--hint", "  "],
    );
    assert!(!success, "blank hint should fail: stdout={}", stdout);
    assert!(stderr.contains("context hint"));
}

#[test]
fn test_ask_returns_the_stored_answer() {
    let (_tmp, config_path) = setup_test_env();
    run_askdoc(&config_path, &["init"]);

    let file = doc_path(&config_path);
    let (_, _, success) = run_askdoc(
        &config_path,
        &[
            "ingest",
            &file,
            "--project",
            "p1",
            "--hint",
            "returns policy",
        ],
    );
    assert!(success, "ingest failed");

    // The stub embedder maps every text to the same vector, so the query
    // matches the stored item with similarity 1.
    let (stdout, stderr, success) = run_askdoc(
        &config_path,
        &[
            "ask",
            "how long do I have to return an item",
            "--project",
            "p1",
        ],
    );
    assert!(success, "ask failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("30 days"));
}

#[test]
fn test_ask_on_empty_project_reports_no_knowledge_base() {
    let (_tmp, config_path) = setup_test_env();
    run_askdoc(&config_path, &["init"]);

    let (stdout, _, success) = run_askdoc(
        &config_path,
        &["ask", "anything", "--project", "empty-project"],
    );
    assert!(success, "ask on empty project must not be an error");
    assert!(stdout.contains("no documents"));
}

#[test]
fn test_qa_add_and_list() {
    let (_tmp, config_path) = setup_test_env();
    run_askdoc(&config_path, &["init"]);

    let file = doc_path(&config_path);
    let (stdout, _, success) = run_askdoc(
        &config_path,
        &[
            "ingest",
            &file,
            "--project",
            "p1",
            "--hint",
            "returns policy",
        ],
    );
    assert!(success, "ingest failed");

    // Pull the document id out of the ingest output.
    let doc_id = stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix("document: "))
        .expect("ingest output contains a document id")
        .to_string();

    let (stdout, stderr, success) = run_askdoc(
        &config_path,
        &[
            "qa",
            "add",
            "--project",
            "p1",
            "--document",
            &doc_id,
            "--question",
            "Who pays return shipping?",
            "--answer",
            "We do.",
        ],
    );
    assert!(
        success,
        "qa add failed: stdout={}, stderr={}",
        stdout, stderr
    );

    let (stdout, _, success) = run_askdoc(&config_path, &["qa", "list", "--document", &doc_id]);
    assert!(success, "qa list failed");
    assert!(stdout.contains("QA items (2)"));
    assert!(stdout.contains("Who pays return shipping?"));
    assert!(stdout.contains("manual"));
}

#[test]
fn test_qa_add_rejects_unknown_document() {
    let (_tmp, config_path) = setup_test_env();
    run_askdoc(&config_path, &["init"]);

    let (_, stderr, success) = run_askdoc(
        &config_path,
        &[
            "qa",
            "add",
            "--project",
            "p1",
            "--document",
            "no-such-doc",
            "--question",
            "Q",
            "--answer",
            "A",
        ],
    );
    assert!(!success);
    assert!(stderr.contains("document not found"));
}

#[test]
fn test_key_encrypt_roundtrips_through_config_secret() {
    let (_tmp, config_path) = setup_test_env();

    // Add a transit secret to the config.
    let mut config = fs::read_to_string(&config_path).unwrap();
    config.push_str("\n[transit]\nsecret = \"test-secret\"\n");
    fs::write(&config_path, config).unwrap();

    let (stdout, stderr, success) =
        run_askdoc(&config_path, &["key", "encrypt", "sk-test-credential"]);
    assert!(
        success,
        "key encrypt failed: stdout={}, stderr={}",
        stdout, stderr
    );
    let token = stdout.trim();
    assert!(!token.is_empty());
    assert_ne!(token, "sk-test-credential");
}
