use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn rag_backup_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("rag-backup");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let store = root.join("chroma_db");
    fs::create_dir_all(&store).unwrap();
    fs::write(store.join("chroma.sqlite3"), vec![1u8; 1024]).unwrap();

    let docs = root.join("documents");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("alpha.md"), "# Alpha\n\nInstalling the model server.").unwrap();
    fs::write(docs.join("beta.txt"), "Beta notes about embeddings.").unwrap();

    fs::write(root.join(".env"), "MODEL=llama3\n").unwrap();

    let config_content = format!(
        r#"[backup]
dir = "{root}/backups"

[sources]
vector_store = "{root}/chroma_db"
documents = "{root}/documents"
config_files = ["{root}/.env"]

[supervisor]
process_patterns = ["rag-backup-itest-app-5c1e"]
stop_grace_secs = 0

[logging]
level = "warn"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("backup.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn command(config_path: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(rag_backup_binary());
    cmd.arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG");
    cmd
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    run_with_input(config_path, args, "")
}

fn run_with_input(config_path: &Path, args: &[&str], input: &str) -> (String, String, bool) {
    let mut child = command(config_path, args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|e| panic!("Failed to run rag-backup: {}", e));

    {
        let mut stdin = child.stdin.take().unwrap();
        stdin.write_all(input.as_bytes()).unwrap();
    }

    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn backup_names(config_path: &Path) -> Vec<String> {
    let (stdout, stderr, success) = run(config_path, &["list", "--json"]);
    assert!(success, "list failed: {}", stderr);
    let entries: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_help_exits_zero() {
    let output = Command::new(rag_backup_binary())
        .arg("help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("backup"));
    assert!(stdout.contains("restore"));
    assert!(stdout.contains("cleanup"));
}

#[test]
fn test_list_empty() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run(&config_path, &["list"]);
    assert!(success, "list failed: {}", stderr);
    assert!(stdout.contains("No backups found"));
    assert!(backup_names(&config_path).is_empty());
}

#[test]
fn test_backup_with_label() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run(&config_path, &["backup", "before_upgrade"]);
    assert!(success, "backup failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Backup created: before_upgrade_"));
    assert!(stdout.contains("documents: included"));

    let names = backup_names(&config_path);
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("before_upgrade_"));

    let set = tmp.path().join("backups").join(&names[0]);
    let info = fs::read_to_string(set.join("documents.info")).unwrap();
    assert!(info.contains("Files: 2\n  alpha.md\n  beta.txt\n"));
    assert!(set.join("config/.env").is_file());

    let (stdout, _, success) = run(&config_path, &["list"]);
    assert!(success);
    assert!(stdout.contains(&names[0]));
}

#[test]
fn test_backup_rejects_bad_label() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run(&config_path, &["backup", "a/b"]);
    assert!(!success);
    assert!(stderr.contains("Invalid backup label"));
}

#[test]
fn test_restore_requires_confirmation() {
    let (tmp, config_path) = setup_test_env();
    run(&config_path, &["backup", "t1"]);
    let name = backup_names(&config_path).remove(0);

    let docs = tmp.path().join("documents");
    fs::write(docs.join("alpha.md"), "changed").unwrap();

    // No answer on stdin counts as "no".
    let (_, stderr, success) = run(&config_path, &["restore", &name]);
    assert!(!success);
    assert!(stderr.contains("aborted"));
    assert_eq!(fs::read_to_string(docs.join("alpha.md")).unwrap(), "changed");

    let (_, _, success) = run_with_input(&config_path, &["restore", &name], "n\n");
    assert!(!success);

    let (stdout, stderr, success) = run_with_input(&config_path, &["restore", &name], "yes\n");
    assert!(success, "restore failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Restored vector_store, documents, config"));
    assert!(stdout.contains("documents.backup."));
    assert_eq!(
        fs::read_to_string(docs.join("alpha.md")).unwrap(),
        "# Alpha\n\nInstalling the model server."
    );
}

#[test]
fn test_restore_unknown_name_fails() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) =
        run_with_input(&config_path, &["restore", "auto_backup_20000101_000000"], "yes\n");
    assert!(!success);
    assert!(stderr.contains("Backup not found"));
}

#[test]
fn test_info_and_verify() {
    let (tmp, config_path) = setup_test_env();
    run(&config_path, &["backup"]);
    let name = backup_names(&config_path).remove(0);
    assert!(name.starts_with("auto_backup_"));

    let (stdout, _, success) = run(&config_path, &["info", &name]);
    assert!(success);
    assert!(stdout.contains("To restore this backup:"));

    let (stdout, _, success) = run(&config_path, &["verify", &name]);
    assert!(success, "verify failed: {}", stdout);
    assert!(stdout.contains("documents"));

    let archive = tmp
        .path()
        .join("backups")
        .join(&name)
        .join("vector_store.tar.gz");
    fs::write(archive, b"corrupt").unwrap();
    let (stdout, _, success) = run(&config_path, &["verify", &name]);
    assert!(!success);
    assert!(stdout.contains("MISMATCH"));
}

#[test]
fn test_cleanup() {
    let (_tmp, config_path) = setup_test_env();
    run(&config_path, &["backup", "one"]);
    run(&config_path, &["backup", "two"]);
    assert_eq!(backup_names(&config_path).len(), 2);

    let (stdout, _, success) = run(&config_path, &["cleanup", "36500"]);
    assert!(success);
    assert!(stdout.contains("Removed 0 backups"));

    let (stdout, _, success) = run(&config_path, &["cleanup", "0"]);
    assert!(success);
    assert!(stdout.contains("Removed 2 backups"));
    assert!(backup_names(&config_path).is_empty());
}
