use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn oai_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("oai");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("catalog.json"),
        r#"{
            "institution": "demo",
            "collections": [{"handle": "2142/1", "title": "Research"}],
            "items": [
                {
                    "handle": "2142/5",
                    "updated_at": "2019-05-06T07:08:09Z",
                    "collections": ["2142/1"],
                    "item_type": "Article",
                    "elements": [
                        {"name": "dc:title", "value": "On Harvesting"},
                        {"name": "dcterms:issued", "value": "2019"}
                    ]
                },
                {
                    "handle": "2142/6",
                    "updated_at": "2019-05-07T00:00:00Z",
                    "withdrawn": true
                }
            ]
        }"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/oai.sqlite"

[server]
bind = "127.0.0.1:7410"

[institutions.demo]
fqdn = "demo.example.edu"
repository_name = "Demo Repository"
base_url = "https://demo.example.edu/oai-pmh"
admin_email = "admin@example.edu"
"#,
        root.display()
    );

    let config_path = config_dir.join("oai.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_oai(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = oai_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run oai binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn catalog_path(config_path: &Path) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("catalog.json")
        .display()
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_oai(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_oai(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_oai(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_import_and_request() {
    let (_tmp, config_path) = setup_test_env();
    let catalog = catalog_path(&config_path);

    let (stdout, stderr, success) = run_oai(&config_path, &["import", &catalog]);
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Imported 1 collections and 2 items (1 withdrawn)"));

    let (stdout, stderr, success) = run_oai(
        &config_path,
        &[
            "request",
            "verb=GetRecord&identifier=oai:demo.example.edu:2142/5&metadataPrefix=oai_dc",
        ],
    );
    assert!(success, "request failed: stderr={}", stderr);
    assert!(stdout.contains("<dc:title>On Harvesting</dc:title>"));
    assert!(stdout.contains("<dc:date>2019</dc:date>"));
    assert!(stdout.contains("<dc:identifier>http://hdl.handle.net/2142/5</dc:identifier>"));
}

#[test]
fn test_import_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let catalog = catalog_path(&config_path);

    run_oai(&config_path, &["import", &catalog]);
    run_oai(&config_path, &["import", &catalog]);

    let (stdout, _, success) = run_oai(
        &config_path,
        &["request", "verb=ListIdentifiers&metadataPrefix=oai_dc"],
    );
    assert!(success);
    assert_eq!(stdout.matches("<header").count(), 2);
    assert!(stdout.contains("<header status=\"deleted\">"));
}

#[test]
fn test_request_reports_protocol_errors() {
    let (_tmp, config_path) = setup_test_env();
    run_oai(&config_path, &["init"]);

    let (stdout, _, success) = run_oai(&config_path, &["request", "verb=GetRecord"]);
    assert!(success);
    assert!(stdout.contains("Missing identifier argument."));
    assert!(stdout.contains("Missing metadataPrefix argument."));

    let (stdout, _, _) = run_oai(
        &config_path,
        &["request", "verb=ListRecords&metadataPrefix=oai_dc"],
    );
    assert!(stdout.contains("noRecordsMatch"));
}

#[test]
fn test_request_unknown_host_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_oai(&config_path, &["init"]);

    let (_, stderr, success) = run_oai(
        &config_path,
        &["request", "verb=Identify", "--host", "nowhere.example.org"],
    );
    assert!(!success);
    assert!(stderr.contains("nowhere.example.org"));
}

#[test]
fn test_import_unknown_institution_fails() {
    let (tmp, config_path) = setup_test_env();
    let doc = tmp.path().join("other.json");
    fs::write(&doc, r#"{"institution": "elsewhere", "items": []}"#).unwrap();

    let (_, stderr, success) = run_oai(&config_path, &["import", doc.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Unknown institution 'elsewhere'"));
}

#[test]
fn test_token_decoding_without_config() {
    let (_, stderr, success) = run_oai(Path::new("/nonexistent.toml"), &["token", "garbage"]);
    assert!(!success);
    assert!(stderr.contains("badResumptionToken"));
}

#[test]
fn test_missing_config_fails() {
    let (stdout, stderr, success) = run_oai(Path::new("/nonexistent/oai.toml"), &["init"]);
    assert!(!success, "expected failure: stdout={}", stdout);
    assert!(stderr.contains("Failed to read config file"));
}
