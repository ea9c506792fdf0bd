use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("spas.json"),
        r#"[
  {"id": "s1", "name": "Bow River Spa", "city": "Calgary", "category": "spa", "rating": 4.4, "tags": ["massage"]},
  {"id": "s2", "name": "   ", "city": "Calgary", "category": "spa"}
]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/agent-layer.sqlite"

[server]
bind = "127.0.0.1:7399"

[connectors.json.spas]
vertical = "wellness"
path = "{root}/spas.json"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("agent-layer.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_agent-layer"))
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("EDMONTONPLAYGROUND_DATA_URL")
        .env_remove("ALBERTACLINICS_DATA_URL")
        .env_remove("ABCONTROL_DATA_URL")
        .env_remove("SLACK_WEBHOOK_URL")
        .output()
        .expect("failed to run agent-layer");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, ok) = run(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));

    let (_, stderr, ok) = run(&config, &["init"]);
    assert!(ok, "second init failed: {}", stderr);
}

#[test]
fn test_sources_lists_builtin_and_json() {
    let (_tmp, config) = setup_test_env();
    let (stdout, _, ok) = run(&config, &["sources"]);
    assert!(ok);
    assert!(stdout.contains("albertaclinics"));
    assert!(stdout.contains("edmontonplayground"));
    assert!(stdout.contains("abcontrol"));
    assert!(stdout.contains("spas"));
    assert!(stdout.contains("json"));
}

#[test]
fn test_sync_search_get() {
    let (_tmp, config) = setup_test_env();
    run(&config, &["init"]);

    let (stdout, stderr, ok) = run(&config, &["sync", "all"]);
    assert!(ok, "sync failed: {}", stderr);
    assert!(stdout.contains("sync albertaclinics"));
    assert!(stdout.contains("  created: 6"));
    // the blank-named record is reported, not fatal
    assert!(stdout.contains("- s2: "));
    assert!(stdout.ends_with("ok\n"));

    let (stdout, _, ok) = run(&config, &["sync", "spas"]);
    assert!(ok);
    assert!(stdout.contains("  created: 0"));
    assert!(stdout.contains("  updated: 1"));

    let (stdout, _, ok) = run(&config, &["search", "walk-in clinics in edmonton"]);
    assert!(ok);
    assert!(stdout.contains("routed: vertical=clinic city=edmonton"));
    assert!(stdout.contains("Whyte Avenue Medical Clinic"));
    assert!(stdout.contains("1 of 1 shown"));

    let id = stdout
        .lines()
        .find_map(|l| l.trim().strip_prefix("id: "))
        .unwrap()
        .to_string();
    let (stdout, _, ok) = run(&config, &["get", &id]);
    assert!(ok);
    assert!(stdout.contains("name:        Whyte Avenue Medical Clinic"));
    assert!(stdout.contains("--- Actions ---"));

    let (_, stderr, ok) = run(&config, &["get", "place_missing_000000000000"]);
    assert!(!ok);
    assert!(stderr.contains("place not found"));
}

#[test]
fn test_sync_unknown_site_fails() {
    let (_tmp, config) = setup_test_env();
    run(&config, &["init"]);
    let (_, stderr, ok) = run(&config, &["sync", "nowhere"]);
    assert!(!ok);
    assert!(stderr.contains("unknown connector 'nowhere'"));
}

#[test]
fn test_discover_needs_no_config() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("missing.toml");
    let (stdout, _, ok) = run(&missing, &["discover", "walk-in clinics in edmonton"]);
    assert!(ok);
    assert!(stdout.contains("vertical:   clinic"));
    assert!(stdout.contains("confidence: 1.00"));
}

#[test]
fn test_leads_list_empty_and_bad_status() {
    let (_tmp, config) = setup_test_env();
    run(&config, &["init"]);
    let (stdout, _, ok) = run(&config, &["leads", "list"]);
    assert!(ok);
    assert!(stdout.contains("No leads."));

    let (_, _, ok) = run(&config, &["leads", "status", "lead_000000000000", "qualified"]);
    assert!(!ok);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, ok) = run(&tmp.path().join("nope.toml"), &["sources"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
