use std::{env, fs};

use graphsync_http::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("config.toml");

    let toml_content = r#"
[client]
base_url = "https://graph.example.com/v1.0"
timeout_ms = 1000
bearer_token = "abc"

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses, unset keys fall back to defaults
    let cfg = load_config(Some(&path)).expect("should parse config");
    assert_eq!(cfg.client.base_url, "https://graph.example.com/v1.0");
    assert_eq!(cfg.client.timeout_ms, 1000);
    assert_eq!(cfg.client.bearer_token.as_deref(), Some("abc"));
    assert!(cfg.client.user_agent.starts_with("graphsync/"));
    assert_eq!(cfg.logging.level, "debug");

    // 2) Env override should win over file
    unsafe {
        env::set_var("GRAPHSYNC__CLIENT__TIMEOUT_MS", "9000");
    }
    let cfg_env = load_config(Some(&path)).expect("should parse config with env overrides");
    assert_eq!(cfg_env.client.timeout_ms, 9000);
    unsafe {
        env::remove_var("GRAPHSYNC__CLIENT__TIMEOUT_MS");
    }

    // 3) Invalid values are rejected
    let bad_path = dir.path().join("bad.toml");
    fs::write(&bad_path, "[client]\ntimeout_ms = 0\n").expect("write toml");
    let err = load_config(Some(&bad_path)).expect_err("zero timeout must fail");
    assert!(err.contains("timeout_ms"));

    // 4) A missing file falls back to defaults
    let cfg_missing = load_config(Some(&dir.path().join("absent.toml"))).expect("defaults");
    assert_eq!(cfg_missing.client.base_url, "https://graph.microsoft.com/beta");
}
