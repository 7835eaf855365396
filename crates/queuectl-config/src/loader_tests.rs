use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_empty_config() {
    let settings = ConfigLoader::load_str("").unwrap();
    assert_eq!(settings.worker_count, 1);
}

#[test]
fn test_load_basic_config() {
    let content = r#"
        workerCount = 3
        pollIntervalMs = 200
        maxRetries = 5
    "#;
    let settings = ConfigLoader::load_str(content).unwrap();
    assert_eq!(settings.worker_count, 3);
    assert_eq!(settings.poll_interval_ms, 200);
    assert_eq!(settings.max_retries, 5);
}

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "leaseTimeoutSeconds = 45").unwrap();

    let settings = ConfigLoader::load(file.path()).unwrap();
    assert_eq!(settings.lease_timeout_seconds, 45);
}

#[test]
fn test_load_nonexistent_file() {
    let result = ConfigLoader::load(Path::new("/nonexistent/path/queuectl.toml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_load_invalid_toml() {
    let result = ConfigLoader::load_str("workerCount = [unclosed");
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_expand_env_vars() {
    // SAFETY: This test runs in isolation and sets a unique test-only env var
    unsafe {
        std::env::set_var("QUEUECTL_TEST_STORE_DIR", "/srv/queue");
    }
    let expanded =
        ConfigLoader::expand_env_vars("storePath = \"${QUEUECTL_TEST_STORE_DIR}/db.json\"").unwrap();
    assert!(expanded.contains("/srv/queue/db.json"));
    unsafe {
        std::env::remove_var("QUEUECTL_TEST_STORE_DIR");
    }
}

#[test]
fn test_expand_env_vars_not_set() {
    let result = ConfigLoader::expand_env_vars("storePath = \"${NONEXISTENT_QUEUECTL_VAR_12345}\"");
    assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
}

#[test]
fn test_expand_path_with_tilde() {
    let expanded = ConfigLoader::expand_path("~/queue/db.json");
    assert!(!expanded.starts_with('~'));
    assert!(expanded.ends_with("/queue/db.json"));
}

#[test]
fn test_env_overrides_apply() {
    let env = EnvOverrides::from_pairs([
        ("WORKER_COUNT", "6"),
        ("JOB_TIMEOUT", "5000"),
        ("DB_PATH", "/tmp/queue.json"),
    ]);
    let mut settings = QueueSettings::default();
    env.apply(&mut settings).unwrap();

    assert_eq!(settings.worker_count, 6);
    assert_eq!(settings.job_timeout_ms, 5000);
    assert_eq!(settings.store_path, PathBuf::from("/tmp/queue.json"));
}

#[test]
fn test_env_overrides_later_alias_wins() {
    let env = EnvOverrides::from_pairs([
        ("DB_PATH", "/tmp/a.json"),
        ("QUEUECTL_DB_FILE", "/tmp/b.json"),
    ]);
    let mut settings = QueueSettings::default();
    env.apply(&mut settings).unwrap();
    assert_eq!(settings.store_path, PathBuf::from("/tmp/b.json"));
}

#[test]
fn test_env_overrides_reject_garbage() {
    let env = EnvOverrides::from_pairs([("POLL_INTERVAL", "soon")]);
    let mut settings = QueueSettings::default();
    let result = env.apply(&mut settings);
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
fn test_resolve_missing_file_uses_defaults() {
    let settings = ConfigLoader::resolve(
        Some(Path::new("/nonexistent/queuectl.toml")),
        &EnvOverrides::default(),
    )
    .unwrap();
    assert_eq!(settings.poll_interval_ms, 1500);
}

#[test]
fn test_resolve_env_beats_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "workerCount = 2").unwrap();
    writeln!(file, "maxRetries = 9").unwrap();

    let env = EnvOverrides::from_pairs([("WORKER_COUNT", "8")]);
    let settings = ConfigLoader::resolve(Some(file.path()), &env).unwrap();
    assert_eq!(settings.worker_count, 8);
    assert_eq!(settings.max_retries, 9);
}
