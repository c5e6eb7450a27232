//! Configuration Integration Tests
//!
//! Config file discovery and layering of operation defaults.

use std::io::Write;
use std::time::Duration;

use callflow::config::{
    find_config_file_from, load_config_file, resolve, FlowDefaults, ENV_MAX_CALL_DURATION,
    ENV_OPERATION_DEADLINE,
};
use tempfile::TempDir;

fn write_config(root: &std::path::Path, body: &str) -> std::path::PathBuf {
    let dir = root.join(".callflow");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.yaml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "{}", body).unwrap();
    path
}

#[test]
fn test_config_found_from_nested_directory() {
    let temp = TempDir::new().unwrap();
    let expected = write_config(temp.path(), "version: \"1\"");
    let nested = temp.path().join("a").join("b");
    std::fs::create_dir_all(&nested).unwrap();

    assert_eq!(find_config_file_from(&nested), Some(expected));
}

#[test]
fn test_config_file_parsing() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        temp.path(),
        r#"
version: "1"
defaults:
  max_call_duration_secs: 300
  operation_deadline_secs: 45
"#,
    );

    let file = load_config_file(&path).unwrap();
    assert_eq!(file.version, "1");

    let defaults = resolve(Some(&file), |_| None).unwrap();
    assert_eq!(defaults.max_call_duration_secs, 300);
    assert_eq!(defaults.dtmf_timeout_secs, 10);
    assert_eq!(defaults.operation_deadline(), Some(Duration::from_secs(45)));
}

#[test]
fn test_env_wins_over_file() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        temp.path(),
        "version: \"1\"\ndefaults:\n  max_call_duration_secs: 300\n",
    );
    let file = load_config_file(&path).unwrap();

    let defaults = resolve(Some(&file), |name| match name {
        ENV_MAX_CALL_DURATION => Some("90".to_string()),
        ENV_OPERATION_DEADLINE => Some(" 12 ".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(defaults.max_call_duration_secs, 90);
    assert_eq!(defaults.operation_deadline_secs, Some(12));
}

#[test]
fn test_malformed_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), "defaults: [not, a, map]");

    let err = load_config_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

#[test]
fn test_zero_in_file_rejected() {
    let temp = TempDir::new().unwrap();
    let path = write_config(temp.path(), "version: \"1\"\ndefaults:\n  dtmf_timeout_secs: 0\n");
    let file = load_config_file(&path).unwrap();

    assert!(resolve(Some(&file), |_| None).is_err());
}

#[test]
fn test_defaults_serialize_for_display() {
    let json = serde_json::to_value(FlowDefaults::default()).unwrap();

    assert_eq!(json["max_call_duration_secs"], 1020);
    assert_eq!(json["dtmf_timeout_secs"], 10);
    assert!(json["operation_deadline_secs"].is_null());
}
