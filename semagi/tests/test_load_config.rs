use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::TempDir;

use semagi::load_config::{
    load_config, load_settings, settings_path, API_KEY_ENV, BASE_URL_ENV, SETTINGS_ENV,
};
use semagi_core::error::ConfigError;
use semagi_core::resolve::resolve;
use semagi_core::settings::Overrides;

const SETTINGS_JSON: &str = r#"{
  "api_key": "file-key",
  "base_url": "http://file.example",
  "task": {"function": "group-only", "file": "keywords.json", "task_name": "shoes"},
  "defaults": {"grouper": "jaccard", "min_similarity": 0.65, "range": 20},
  "timeout": {"request_timeout": 15, "max_wait_time": 600},
  "display": {"show_debug": false, "show_progress": true},
  "polling": {"respect_estimate_time": true}
}"#;

const SETTINGS_YAML: &str = r#"
api_key: file-key
base_url: http://file.example
task:
  function: group-only
  file: keywords.json
  task_name: shoes
defaults:
  grouper: jaccard
  min_similarity: 0.65
  range: 20
timeout:
  request_timeout: 15
  max_wait_time: 600
display:
  show_debug: false
  show_progress: true
polling:
  respect_estimate_time: true
"#;

fn clear_env() {
    env::remove_var(API_KEY_ENV);
    env::remove_var(BASE_URL_ENV);
    env::remove_var(SETTINGS_ENV);
}

#[test]
#[serial]
fn yaml_and_json_documents_load_identically() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let json_path = dir.path().join("settings.json");
    let yaml_path = dir.path().join("settings.yml");
    write(&json_path, SETTINGS_JSON).unwrap();
    write(&yaml_path, SETTINGS_YAML).unwrap();

    let from_json = load_config(&json_path).expect("json settings");
    let from_yaml = load_config(&yaml_path).expect("yaml settings");
    assert_eq!(from_json, from_yaml);
    assert_eq!(from_json.defaults.range, Some(20));
    assert_eq!(from_json.timeout.max_wait_time, Some(600));
    assert_eq!(from_json.polling.respect_estimate_time, Some(true));
}

#[test]
#[serial]
fn environment_overlays_document_and_cli_overlays_environment() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    write(&path, SETTINGS_JSON).unwrap();
    let input = dir.path().join("keywords.json");
    write(&input, r#"{"keywords": ["running shoes"]}"#).unwrap();

    env::set_var(API_KEY_ENV, "env-key");
    env::set_var(BASE_URL_ENV, "http://env.example/");
    let settings = load_config(&path).unwrap();
    clear_env();

    assert_eq!(settings.api_key.as_deref(), Some("env-key"));
    assert_eq!(settings.base_url.as_deref(), Some("http://env.example/"));

    let overrides = Overrides {
        base_url: Some("http://cli.example".into()),
        file: Some(input),
        ..Default::default()
    };
    let resolved = resolve(&settings, &overrides).unwrap();
    assert_eq!(resolved.credentials.api_key, "env-key");
    assert_eq!(resolved.credentials.base_url, "http://cli.example");
    assert_eq!(resolved.spec.min_similarity, 0.65);
}

#[test]
#[serial]
fn settings_path_falls_back_to_environment_then_default() {
    clear_env();
    assert_eq!(settings_path(None), PathBuf::from("settings.json"));

    env::set_var(SETTINGS_ENV, "/etc/semagi/settings.yaml");
    assert_eq!(
        settings_path(None),
        PathBuf::from("/etc/semagi/settings.yaml")
    );
    assert_eq!(
        settings_path(Some(PathBuf::from("local.json"))),
        PathBuf::from("local.json")
    );
    clear_env();
}

#[test]
#[serial]
fn missing_document_is_unreadable() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let err = load_settings(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, ConfigError::SettingsUnreadable { .. }), "{err:?}");
}

#[test]
#[serial]
fn malformed_document_is_invalid() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.json");
    write(&path, "{ not json").unwrap();
    let err = load_settings(&path).unwrap_err();
    assert!(matches!(err, ConfigError::SettingsInvalid { .. }), "{err:?}");

    let typed = dir.path().join("typed.yaml");
    write(&typed, "timeout:\n  request_timeout: soon\n").unwrap();
    assert!(matches!(
        load_settings(&typed),
        Err(ConfigError::SettingsInvalid { .. })
    ));
}
