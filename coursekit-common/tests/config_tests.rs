//! Tests for root folder resolution and TOML loading

use coursekit_common::config::{ensure_root_folder, env_override, load_toml_config, resolve_root_folder};
use serde::Deserialize;
use serial_test::serial;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
struct SampleConfig {
    port: u16,
    name: Option<String>,
}

#[test]
#[serial]
fn test_cli_argument_wins_over_environment() {
    std::env::set_var("COURSEKIT_TEST_ROOT", "/tmp/from-env");
    let resolved = resolve_root_folder(Some(Path::new("/tmp/from-cli")), "COURSEKIT_TEST_ROOT");
    assert_eq!(resolved, PathBuf::from("/tmp/from-cli"));
    std::env::remove_var("COURSEKIT_TEST_ROOT");
}

#[test]
#[serial]
fn test_environment_used_without_cli_argument() {
    std::env::set_var("COURSEKIT_TEST_ROOT", "/tmp/from-env");
    let resolved = resolve_root_folder(None, "COURSEKIT_TEST_ROOT");
    assert_eq!(resolved, PathBuf::from("/tmp/from-env"));
    std::env::remove_var("COURSEKIT_TEST_ROOT");
}

#[test]
#[serial]
fn test_blank_environment_falls_through() {
    std::env::set_var("COURSEKIT_TEST_ROOT", "   ");
    let resolved = resolve_root_folder(None, "COURSEKIT_TEST_ROOT");
    assert_ne!(resolved, PathBuf::from("   "));
    std::env::remove_var("COURSEKIT_TEST_ROOT");
}

#[test]
fn test_missing_toml_yields_default() {
    let temp_dir = TempDir::new().unwrap();
    let config: SampleConfig = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_toml_parsed_with_partial_fields() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("svc.toml");
    std::fs::write(&path, "port = 8123\n").unwrap();

    let config: SampleConfig = load_toml_config(&path).unwrap();
    assert_eq!(config.port, 8123);
    assert_eq!(config.name, None);
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("svc.toml");
    std::fs::write(&path, "port = [not valid").unwrap();

    let result: coursekit_common::Result<SampleConfig> = load_toml_config(&path);
    assert!(matches!(result, Err(coursekit_common::Error::Config(_))));
}

#[test]
fn test_ensure_root_folder_creates_directory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("nested").join("root");

    let db_path = ensure_root_folder(&root, "coursekit.db").unwrap();
    assert!(root.is_dir());
    assert_eq!(db_path, root.join("coursekit.db"));
}

#[test]
#[serial]
fn test_env_override_parses_and_rejects() {
    std::env::set_var("COURSEKIT_TEST_PORT", "9000");
    assert_eq!(env_override::<u16>("COURSEKIT_TEST_PORT").unwrap(), Some(9000));

    std::env::set_var("COURSEKIT_TEST_PORT", "not-a-port");
    assert!(env_override::<u16>("COURSEKIT_TEST_PORT").is_err());

    std::env::remove_var("COURSEKIT_TEST_PORT");
    assert_eq!(env_override::<u16>("COURSEKIT_TEST_PORT").unwrap(), None);
}
