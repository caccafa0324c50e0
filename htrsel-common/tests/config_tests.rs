//! Configuration and root folder resolution
//!
//! Tests that manipulate HTRSEL_* environment variables are marked #[serial]
//! so they never run in parallel.

use htrsel_common::config::{
    load_toml_config, CompiledDefaults, ConfigSource, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

fn clear_env() {
    env::remove_var("HTRSEL_ROOT_FOLDER");
    env::remove_var("HTRSEL_ROOT");
}

#[test]
#[serial]
fn test_resolver_with_no_overrides_uses_default() {
    clear_env();
    let root = RootFolderResolver::new("test").resolve();
    assert_eq!(root, CompiledDefaults::for_current_platform().root_folder);
}

#[test]
#[serial]
fn test_resolver_priority_order() {
    clear_env();
    let toml = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/htrsel-toml")),
        ..Default::default()
    };

    let from_toml = RootFolderResolver::new("test").with_toml(&toml).resolve();
    assert_eq!(from_toml, PathBuf::from("/tmp/htrsel-toml"));

    env::set_var("HTRSEL_ROOT", "/tmp/htrsel-env-short");
    let from_short_env = RootFolderResolver::new("test").with_toml(&toml).resolve();
    assert_eq!(from_short_env, PathBuf::from("/tmp/htrsel-env-short"));

    env::set_var("HTRSEL_ROOT_FOLDER", "/tmp/htrsel-env");
    let from_env = RootFolderResolver::new("test").with_toml(&toml).resolve();
    assert_eq!(from_env, PathBuf::from("/tmp/htrsel-env"));

    let from_cli = RootFolderResolver::new("test")
        .with_cli_arg(Some(PathBuf::from("/tmp/htrsel-cli")))
        .with_toml(&toml)
        .resolve();
    assert_eq!(from_cli, PathBuf::from("/tmp/htrsel-cli"));

    clear_env();
}

#[test]
fn test_initializer_creates_layout() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    let init = RootFolderInitializer::new(root.clone());

    assert!(!root.exists());
    init.ensure_directory_exists().unwrap();
    init.ensure_directory_exists().unwrap();

    assert!(init.media_path().is_dir());
    assert_eq!(init.database_path(), root.join("htrsel.db"));
}

#[test]
fn test_toml_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[segmentation]
padding = 4

[sync]
target = "archive:/srv/media"
"#,
    )
    .unwrap();

    let loaded = load_toml_config(&path).unwrap();
    assert_eq!(loaded.segmentation.padding, 4);
    assert_eq!(loaded.sync.target.as_deref(), Some("archive:/srv/media"));
    assert_eq!(loaded.segmentation.models, TomlConfig::default().segmentation.models);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "root_folder = [").unwrap();
    assert!(load_toml_config(&path).is_err());
}

#[test]
#[serial]
fn test_load_or_default_survives_bad_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "not = [valid").unwrap();

    env::set_var("HTRSEL_CONFIG", &path);
    let (config, source) = TomlConfig::load_or_default();
    env::remove_var("HTRSEL_CONFIG");

    assert_eq!(config, TomlConfig::default());
    assert!(matches!(source, ConfigSource::Rejected(ref p, _) if *p == path));
}

#[test]
#[serial]
fn test_load_or_default_reads_named_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

    env::set_var("HTRSEL_CONFIG", &path);
    let (config, source) = TomlConfig::load_or_default();
    env::remove_var("HTRSEL_CONFIG");

    assert_eq!(config.logging.level, "debug");
    assert!(matches!(source, ConfigSource::File(ref p) if *p == path));
}
