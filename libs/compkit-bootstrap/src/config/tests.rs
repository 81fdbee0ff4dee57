use super::*;
use crate::AppConfigProvider;
use compkit::ConfigProvider;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_default_config_structure() {
    let config = AppConfig::default();

    let logging = config.logging.as_ref().unwrap();
    let default_section = &logging["default"];
    assert_eq!(default_section.console_level, "info");
    assert_eq!(default_section.file, "logs/compkit.log");

    assert_eq!(config.lifecycle.health_timeout_ms, 5_000);
    assert_eq!(config.lifecycle.stop_timeout_ms, 0);
    assert!(config.components.is_empty());
    assert!(config.components_dir.is_none());
}

#[test]
fn test_yaml_serialization() {
    let yaml = AppConfig::default().to_yaml().unwrap();
    assert!(yaml.contains("logging:"));
    assert!(yaml.contains("lifecycle:"));
    assert!(yaml.contains("components:"));
}

#[test]
fn test_layered_loading_yaml_only() {
    let tmp = tempdir().unwrap();
    let cfg_path = tmp.path().join("cfg.yaml");
    let yaml = r#"
lifecycle:
  health_timeout_ms: 250

components:
  database:
    dsn: "sqlite::memory:"
    pool_size: 4
  cache: ~
"#;
    fs::write(&cfg_path, yaml).unwrap();

    let config = AppConfig::load_layered(&cfg_path).unwrap();

    // logging stays unset unless the file provides it
    assert!(config.logging.is_none());
    assert_eq!(config.lifecycle.health_timeout_ms, 250);
    assert_eq!(config.lifecycle.stop_timeout_ms, 0);
    assert_eq!(config.components.len(), 2);
    assert_eq!(config.components["database"]["pool_size"], 4);
    assert!(config.components["cache"].is_null());
}

#[test]
fn test_unknown_top_level_field_is_rejected() {
    let tmp = tempdir().unwrap();
    let cfg_path = tmp.path().join("cfg.yaml");
    fs::write(&cfg_path, "servre:\n  port: 1\n").unwrap();

    assert!(AppConfig::load_layered(&cfg_path).is_err());
}

#[test]
fn test_components_dir_overrides_inline_entries() {
    let tmp = tempdir().unwrap();
    let cfg_path = tmp.path().join("cfg.yaml");
    fs::create_dir(tmp.path().join("components")).unwrap();
    fs::write(
        &cfg_path,
        "components_dir: components\ncomponents:\n  database:\n    dsn: inline\n  cache:\n    ttl: 5\n",
    )
    .unwrap();
    fs::write(tmp.path().join("components/database.yaml"), "dsn: from-file\n").unwrap();
    fs::write(tmp.path().join("components/notes.txt"), "ignored").unwrap();

    let config = AppConfig::load_layered(&cfg_path).unwrap();
    assert_eq!(config.components["database"]["dsn"], "from-file");
    assert_eq!(config.components["cache"]["ttl"], 5);
    assert!(!config.components.contains_key("notes"));
}

#[test]
fn test_load_or_default_without_path() {
    let config = AppConfig::load_or_default::<&str>(None).unwrap();
    assert!(config.logging.is_some());
}

#[test]
fn test_cli_overrides() {
    let mut config = AppConfig::default();
    config.apply_cli_overrides(&CliArgs { verbose: 2 });
    assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, "trace");

    let mut config = AppConfig {
        logging: None,
        ..AppConfig::default()
    };
    config.apply_cli_overrides(&CliArgs { verbose: 1 });
    assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, "debug");

    let mut config = AppConfig::default();
    config.apply_cli_overrides(&CliArgs::default());
    assert_eq!(config.logging.as_ref().unwrap()["default"].console_level, "info");
}

#[test]
fn test_lifecycle_options_treat_zero_as_unbounded() {
    let lifecycle = LifecycleConfig {
        health_timeout_ms: 0,
        stop_timeout_ms: 1_500,
    };
    let options = lifecycle.app_options();
    assert!(options.health_timeout.is_none());
    assert_eq!(options.stop_timeout, Some(Duration::from_millis(1_500)));
}

#[test]
fn test_provider_reads_components_bag() {
    let mut config = AppConfig::default();
    config
        .components
        .insert("database".to_string(), serde_json::json!({"dsn": "x"}));
    let provider = AppConfigProvider::new(config);

    assert_eq!(
        provider.component_config("database"),
        Some(serde_json::json!({"dsn": "x"}))
    );
    assert!(provider.component_config("cache").is_none());
}
