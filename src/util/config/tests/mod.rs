//! 配置单元测试

use std::collections::HashMap;

use super::*;

#[test]
fn test_defaults() {
    let config = ShadowConfig::default();
    assert!(config.enabled);
    assert_eq!(config.warmup_calls, 0);
    assert!(config.polymorphic);
    assert_eq!(config.polymorphic_size, 4);
    assert_eq!(config.max_cache_slots, 256);
    assert_eq!(config.miss_threshold, 1000);
}

#[test]
fn test_empty_toml_is_default() {
    assert_eq!(ShadowConfig::from_toml_str("").unwrap(), ShadowConfig::default());
}

#[test]
fn test_partial_toml() {
    let config = ShadowConfig::from_toml_str("polymorphic = false\nmiss_threshold = 3\n").unwrap();
    assert!(!config.polymorphic);
    assert_eq!(config.miss_threshold, 3);
    assert!(config.enabled);
}

#[test]
fn test_invalid_values_rejected() {
    assert!(matches!(
        ShadowConfig::from_toml_str("polymorphic_size = 0"),
        Err(ConfigError::InvalidValue { .. })
    ));
    assert!(matches!(
        ShadowConfig::from_toml_str("max_cache_slots = 1024"),
        Err(ConfigError::InvalidValue { .. })
    ));
    assert!(matches!(
        ShadowConfig::from_toml_str("enabled = \"maybe\""),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn test_overrides() {
    let env: HashMap<&str, &str> = [(ENV_ENABLED, "0"), (ENV_POLYMORPHIC, "off")].into_iter().collect();
    let mut config = ShadowConfig::default();
    config
        .apply_overrides_from(|key| env.get(key).map(|v| v.to_string()))
        .unwrap();
    assert!(!config.enabled);
    assert!(!config.polymorphic);
}

#[test]
fn test_override_rejects_garbage() {
    let mut config = ShadowConfig::default();
    let err = config
        .apply_overrides_from(|key| (key == ENV_ENABLED).then(|| "perhaps".to_string()))
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid value for 'SHADOWCODE_ENABLED': perhaps");
}

#[test]
fn test_save_and_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("shadowcode.toml");
    let config = ShadowConfig {
        warmup_calls: 10,
        polymorphic_size: 8,
        ..ShadowConfig::default()
    };
    save_config(&config, &path).unwrap();
    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(ShadowConfig::from_toml_str(&content).unwrap(), config);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    let config = load_config(Some(&path)).unwrap();
    assert!(!path.exists());
    assert_eq!(config.polymorphic_size, 4);
    assert_eq!(config.miss_threshold, 1000);
}
