use shadowcode::util::config::{load_config, save_config, ConfigError};
use shadowcode::ShadowConfig;
use tempfile::tempdir;

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("shadow.toml");
    let config = ShadowConfig {
        warmup_calls: 3,
        polymorphic_size: 8,
        miss_threshold: 10,
        ..ShadowConfig::default()
    };
    save_config(&config, &path).unwrap();
    assert!(path.exists());

    let loaded = load_config(Some(&path)).unwrap();
    assert_eq!(loaded.warmup_calls, 3);
    assert_eq!(loaded.polymorphic_size, 8);
    assert_eq!(loaded.miss_threshold, 10);
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let loaded = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(loaded.polymorphic_size, ShadowConfig::default().polymorphic_size);
    assert_eq!(loaded.max_cache_slots, 256);
}

#[test]
fn test_invalid_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "max_cache_slots = 1000\n").unwrap();
    let err = load_config(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "max_cache_slots"));
}
