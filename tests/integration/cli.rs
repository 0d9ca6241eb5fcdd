use std::process::Command;

use shadowcode::ShadowConfig;

fn shadowcode() -> Command {
    Command::new(env!("CARGO_BIN_EXE_shadowcode"))
}

#[test]
fn test_demo_prints_statistics_json() {
    let output = shadowcode()
        .args(["demo", "-n", "20", "--quiet"])
        .output()
        .expect("Failed to spawn shadowcode");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stats: serde_json::Value = serde_json::from_str(&stdout).expect("stdout is not JSON");
    assert!(stats.get("opcodes").is_some());
    assert!(stats.get("cache_count").is_some());
}

#[test]
fn test_demo_lists_values() {
    let output = shadowcode()
        .args(["demo", "-n", "4", "--disable"])
        .output()
        .expect("Failed to spawn shadowcode");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().next().unwrap().trim().starts_with('0'));
}

#[test]
fn test_config_prints_toml() {
    let output = shadowcode()
        .arg("config")
        .output()
        .expect("Failed to spawn shadowcode");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    let config = ShadowConfig::from_toml_str(&text).unwrap();
    assert_eq!(config.max_cache_slots, ShadowConfig::default().max_cache_slots);
}

#[test]
fn test_version() {
    let output = shadowcode().arg("version").output().expect("Failed to spawn shadowcode");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("shadowcode "));
}
