use shadowcode::demo::{expected_value, run_demo};
use shadowcode::ShadowConfig;

#[test]
fn test_demo_matches_expected_values() {
    let iterations = 40;
    let report = run_demo(ShadowConfig::default(), iterations).unwrap();
    assert_eq!(report.iterations, iterations);
    assert_eq!(report.values.len(), iterations);
    for (i, value) in report.values.iter().enumerate() {
        assert_eq!(*value, expected_value(i, iterations), "call {}", i);
    }
}

#[test]
fn test_demo_disabled_agrees_with_cached() {
    let cached = run_demo(ShadowConfig::default(), 30).unwrap();
    let plain = run_demo(
        ShadowConfig {
            enabled: false,
            ..ShadowConfig::default()
        },
        30,
    )
    .unwrap();
    assert_eq!(cached.values, plain.values);
}

#[test]
fn test_demo_without_polymorphism() {
    let config = ShadowConfig {
        polymorphic: false,
        ..ShadowConfig::default()
    };
    let report = run_demo(config, 24).unwrap();
    for (i, value) in report.values.iter().enumerate() {
        assert_eq!(*value, expected_value(i, 24));
    }
}
