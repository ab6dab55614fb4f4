use std::env;
use std::path::PathBuf;
use std::sync::Mutex;

use bridge_app::config::BridgeConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn toml_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("BRIDGE_CONFIG", fixture_path("config-valid.toml"));

    let config = BridgeConfig::load().expect("load config");
    config.validate().expect("validate config");

    assert_eq!(config.mqtt.host, "broker.local");
    assert_eq!(config.mqtt.username.as_deref(), Some("bridge"));
    assert_eq!(config.serial.device, "/dev/ttyUSB1");
    assert_eq!(config.features.pv_trackers, 2);
    assert_eq!(config.root_topic, "inverter");

    env::remove_var("BRIDGE_CONFIG");
}

#[test]
fn json_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("BRIDGE_CONFIG", fixture_path("config-valid.json"));

    let config = BridgeConfig::load().expect("load config");
    config.validate().expect("validate config");

    assert_eq!(config.mqtt.host, "broker.local");
    assert_eq!(config.features.split_phase, 1);
    assert!(config.features.battery);

    env::remove_var("BRIDGE_CONFIG");
}

#[test]
fn invalid_split_phase_is_rejected() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("BRIDGE_CONFIG", fixture_path("config-invalid.toml"));

    let config = BridgeConfig::load().expect("load config");
    let err = config.validate().expect_err("split_phase 5 must fail");
    assert!(err.to_string().contains("split_phase"));

    env::remove_var("BRIDGE_CONFIG");
}

#[test]
fn env_overrides_take_precedence_over_file() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("BRIDGE_CONFIG", fixture_path("config-valid.toml"));
    env::set_var("MQTT_HOST", "other-broker.local");
    env::set_var("NB_MPP_TRACKERS", "1");

    let config = BridgeConfig::load().expect("load config");
    config.validate().expect("validate config");

    assert_eq!(config.mqtt.host, "other-broker.local");
    assert_eq!(config.features.pv_trackers, 1);

    env::remove_var("BRIDGE_CONFIG");
    env::remove_var("MQTT_HOST");
    env::remove_var("NB_MPP_TRACKERS");
}

#[test]
fn defaults_validate_without_any_config() {
    let _guard = ENV_LOCK.lock().expect("env lock");

    let config = BridgeConfig::load().expect("load config");
    config.validate().expect("defaults validate");

    assert_eq!(config.root_topic, "inverter");
    assert_eq!(config.discovery_prefix, "homeassistant");
    assert_eq!(config.mqtt.port, 1883);
}

fn fixture_path(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path.to_string_lossy().to_string()
}
