use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use modbus_rtu::SerialConfig;
use mqtt_link::MqttConfig;
use scheduler::SchedulerConfig;

const DEFAULT_ROOT_TOPIC: &str = "inverter";
const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";
const DEFAULT_MANUFACTURER: &str = "PowMr";
const DEFAULT_FAST_INTERVAL_MS: u64 = 1_000;
const DEFAULT_SLOW_INTERVAL_MS: u64 = 5_000;

/// Which optional hardware the inverter installation actually has.
/// Points for absent hardware are declared disabled and never touch
/// the bus.
#[derive(Clone, Debug)]
pub struct Features {
    pub system: bool,
    pub battery: bool,
    /// Number of AC phases wired up (1-3).
    pub split_phase: u8,
    /// Number of MPP trackers (0-2).
    pub pv_trackers: u8,
    pub ambient_temperature: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            system: false,
            battery: false,
            split_phase: 2,
            pv_trackers: 0,
            ambient_temperature: false,
        }
    }
}

/// Per-category refresh intervals for the point table.
#[derive(Clone, Debug)]
pub struct Intervals {
    pub pv: Duration,
    pub battery: Duration,
    pub load: Duration,
    pub grid: Duration,
    pub inverter: Duration,
    pub statistics: Duration,
    pub temperature: Duration,
    pub general: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        let fast = Duration::from_millis(DEFAULT_FAST_INTERVAL_MS);
        let slow = Duration::from_millis(DEFAULT_SLOW_INTERVAL_MS);
        Self {
            pv: fast,
            battery: fast,
            load: fast,
            grid: fast,
            inverter: fast,
            statistics: fast,
            temperature: slow,
            general: slow,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    pub serial: SerialConfig,
    pub scheduler: SchedulerConfig,
    pub features: Features,
    pub intervals: Intervals,
    pub root_topic: String,
    pub discovery_prefix: String,
    pub device_manufacturer: String,
}

impl BridgeConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self {
            root_topic: DEFAULT_ROOT_TOPIC.to_string(),
            discovery_prefix: DEFAULT_DISCOVERY_PREFIX.to_string(),
            device_manufacturer: DEFAULT_MANUFACTURER.to_string(),
            ..Self::default()
        };

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config);
        }

        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.trim().is_empty() {
            anyhow::bail!("mqtt.host must be non-empty");
        }
        if self.mqtt.port == 0 {
            anyhow::bail!("mqtt.port must be between 1 and 65535");
        }
        if self.mqtt.capacity == 0 {
            anyhow::bail!("mqtt.capacity must be >= 1");
        }
        if self.serial.device.trim().is_empty() {
            anyhow::bail!("serial.device must be non-empty");
        }
        if self.serial.baud_rate == 0 {
            anyhow::bail!("serial.baud_rate must be >= 1");
        }
        if self.serial.timeout_ms == 0 {
            anyhow::bail!("serial.timeout_ms must be >= 1");
        }
        if self.serial.retry_backoff_ms == 0 {
            anyhow::bail!("serial.retry_backoff_ms must be >= 1");
        }
        if self.serial.retry_max_backoff_ms == 0 {
            anyhow::bail!("serial.retry_max_backoff_ms must be >= 1");
        }
        if self.scheduler.tick_interval.as_millis() == 0 {
            anyhow::bail!("scheduler.loop_sleep_ms must be >= 1");
        }
        if self.root_topic.trim().is_empty() {
            anyhow::bail!("root_topic must be non-empty");
        }
        if self.root_topic.contains('/') {
            anyhow::bail!("root_topic must not contain '/'");
        }
        if self.discovery_prefix.trim().is_empty() {
            anyhow::bail!("discovery_prefix must be non-empty");
        }
        if !(1..=3).contains(&self.features.split_phase) {
            anyhow::bail!("features.split_phase must be between 1 and 3");
        }
        if self.features.pv_trackers > 2 {
            anyhow::bail!("features.pv_trackers must be between 0 and 2");
        }
        for (name, interval) in [
            ("pv", self.intervals.pv),
            ("battery", self.intervals.battery),
            ("load", self.intervals.load),
            ("grid", self.intervals.grid),
            ("inverter", self.intervals.inverter),
            ("statistics", self.intervals.statistics),
            ("temperature", self.intervals.temperature),
            ("general", self.intervals.general),
        ] {
            if interval.as_millis() == 0 {
                anyhow::bail!("intervals.{name}_ms must be >= 1");
            }
        }
        Ok(())
    }
}

fn apply_env_overrides(config: &mut BridgeConfig) {
    if let Ok(value) = env::var("MQTT_HOST") {
        config.mqtt.host = value;
    }
    if let Some(port) = parse_env_u16("MQTT_PORT") {
        config.mqtt.port = port;
    }
    if let Ok(value) = env::var("MQTT_USERNAME") {
        config.mqtt.username = Some(value);
    }
    if let Ok(value) = env::var("MQTT_PASSWORD") {
        config.mqtt.password = Some(value);
    }
    if let Ok(value) = env::var("MQTT_TOPIC") {
        config.root_topic = value;
    }
    if let Ok(value) = env::var("DISCOVERY_PREFIX") {
        config.discovery_prefix = value;
    }
    if let Ok(value) = env::var("DEVICE_MANUFACTURER") {
        config.device_manufacturer = value;
    }

    if let Ok(value) = env::var("SERIAL_DEVICE") {
        config.serial.device = value;
    }
    if let Some(baud) = parse_env_u32("SERIAL_BAUD_RATE") {
        config.serial.baud_rate = baud;
    }
    if let Some(address) = parse_env_u8("MODBUS_ADDRESS") {
        config.serial.slave_id = address;
    }

    config.features.system = parse_env_bool("PUBLISH_SYSTEM").unwrap_or(config.features.system);
    config.features.battery =
        parse_env_bool("BATTERY_CONNECTED").unwrap_or(config.features.battery);
    config.features.split_phase =
        parse_env_u8("SPLIT_PHASE").unwrap_or(config.features.split_phase);
    config.features.pv_trackers =
        parse_env_u8("NB_MPP_TRACKERS").unwrap_or(config.features.pv_trackers);
    config.features.ambient_temperature = parse_env_bool("HAS_AMBIENT_TEMPERATURE")
        .unwrap_or(config.features.ambient_temperature);

    for (key, slot) in [
        ("PV_INTERVAL", &mut config.intervals.pv),
        ("BATTERY_INTERVAL", &mut config.intervals.battery),
        ("LOAD_INTERVAL", &mut config.intervals.load),
        ("GRID_INTERVAL", &mut config.intervals.grid),
        ("INVERTER_INTERVAL", &mut config.intervals.inverter),
        ("STATISTICS_INTERVAL", &mut config.intervals.statistics),
        ("TEMPERATURE_INTERVAL", &mut config.intervals.temperature),
        ("GENERAL_INTERVAL", &mut config.intervals.general),
    ] {
        if let Some(interval_ms) = parse_env_u64(key) {
            *slot = Duration::from_millis(interval_ms);
        }
    }

    if let Some(sleep_ms) = parse_env_u64("LOOP_SLEEP") {
        config.scheduler.tick_interval = Duration::from_millis(sleep_ms);
    }
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    mqtt: Option<FileMqttConfig>,
    serial: Option<FileSerialConfig>,
    bridge: Option<FileBridgeConfig>,
    features: Option<FileFeaturesConfig>,
    intervals: Option<FileIntervalsConfig>,
    scheduler: Option<FileSchedulerConfig>,
}

#[derive(Debug, Deserialize)]
struct FileMqttConfig {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    keep_alive_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileSerialConfig {
    device: Option<String>,
    baud_rate: Option<u32>,
    slave_id: Option<u8>,
    timeout_ms: Option<u64>,
    retry_count: Option<usize>,
    retry_backoff_ms: Option<u64>,
    retry_max_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileBridgeConfig {
    root_topic: Option<String>,
    discovery_prefix: Option<String>,
    device_manufacturer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileFeaturesConfig {
    system: Option<bool>,
    battery: Option<bool>,
    split_phase: Option<u8>,
    pv_trackers: Option<u8>,
    ambient_temperature: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct FileIntervalsConfig {
    pv_ms: Option<u64>,
    battery_ms: Option<u64>,
    load_ms: Option<u64>,
    grid_ms: Option<u64>,
    inverter_ms: Option<u64>,
    statistics_ms: Option<u64>,
    temperature_ms: Option<u64>,
    general_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileSchedulerConfig {
    loop_sleep_ms: Option<u64>,
    write_settle_ms: Option<u64>,
    error_backoff_ms: Option<u64>,
    refresh_grace_ms: Option<u64>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("BRIDGE_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut BridgeConfig, file: FileConfig) {
    if let Some(mqtt) = file.mqtt {
        if let Some(host) = mqtt.host {
            config.mqtt.host = host;
        }
        if let Some(port) = mqtt.port {
            config.mqtt.port = port;
        }
        if let Some(username) = mqtt.username {
            config.mqtt.username = Some(username);
        }
        if let Some(password) = mqtt.password {
            config.mqtt.password = Some(password);
        }
        if let Some(client_id) = mqtt.client_id {
            config.mqtt.client_id = client_id;
        }
        if let Some(keep_alive) = mqtt.keep_alive_secs {
            config.mqtt.keep_alive_secs = keep_alive;
        }
    }

    if let Some(serial) = file.serial {
        if let Some(device) = serial.device {
            config.serial.device = device;
        }
        if let Some(baud_rate) = serial.baud_rate {
            config.serial.baud_rate = baud_rate;
        }
        if let Some(slave_id) = serial.slave_id {
            config.serial.slave_id = slave_id;
        }
        if let Some(timeout_ms) = serial.timeout_ms {
            config.serial.timeout_ms = timeout_ms;
        }
        if let Some(retry_count) = serial.retry_count {
            config.serial.retry_count = retry_count;
        }
        if let Some(backoff) = serial.retry_backoff_ms {
            config.serial.retry_backoff_ms = backoff;
        }
        if let Some(max_backoff) = serial.retry_max_backoff_ms {
            config.serial.retry_max_backoff_ms = max_backoff;
        }
    }

    if let Some(bridge) = file.bridge {
        if let Some(root_topic) = bridge.root_topic {
            config.root_topic = root_topic;
        }
        if let Some(prefix) = bridge.discovery_prefix {
            config.discovery_prefix = prefix;
        }
        if let Some(manufacturer) = bridge.device_manufacturer {
            config.device_manufacturer = manufacturer;
        }
    }

    if let Some(features) = file.features {
        if let Some(system) = features.system {
            config.features.system = system;
        }
        if let Some(battery) = features.battery {
            config.features.battery = battery;
        }
        if let Some(split_phase) = features.split_phase {
            config.features.split_phase = split_phase;
        }
        if let Some(pv_trackers) = features.pv_trackers {
            config.features.pv_trackers = pv_trackers;
        }
        if let Some(ambient) = features.ambient_temperature {
            config.features.ambient_temperature = ambient;
        }
    }

    if let Some(intervals) = file.intervals {
        for (value, slot) in [
            (intervals.pv_ms, &mut config.intervals.pv),
            (intervals.battery_ms, &mut config.intervals.battery),
            (intervals.load_ms, &mut config.intervals.load),
            (intervals.grid_ms, &mut config.intervals.grid),
            (intervals.inverter_ms, &mut config.intervals.inverter),
            (intervals.statistics_ms, &mut config.intervals.statistics),
            (intervals.temperature_ms, &mut config.intervals.temperature),
            (intervals.general_ms, &mut config.intervals.general),
        ] {
            if let Some(interval_ms) = value {
                *slot = Duration::from_millis(interval_ms);
            }
        }
    }

    if let Some(scheduler) = file.scheduler {
        if let Some(sleep_ms) = scheduler.loop_sleep_ms {
            config.scheduler.tick_interval = Duration::from_millis(sleep_ms);
        }
        if let Some(settle_ms) = scheduler.write_settle_ms {
            config.scheduler.write_settle = Duration::from_millis(settle_ms);
        }
        if let Some(backoff_ms) = scheduler.error_backoff_ms {
            config.scheduler.error_backoff = Duration::from_millis(backoff_ms);
        }
        if let Some(grace_ms) = scheduler.refresh_grace_ms {
            config.scheduler.refresh_grace = Duration::from_millis(grace_ms);
        }
    }
}

fn parse_env_u8(key: &str) -> Option<u8> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u16(key: &str) -> Option<u16> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().map(|value| value == "true")
}
