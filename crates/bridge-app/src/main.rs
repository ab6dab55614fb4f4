use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use bridge_app::config::BridgeConfig;
use bridge_app::points::default_points;
use discovery::{command_topics, discovery_records};
use modbus_rtu::RtuDevice;
use mqtt_link::{CommandRouter, MqttLink};
use registry::codec::{self, ScaleContext};
use registry::{ReadOp, Registry};
use scheduler::Scheduler;
use types::{DeviceInfo, RegisterBus};

const COMMAND_QUEUE_CAPACITY: usize = 32;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = parse_config_arg();
    let config = BridgeConfig::load_with_path(config_path).context("load config failed")?;
    config.validate().context("config validation failed")?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut device = RtuDevice::connect(config.serial.clone())
        .with_context(|| format!("open serial device {}", config.serial.device))?;
    info!(device = %config.serial.device, slave = config.serial.slave_id, "serial link open");

    let (scale, identity) = read_device_identity(&mut device, &config)
        .await
        .context("read device identity failed")?;
    info!(
        battery_rate = scale.battery_rate,
        serial = %identity.serial_number,
        model = %identity.model,
        "inverter identified"
    );

    let points = default_points(&config.features, &config.intervals, scale.battery_rate);
    let registry = Arc::new(Registry::build(points).context("build point registry failed")?);

    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::channel(config.mqtt.capacity.max(1));

    let (link, eventloop) = MqttLink::connect(&config.mqtt);
    let router = CommandRouter::new(config.root_topic.clone(), command_tx);
    let subscriptions = command_topics(&registry, &config.root_topic);
    let link_handle = tokio::spawn(mqtt_link::drive(
        eventloop,
        link.clone(),
        router,
        subscriptions,
        shutdown_rx.clone(),
        Duration::from_millis(config.mqtt.reconnect_delay_ms),
    ));

    let records =
        discovery_records(&registry, &identity, &config.root_topic, &config.discovery_prefix)
            .context("build discovery records failed")?;
    for record in &records {
        if let Err(err) = link.publish(&record.topic, &record.payload, true).await {
            warn!(topic = %record.topic, error = %err, "discovery publish failed");
        }
    }
    info!(records = records.len(), "discovery announced");

    let publisher_handle =
        tokio::spawn(mqtt_link::publish_task(link, outbound_rx, shutdown_rx.clone()));

    let scheduler = Scheduler::new(
        registry,
        device,
        scale,
        config.root_topic.clone(),
        command_rx,
        outbound_tx,
        shutdown_rx.clone(),
        config.scheduler.clone(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    notify_ready();
    let watchdog_handle = start_watchdog(shutdown_rx.clone());

    tokio::signal::ctrl_c().await.context("wait for shutdown signal failed")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = scheduler_handle.await;
    let _ = publisher_handle.await;
    let _ = link_handle.await;
    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    Ok(())
}

/// Startup reads over the freshly opened bus: the battery rate voltage
/// decides every rate-scaled threshold, and the serial number and model
/// identify the device in discovery. All three are fatal when they
/// fail; a link that cannot answer these will not answer anything.
async fn read_device_identity(
    device: &mut RtuDevice,
    config: &BridgeConfig,
) -> Result<(ScaleContext, DeviceInfo)> {
    let words = device
        .read_registers(0xE003, 1)
        .await
        .context("read battery rate voltage")?;
    let raw_rate = words.first().copied().context("empty rate voltage response")?;
    let scale = ScaleContext::from_rate_voltage(raw_rate);

    let serial_op = ReadOp::text(0x035, 10);
    let words = device
        .read_registers(serial_op.register, serial_op.count)
        .await
        .context("read serial number")?;
    let serial = codec::decode(&serial_op, &words, &scale)
        .context("decode serial number")?
        .to_string();

    let model_op = ReadOp::integer(0x01B);
    let words = device
        .read_registers(model_op.register, model_op.count)
        .await
        .context("read model register")?;
    let model = codec::decode(&model_op, &words, &scale)
        .context("decode model register")?
        .to_string();

    let identity = DeviceInfo {
        name: format!("{} Inverter", config.device_manufacturer),
        identifiers: vec![format!("{}-{}", config.root_topic, serial)],
        manufacturer: config.device_manufacturer.clone(),
        model,
        serial_number: serial,
    };
    Ok((scale, identity))
}

fn parse_config_arg() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}

#[cfg(target_os = "linux")]
fn start_watchdog(
    mut shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = watchdog_interval()?;
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]) {
                        warn!(error = %err, "systemd watchdog notify failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
fn start_watchdog(_shutdown: watch::Receiver<bool>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(target_os = "linux")]
fn watchdog_interval() -> Option<Duration> {
    let watchdog_usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        if pid != std::process::id() {
            return None;
        }
    }

    let interval = watchdog_usec.saturating_div(2).max(100_000);
    Some(Duration::from_micros(interval))
}
