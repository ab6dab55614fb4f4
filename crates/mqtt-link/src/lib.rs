//! MQTT side of the bridge, built on rumqttc.
//!
//! [`MqttLink`] wraps the async client for publishing. [`drive`] owns
//! the event loop: it re-subscribes to command topics after every
//! reconnect and forwards inbound set-topic payloads to the scheduler
//! through a [`CommandRouter`]. Nothing here touches the register bus.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use types::topics;
use types::{Publication, WriteCommand};

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Event loop channel capacity handed to rumqttc.
    pub capacity: usize,
    pub reconnect_delay_ms: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "inverter-mqtt-bridge".to_string(),
            keep_alive_secs: 30,
            capacity: 16,
            reconnect_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("mqtt client error: {0}")]
    Client(#[from] rumqttc::ClientError),
}

/// Cheap-to-clone publishing handle over the shared rumqttc client.
#[derive(Clone)]
pub struct MqttLink {
    client: AsyncClient,
}

impl MqttLink {
    /// Builds the client and its event loop. The event loop must be
    /// handed to [`drive`] or no packet ever moves.
    pub fn connect(config: &MqttConfig) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }
        let (client, eventloop) = AsyncClient::new(options, config.capacity);
        (Self { client }, eventloop)
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: &str,
        retain: bool,
    ) -> Result<(), MqttError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload)
            .await?;
        Ok(())
    }

    pub async fn subscribe(&self, topic: &str) -> Result<(), MqttError> {
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(())
    }
}

/// Maps inbound set-topic publishes onto the scheduler's write queue.
pub struct CommandRouter {
    root_topic: String,
    commands: mpsc::Sender<WriteCommand>,
}

impl CommandRouter {
    pub fn new(root_topic: impl Into<String>, commands: mpsc::Sender<WriteCommand>) -> Self {
        Self { root_topic: root_topic.into(), commands }
    }

    /// Queues a write for a recognized command topic. Foreign topics
    /// and full-queue overflow are dropped with a log line; the serial
    /// side never blocks on MQTT.
    pub fn route(&self, topic: &str, payload: &str) -> bool {
        let Some(point) = topics::parse_command(&self.root_topic, topic) else {
            debug!(topic, "ignoring non-command topic");
            return false;
        };
        let command = WriteCommand { point: point.clone(), payload: payload.to_string() };
        match self.commands.try_send(command) {
            Ok(()) => {
                info!(point = %point, "write command queued");
                true
            }
            Err(err) => {
                warn!(point = %point, error = %err, "write command dropped");
                false
            }
        }
    }
}

/// Runs the rumqttc event loop until shutdown. Subscriptions are
/// replayed on every ConnAck so command topics survive broker
/// reconnects.
pub async fn drive(
    mut eventloop: EventLoop,
    link: MqttLink,
    router: CommandRouter,
    command_topics: Vec<String>,
    mut shutdown: watch::Receiver<bool>,
    reconnect_delay: Duration,
) {
    loop {
        tokio::select! {
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!(session_present = ack.session_present, "mqtt connected");
                    for topic in &command_topics {
                        if let Err(err) = link.subscribe(topic).await {
                            warn!(topic, error = %err, "subscribe failed");
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload);
                    router.route(&publish.topic, payload.trim());
                }
                Ok(event) => {
                    debug!(?event, "mqtt event");
                }
                Err(err) => {
                    warn!(error = %err, "mqtt connection error, reconnecting");
                    sleep(reconnect_delay).await;
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt event loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Forwards scheduler publications to the broker until the channel
/// closes or shutdown flips. State publishes are retained so Home
/// Assistant sees the last value immediately after a restart.
pub async fn publish_task(
    link: MqttLink,
    mut outbound: mpsc::Receiver<Publication>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            publication = outbound.recv() => match publication {
                Some(Publication { topic, payload }) => {
                    if let Err(err) = link.publish(&topic, &payload, true).await {
                        warn!(topic, error = %err, "state publish failed");
                    }
                }
                None => {
                    info!("publication channel closed");
                    break;
                }
            },
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("publish task shutting down");
                    break;
                }
            }
        }
    }
}
