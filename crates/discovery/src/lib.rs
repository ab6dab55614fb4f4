//! Home Assistant MQTT discovery.
//!
//! One retained config record per enabled point, published under
//! `<prefix>/<component>/<uniq_id>/config`. Home Assistant reads these
//! once and then follows the state/command topics they point at.

use serde_json::{json, Map, Value as Json};
use thiserror::Error;

use registry::Registry;
use types::topics;
use types::DeviceInfo;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery payload for {point}: {source}")]
    Payload {
        point: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A ready-to-publish retained discovery config.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryRecord {
    pub topic: String,
    pub payload: String,
}

/// Builds the full set of discovery records for a registry.
///
/// Buttons get no state topic (they have nothing to report) and
/// read-only points get no command topic. Disabled points are skipped
/// entirely so Home Assistant never learns about them.
pub fn discovery_records(
    registry: &Registry,
    device: &DeviceInfo,
    root_topic: &str,
    prefix: &str,
) -> Result<Vec<DiscoveryRecord>, DiscoveryError> {
    let device_block = json!({
        "name": device.name,
        "identifiers": device.identifiers,
        "manufacturer": device.manufacturer,
        "model": device.model,
        "serial_number": device.serial_number,
    });

    let mut records = Vec::new();
    for point in registry.enabled_points() {
        let component = point.category.component();
        let uniq_id = topics::unique_id(root_topic, &point.name);

        let meta = serde_json::to_value(&point.meta).map_err(|source| {
            DiscoveryError::Payload { point: point.name.clone(), source }
        })?;
        let mut payload: Map<String, Json> = match meta {
            Json::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("name".to_string(), other);
                map
            }
        };
        payload.insert("unique_id".to_string(), json!(uniq_id));
        payload.insert("device".to_string(), device_block.clone());
        if !point.is_button() {
            payload.insert(
                "state_topic".to_string(),
                json!(topics::state_topic(root_topic, component, &point.name)),
            );
        }
        if point.write.is_some() {
            payload.insert(
                "command_topic".to_string(),
                json!(topics::command_topic(root_topic, component, &point.name)),
            );
        }

        records.push(DiscoveryRecord {
            topic: format!("{prefix}/{component}/{uniq_id}/config"),
            payload: Json::Object(payload).to_string(),
        });
    }
    Ok(records)
}

/// Command topics the MQTT link must subscribe to: one per enabled
/// writable point.
pub fn command_topics(registry: &Registry, root_topic: &str) -> Vec<String> {
    registry
        .enabled_points()
        .filter(|point| point.write.is_some())
        .map(|point| {
            topics::command_topic(root_topic, point.category.component(), &point.name)
        })
        .collect()
}
