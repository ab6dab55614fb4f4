//! MQTT topic layout shared by the scheduler, the command router and
//! the discovery publisher.
//!
//! State topics look like `<root>/<component>/<point>/state` and
//! command topics like `<root>/<component>/<point>/set`, where the
//! point name may itself contain slashes (`battery/voltage`).

pub const STATE_SUFFIX: &str = "state";
pub const SET_SUFFIX: &str = "set";

pub fn state_topic(root: &str, component: &str, point: &str) -> String {
    format!("{root}/{component}/{point}/{STATE_SUFFIX}")
}

pub fn command_topic(root: &str, component: &str, point: &str) -> String {
    format!("{root}/{component}/{point}/{SET_SUFFIX}")
}

/// Stable per-point identifier used as the discovery `uniq_id`; must
/// not contain slashes.
pub fn unique_id(root: &str, point: &str) -> String {
    format!("{root}-{}", point.replace('/', "-"))
}

/// Extracts the point name from an inbound command topic, or `None`
/// when the topic does not belong to this device root.
pub fn parse_command(root: &str, topic: &str) -> Option<String> {
    let rest = topic.strip_prefix(root)?.strip_prefix('/')?;
    let rest = rest.strip_suffix(SET_SUFFIX)?.strip_suffix('/')?;
    let (component, point) = rest.split_once('/')?;
    if component.is_empty() || point.is_empty() {
        return None;
    }
    Some(point.to_string())
}
