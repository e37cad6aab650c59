//! Topic construction for the `devices/...` namespace
//!
//! Every message this daemon publishes lives under `devices/<client_id>/`.
//! The `status` and `health` suffixes are reserved for the daemon itself and
//! rejected as metric suffixes at configuration time.

/// Root segment of every topic this daemon publishes on.
pub const TOPIC_ROOT: &str = "devices";

/// Reserved suffix for the retained liveness record.
pub const STATUS_SUFFIX: &str = "status";

/// Reserved suffix for the periodic health frame.
pub const HEALTH_SUFFIX: &str = "health";

/// Build a telemetry topic: `devices/<client_id>/<suffix>`.
pub fn telemetry_topic(client_id: &str, suffix: &str) -> String {
    let mut topic = String::with_capacity(TOPIC_ROOT.len() + client_id.len() + suffix.len() + 2);
    topic.push_str(TOPIC_ROOT);
    topic.push('/');
    topic.push_str(client_id);
    topic.push('/');
    topic.push_str(suffix);
    topic
}

/// Build the status topic: `devices/<client_id>/status`.
pub fn status_topic(client_id: &str) -> String {
    telemetry_topic(client_id, STATUS_SUFFIX)
}

/// Build the health topic: `devices/<client_id>/health`.
pub fn health_topic(client_id: &str) -> String {
    telemetry_topic(client_id, HEALTH_SUFFIX)
}

/// Whether a metric topic suffix collides with a reserved daemon topic.
pub fn is_reserved_suffix(suffix: &str) -> bool {
    suffix == STATUS_SUFFIX || suffix == HEALTH_SUFFIX
}
