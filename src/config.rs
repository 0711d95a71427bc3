//! Runtime configuration of the audio sink.

use std::time::Duration;

use serde::Deserialize;

/// Settings read from the host's JSON configuration. Every field is optional;
/// missing fields take the values of [`SinkConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SinkConfig {
    /// Name under which the host exposes the Bluetooth controller.
    pub controller: String,
    /// Upper bound for opening an SDP or AVDTP connection, in milliseconds.
    pub open_timeout: u64,
    /// Upper bound for closing an SDP or AVDTP connection, in milliseconds.
    pub close_timeout: u64,
    /// Base timeout of a single request/response exchange, in milliseconds.
    pub communication_timeout: u64,
    /// A discovery query may take this many communication timeouts.
    pub discovery_timeout_factor: u32,
    /// `MaximumAttributeByteCount` sent with every SDP attribute request.
    pub max_attribute_bytes: u16,
    /// Number of dispatched jobs allowed to run at once.
    pub workers: usize,
    /// Number of jobs that may wait in the dispatch queue.
    pub queue_depth: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            controller: String::from("BluetoothControl"),
            open_timeout: 1000,
            close_timeout: 5000,
            communication_timeout: 500,
            discovery_timeout_factor: 20,
            max_attribute_bytes: u16::MAX,
            workers: 4,
            queue_depth: 32,
        }
    }
}

impl SinkConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout)
    }

    pub fn communication_timeout(&self) -> Duration {
        Duration::from_millis(self.communication_timeout)
    }

    pub fn discovery_timeout(&self) -> Duration {
        self.communication_timeout() * self.discovery_timeout_factor
    }
}
