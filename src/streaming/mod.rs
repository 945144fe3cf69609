// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Streaming module - publishes alarm reports off the hub

#[cfg(feature = "mqtt")]
mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::MqttReporter;

use serde::{Deserialize, Serialize};

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Enable MQTT
    pub mqtt_enabled: bool,
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_keep_alive_secs: u64,

    /// Topic every report is published to
    pub report_topic: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            mqtt_enabled: false,
            mqtt_broker: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: "hubalarm".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            mqtt_keep_alive_secs: 30,
            report_topic: "hubalarm/report".to_string(),
        }
    }
}
