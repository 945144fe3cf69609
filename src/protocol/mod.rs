// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Inbound messages - platform requests with one response each, and keypad
//! protocol messages that never answer

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::{ArmEvent, ArmMode, SecurityMode, Trigger};
use crate::config::AlarmConfig;
use crate::devices::{attrs, Address};

/// Platform request envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformRequest {
    pub source: Address,
    pub actor: Option<Address>,
    pub body: AlarmRequest,
}

impl PlatformRequest {
    pub fn new(source: impl Into<Address>, body: AlarmRequest) -> Self {
        Self {
            source: source.into(),
            actor: None,
            body,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<Address>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Requests the hub alarm answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AlarmRequest {
    Activate,
    Suspend,
    Arm(ArmRequest),
    Disarm {
        disarmed_by: Option<Address>,
        disarmed_from: Address,
    },
    Panic {
        source: Option<Address>,
    },
    ClearIncident,
    Verified,
    PrealertTriggered {
        duration_secs: u32,
    },
    AlertTriggered {
        alert: String,
        monitored: bool,
    },
    AlertCancelled {
        alert: String,
    },
    SecurityArming {
        mode: ArmMode,
        duration_secs: u32,
    },
    SecurityArmed {
        mode: SecurityMode,
    },
    SecurityDisarmed,
    /// Any message type the alarm does not know.
    Unsupported {
        message_type: String,
    },
}

impl AlarmRequest {
    /// Cue requests drive the sounder and LED only and are served while
    /// suspended; Activate and Suspend are too.
    pub fn requires_active(&self) -> bool {
        matches!(
            self,
            AlarmRequest::Arm(_)
                | AlarmRequest::Disarm { .. }
                | AlarmRequest::Panic { .. }
                | AlarmRequest::ClearIncident
                | AlarmRequest::Verified
        )
    }

    pub fn name(&self) -> &str {
        match self {
            AlarmRequest::Activate => "Activate",
            AlarmRequest::Suspend => "Suspend",
            AlarmRequest::Arm(_) => "Arm",
            AlarmRequest::Disarm { .. } => "Disarm",
            AlarmRequest::Panic { .. } => "Panic",
            AlarmRequest::ClearIncident => "ClearIncident",
            AlarmRequest::Verified => "Verified",
            AlarmRequest::PrealertTriggered { .. } => "PrealertTriggered",
            AlarmRequest::AlertTriggered { .. } => "AlertTriggered",
            AlarmRequest::AlertCancelled { .. } => "AlertCancelled",
            AlarmRequest::SecurityArming { .. } => "SecurityArming",
            AlarmRequest::SecurityArmed { .. } => "SecurityArmed",
            AlarmRequest::SecurityDisarmed => "SecurityDisarmed",
            AlarmRequest::Unsupported { message_type } => message_type,
        }
    }
}

/// Arm request parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmRequest {
    pub mode: ArmMode,
    #[serde(default)]
    pub bypassed: bool,
    /// Falls back to the configured default when absent.
    #[serde(default)]
    pub entrance_delay_secs: Option<u32>,
    #[serde(default)]
    pub exit_delay_secs: Option<u32>,
    #[serde(default)]
    pub sensitivity_device_count: Option<u32>,
    #[serde(default)]
    pub silent: bool,
    #[serde(default = "default_true")]
    pub sounds_enabled: bool,
    pub active_devices: BTreeSet<Address>,
    pub armed_by: Option<Address>,
    pub armed_from: Address,
}

fn default_true() -> bool {
    true
}

impl ArmRequest {
    pub fn to_event(&self, defaults: &AlarmConfig) -> ArmEvent {
        ArmEvent {
            source: self.armed_from.clone(),
            actor: self.armed_by.clone(),
            mode: self.mode,
            bypass: self.bypassed,
            entrance_delay_secs: self.entrance_delay_secs.unwrap_or(defaults.entrance_delay_secs),
            exit_delay_secs: self.exit_delay_secs.unwrap_or(defaults.exit_delay_secs),
            sensitivity_device_count: self
                .sensitivity_device_count
                .unwrap_or(defaults.sensitivity_device_count),
            silent: self.silent,
            sounds_enabled: self.sounds_enabled,
            active_devices: self.active_devices.clone(),
        }
    }
}

/// Successful replies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AlarmResponse {
    Activated,
    Suspended,
    Armed { security_arm_time: Option<DateTime<Utc>> },
    Disarmed,
    Panicked,
    IncidentCleared,
    /// Event-style messages that carry no reply body.
    Handled,
}

/// Keypad protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub source: Address,
    pub actor: Option<Address>,
    pub body: ProtocolBody,
}

impl ProtocolMessage {
    pub fn new(source: impl Into<Address>, body: ProtocolBody) -> Self {
        Self {
            source: source.into(),
            actor: None,
            body,
        }
    }

    /// Attribute change from one device.
    pub fn attributes<'a>(source: impl Into<Address>, changes: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let attrs = changes
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self::new(source, ProtocolBody::ValueChange(attrs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "attributes")]
pub enum ProtocolBody {
    PanicPressed,
    DisarmPressed,
    ValueChange(BTreeMap<String, String>),
    SetAttributes(BTreeMap<String, String>),
    Other(String),
}

/// Map a wire attribute onto the trigger it represents, and whether the
/// value means triggered. Attributes the alarms ignore map to `None`.
pub fn trigger_for_attribute(name: &str, value: &str) -> Option<(Trigger, bool)> {
    let mapped = match name {
        attrs::CONTACT => (Trigger::Contact, value == attrs::CONTACT_OPENED),
        attrs::MOTION => (Trigger::Motion, value == attrs::MOTION_DETECTED),
        attrs::GLASS_BREAK => (Trigger::Glass, value == attrs::GLASS_DETECTED),
        attrs::DOOR_STATE => (
            Trigger::Door,
            matches!(value, attrs::DOOR_OPEN | attrs::DOOR_OPENING | attrs::DOOR_OBSTRUCTION),
        ),
        attrs::LEAK => (Trigger::Water, value == attrs::LEAK_DETECTED),
        attrs::CO => (Trigger::Co, value == attrs::CO_DETECTED),
        attrs::SMOKE => (Trigger::Smoke, value == attrs::SMOKE_DETECTED),
        _ => return None,
    };
    Some(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_trigger_table() {
        assert_eq!(
            trigger_for_attribute(attrs::CONTACT, attrs::CONTACT_OPENED),
            Some((Trigger::Contact, true))
        );
        assert_eq!(
            trigger_for_attribute(attrs::CONTACT, attrs::CONTACT_CLOSED),
            Some((Trigger::Contact, false))
        );
        assert_eq!(
            trigger_for_attribute(attrs::DOOR_STATE, attrs::DOOR_OBSTRUCTION),
            Some((Trigger::Door, true))
        );
        assert_eq!(trigger_for_attribute(attrs::LEAK, "LEAK"), Some((Trigger::Water, true)));
        assert_eq!(trigger_for_attribute("temp:temperature", "21.5"), None);
    }

    #[test]
    fn test_request_activation_gate() {
        assert!(!AlarmRequest::Activate.requires_active());
        assert!(!AlarmRequest::SecurityDisarmed.requires_active());
        assert!(AlarmRequest::ClearIncident.requires_active());
        assert!(AlarmRequest::Panic { source: None }.requires_active());
    }

    #[test]
    fn test_arm_request_to_event() {
        let req = ArmRequest {
            mode: ArmMode::Partial,
            bypassed: true,
            entrance_delay_secs: Some(10),
            exit_delay_secs: None,
            sensitivity_device_count: Some(2),
            silent: false,
            sounds_enabled: true,
            active_devices: [Address::from("DRIV:dev:door")].into_iter().collect(),
            armed_by: Some(Address::from("SERV:person:1")),
            armed_from: Address::from("CLNT:app:1"),
        };
        let defaults = AlarmConfig::default();
        let ev = req.to_event(&defaults);
        assert_eq!(ev.source, Address::from("CLNT:app:1"));
        assert_eq!(ev.entrance_delay_secs, 10);
        assert_eq!(ev.exit_delay_secs, defaults.exit_delay_secs);
        assert_eq!(ev.actor, Some(Address::from("SERV:person:1")));
        assert!(ev.bypass);
        assert_eq!(ev.sensitivity_device_count, 2);
    }

    #[test]
    fn test_request_deserializes_from_json() {
        let req: AlarmRequest = serde_json::from_str(
            r#"{"type":"Disarm","disarmed_by":null,"disarmed_from":"PROT:ZIGB:kp"}"#,
        )
        .unwrap();
        assert_eq!(req.name(), "Disarm");
        assert!(req.requires_active());
    }
}
