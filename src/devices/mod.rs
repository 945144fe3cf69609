// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Device registry seam - which devices exist, their online state and attributes

mod registry;

pub use registry::InMemoryRegistry;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire attribute names and values the alarms look at.
pub mod attrs {
    pub const CONTACT: &str = "cont:contact";
    pub const CONTACT_OPENED: &str = "OPENED";
    pub const CONTACT_CLOSED: &str = "CLOSED";

    pub const MOTION: &str = "mot:motion";
    pub const MOTION_DETECTED: &str = "DETECTED";
    pub const MOTION_NONE: &str = "NONE";

    pub const GLASS_BREAK: &str = "glass:break";
    pub const GLASS_DETECTED: &str = "DETECTED";
    pub const GLASS_SAFE: &str = "SAFE";

    pub const DOOR_STATE: &str = "motdoor:doorstate";
    pub const DOOR_OPEN: &str = "OPEN";
    pub const DOOR_OPENING: &str = "OPENING";
    pub const DOOR_OBSTRUCTION: &str = "OBSTRUCTION";
    pub const DOOR_CLOSED: &str = "CLOSED";

    pub const LEAK: &str = "leakh2o:state";
    pub const LEAK_DETECTED: &str = "LEAK";
    pub const LEAK_SAFE: &str = "SAFE";

    pub const CO: &str = "co:co";
    pub const CO_DETECTED: &str = "DETECTED";
    pub const CO_SAFE: &str = "SAFE";

    pub const SMOKE: &str = "smoke:smoke";
    pub const SMOKE_DETECTED: &str = "DETECTED";
    pub const SMOKE_SAFE: &str = "SAFE";
}

/// Address of a device or message source, e.g. `DRIV:dev:6c3a...` or `PROT:ZIGB:...`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Prefix carried by addresses of protocol-level (keypad) sources.
    pub const PROTOCOL_PREFIX: &'static str = "PROT";

    /// Namespace fragment carried by rule addresses.
    pub const RULE_NAMESPACE: &'static str = "rule";

    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Address used when a request names no source.
    pub fn broadcast() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_protocol(&self) -> bool {
        self.0.starts_with(Self::PROTOCOL_PREFIX)
    }

    pub fn is_rule(&self) -> bool {
        self.0.contains(Self::RULE_NAMESPACE)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Device capabilities relevant to the alarms
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    Contact,
    Motion,
    Glass,
    MotorizedDoor,
    LeakH2O,
    CarbonMonoxide,
    Smoke,
    KeyPad,
}

/// Snapshot of one device as the registry currently knows it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub address: Address,
    pub capabilities: BTreeSet<Capability>,
    pub online: bool,
    pub attributes: BTreeMap<String, String>,
}

impl Device {
    pub fn new(address: impl Into<Address>, capabilities: &[Capability]) -> Self {
        Self {
            address: address.into(),
            capabilities: capabilities.iter().copied().collect(),
            online: true,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Builder-style online flag.
    pub fn with_online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn is_offline(&self) -> bool {
        !self.online
    }

    pub fn attribute_is(&self, name: &str, value: &str) -> bool {
        self.attribute(name) == Some(value)
    }
}

/// Source of device snapshots.
///
/// Calls must not block; the engine calls this from its single work queue.
pub trait DeviceRegistry: Send + Sync {
    /// Every device currently known to the hub.
    fn devices(&self) -> Vec<Device>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_classification() {
        assert!(Address::from("PROT:ZIGB:1234").is_protocol());
        assert!(!Address::from("DRIV:dev:1234").is_protocol());
        assert!(Address::from("SERV:rule:7").is_rule());
        assert_eq!(Address::broadcast().as_str(), "");
    }

    #[test]
    fn test_device_builder() {
        let dev = Device::new("DRIV:dev:door", &[Capability::Contact])
            .with_attribute(attrs::CONTACT, attrs::CONTACT_OPENED)
            .with_online(false);

        assert!(dev.has(Capability::Contact));
        assert!(!dev.has(Capability::Motion));
        assert!(dev.is_offline());
        assert!(dev.attribute_is(attrs::CONTACT, attrs::CONTACT_OPENED));
    }
}
