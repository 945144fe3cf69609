// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Alarm events - the closed set of inputs every alarm evaluates

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::devices::Address;
use crate::error::AlarmError;

/// What kind of sensor (or person) raised a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trigger {
    Panic,
    Contact,
    Motion,
    Smoke,
    Co,
    Water,
    Glass,
    Door,
}

/// Requested security arm mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArmMode {
    On,
    Partial,
}

impl ArmMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArmMode::On => "ON",
            ArmMode::Partial => "PARTIAL",
        }
    }
}

impl FromStr for ArmMode {
    type Err = AlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ON" => Ok(ArmMode::On),
            "PARTIAL" => Ok(ArmMode::Partial),
            other => Err(AlarmError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for ArmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sensor changed to or from its triggered value, or someone pressed panic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    pub source: Address,
    pub actor: Option<Address>,
    pub trigger: Trigger,
    pub triggered: bool,
}

/// Parameters of an arm request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmEvent {
    pub source: Address,
    pub actor: Option<Address>,
    pub mode: ArmMode,
    pub bypass: bool,
    pub entrance_delay_secs: u32,
    pub exit_delay_secs: u32,
    pub sensitivity_device_count: u32,
    pub silent: bool,
    pub sounds_enabled: bool,
    pub active_devices: BTreeSet<Address>,
}

/// Every input an alarm state machine can be asked about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmEvent {
    Activate { source: Address, actor: Option<Address> },
    Suspend { source: Address, actor: Option<Address> },
    Arm(ArmEvent),
    Disarm { source: Address, actor: Option<Address> },
    Clear { source: Address, actor: Option<Address> },
    Trigger(TriggerEvent),
}

impl AlarmEvent {
    pub fn activate(source: Address, actor: Option<Address>) -> Self {
        AlarmEvent::Activate { source, actor }
    }

    pub fn suspend(source: Address, actor: Option<Address>) -> Self {
        AlarmEvent::Suspend { source, actor }
    }

    pub fn disarm(source: Address, actor: Option<Address>) -> Self {
        AlarmEvent::Disarm { source, actor }
    }

    pub fn clear(source: Address, actor: Option<Address>) -> Self {
        AlarmEvent::Clear { source, actor }
    }

    pub fn trigger(source: Address, actor: Option<Address>, trigger: Trigger, triggered: bool) -> Self {
        AlarmEvent::Trigger(TriggerEvent {
            source,
            actor,
            trigger,
            triggered,
        })
    }

    pub fn source(&self) -> &Address {
        match self {
            AlarmEvent::Activate { source, .. }
            | AlarmEvent::Suspend { source, .. }
            | AlarmEvent::Disarm { source, .. }
            | AlarmEvent::Clear { source, .. } => source,
            AlarmEvent::Arm(arm) => &arm.source,
            AlarmEvent::Trigger(trigger) => &trigger.source,
        }
    }

    pub fn actor(&self) -> Option<&Address> {
        match self {
            AlarmEvent::Activate { actor, .. }
            | AlarmEvent::Suspend { actor, .. }
            | AlarmEvent::Disarm { actor, .. }
            | AlarmEvent::Clear { actor, .. } => actor.as_ref(),
            AlarmEvent::Arm(arm) => arm.actor.as_ref(),
            AlarmEvent::Trigger(trigger) => trigger.actor.as_ref(),
        }
    }

    pub fn is_disarm(&self) -> bool {
        matches!(self, AlarmEvent::Disarm { .. })
    }

    pub fn is_clear(&self) -> bool {
        matches!(self, AlarmEvent::Clear { .. })
    }

    pub fn is_arm(&self) -> bool {
        matches!(self, AlarmEvent::Arm(_))
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self, AlarmEvent::Trigger(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlarmEvent::Activate { .. } => "activate",
            AlarmEvent::Suspend { .. } => "suspend",
            AlarmEvent::Arm(_) => "arm",
            AlarmEvent::Disarm { .. } => "disarm",
            AlarmEvent::Clear { .. } => "clear",
            AlarmEvent::Trigger(_) => "trigger",
        }
    }
}
