// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Alarm state machines
//!
//! One [`AlarmMachine`] per [`AlarmKind`]. All kinds share the eight-state
//! skeleton in `machine`; Panic, Smoke, CO and Water specialise it in
//! `safety`, Security in `security`.
//!
//! Machines never call back into the controller. Work that must happen after
//! the whole dispatch settles (keypad notices, timers) is pushed onto the
//! [`AlarmContext`] and drained by the controller.

mod events;
mod incident;
mod machine;
mod safety;
mod security;

pub use events::{AlarmEvent, ArmEvent, ArmMode, Trigger, TriggerEvent};
pub use incident::{IncidentEvent, IncidentRecord, IncidentTrigger, TriggerLog, MAX_TRIGGERS};
pub use machine::AlarmMachine;
pub use security::{SecurityExt, MOTION_IDLE_TIMEOUT};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::devices::Device;
use crate::error::AlarmError;
use crate::feedback::Feedback;

/// Per-kind alert state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertState {
    Inactive,
    Disarmed,
    Arming,
    Ready,
    Prealert,
    Alert,
    PendingClear,
    Clearing,
}

impl AlertState {
    /// Weight used when folding every kind into the hub-wide state.
    pub fn priority(&self) -> u8 {
        match self {
            AlertState::Inactive => 0,
            AlertState::Disarmed => 1,
            AlertState::Arming => 2,
            AlertState::Ready => 3,
            AlertState::PendingClear => 4,
            AlertState::Clearing => 5,
            AlertState::Prealert => 6,
            AlertState::Alert => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Inactive => "INACTIVE",
            AlertState::Disarmed => "DISARMED",
            AlertState::Arming => "ARMING",
            AlertState::Ready => "READY",
            AlertState::Prealert => "PREALERT",
            AlertState::Alert => "ALERT",
            AlertState::PendingClear => "PENDING_CLEAR",
            AlertState::Clearing => "CLEARING",
        }
    }
}

impl FromStr for AlertState {
    type Err = AlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INACTIVE" => Ok(AlertState::Inactive),
            "DISARMED" => Ok(AlertState::Disarmed),
            "ARMING" => Ok(AlertState::Arming),
            "READY" => Ok(AlertState::Ready),
            "PREALERT" => Ok(AlertState::Prealert),
            "ALERT" => Ok(AlertState::Alert),
            "PENDING_CLEAR" => Ok(AlertState::PendingClear),
            "CLEARING" => Ok(AlertState::Clearing),
            other => Err(AlarmError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The alarms a hub evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmKind {
    Panic,
    Security,
    Smoke,
    Co,
    Water,
}

impl AlarmKind {
    /// Dispatch order. Security goes last so the safety alarms have settled
    /// before an arm request is evaluated.
    pub const ALL: [AlarmKind; 5] = [
        AlarmKind::Panic,
        AlarmKind::Smoke,
        AlarmKind::Co,
        AlarmKind::Water,
        AlarmKind::Security,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AlarmKind::Panic => "panic",
            AlarmKind::Security => "security",
            AlarmKind::Smoke => "smoke",
            AlarmKind::Co => "co",
            AlarmKind::Water => "water",
        }
    }

    /// Name as it appears in the active/available alert sets.
    pub fn alert_name(&self) -> &'static str {
        match self {
            AlarmKind::Panic => "PANIC",
            AlarmKind::Security => "SECURITY",
            AlarmKind::Smoke => "SMOKE",
            AlarmKind::Co => "CO",
            AlarmKind::Water => "WATER",
        }
    }

    /// Feedback precedence; lower wins the sounder and LED.
    pub fn priority(&self) -> u8 {
        match self {
            AlarmKind::Smoke => 1,
            AlarmKind::Co => 2,
            AlarmKind::Panic => 3,
            AlarmKind::Security => 4,
            AlarmKind::Water => 5,
        }
    }

    /// Look a kind up by name in either case.
    pub fn from_name(name: &str) -> Option<Self> {
        AlarmKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Security arm mode as reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityMode {
    Inactive,
    Disarmed,
    On,
    Partial,
}

impl SecurityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityMode::Inactive => "INACTIVE",
            SecurityMode::Disarmed => "DISARMED",
            SecurityMode::On => "ON",
            SecurityMode::Partial => "PARTIAL",
        }
    }

    /// Arm mode for keypad notices; anything but PARTIAL reads as ON.
    pub fn arm_mode(&self) -> ArmMode {
        match self {
            SecurityMode::Partial => ArmMode::Partial,
            _ => ArmMode::On,
        }
    }
}

impl From<ArmMode> for SecurityMode {
    fn from(mode: ArmMode) -> Self {
        match mode {
            ArmMode::On => SecurityMode::On,
            ArmMode::Partial => SecurityMode::Partial,
        }
    }
}

impl FromStr for SecurityMode {
    type Err = AlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INACTIVE" => Ok(SecurityMode::Inactive),
            "DISARMED" => Ok(SecurityMode::Disarmed),
            "ON" => Ok(SecurityMode::On),
            "PARTIAL" => Ok(SecurityMode::Partial),
            other => Err(AlarmError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something a machine wants the controller to announce once the dispatch
/// has settled and the hub-wide state is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Arming {
        mode: ArmMode,
        exit_delay_secs: u32,
        silent: bool,
        sounds_enabled: bool,
    },
    Armed {
        mode: ArmMode,
        sounds_enabled: bool,
    },
    ArmFailed,
    Prealert {
        mode: SecurityMode,
        entrance_delay_secs: u32,
        sounds_enabled: bool,
    },
    Alert(AlarmKind),
}

/// A delayed callback, identified by the generation token it was minted with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerFire {
    ExitDelay(Uuid),
    EntranceDelay(Uuid),
    MotionIdle(Uuid),
}

/// Request to deliver `fire` back to the controller after `delay`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerRequest {
    pub delay: Duration,
    pub fire: TimerFire,
}

/// Everything a machine may read or emit while handling one event.
pub struct AlarmContext<'a> {
    pub devices: &'a [Device],
    pub feedback: &'a dyn Feedback,
    pub now: DateTime<Utc>,
    /// Play per-transition voice cues on the hub sounder.
    pub voice_cues: bool,
    pub timers: Vec<TimerRequest>,
    pub notices: Vec<Notice>,
}

impl<'a> AlarmContext<'a> {
    pub fn new(devices: &'a [Device], feedback: &'a dyn Feedback, now: DateTime<Utc>, voice_cues: bool) -> Self {
        Self {
            devices,
            feedback,
            now,
            voice_cues,
            timers: Vec::new(),
            notices: Vec::new(),
        }
    }

    pub fn schedule(&mut self, delay: Duration, fire: TimerFire) {
        self.timers.push(TimerRequest { delay, fire });
    }

    pub fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_state_round_trip_and_unknown() {
        for state in [
            AlertState::Inactive,
            AlertState::PendingClear,
            AlertState::Clearing,
        ] {
            assert_eq!(state.as_str().parse::<AlertState>().unwrap(), state);
        }
        assert_eq!(
            "SLEEPING".parse::<AlertState>(),
            Err(AlarmError::UnknownState("SLEEPING".to_string()))
        );
    }

    #[test]
    fn test_state_priorities_are_ordered() {
        assert!(AlertState::Alert.priority() > AlertState::Prealert.priority());
        assert!(AlertState::Clearing.priority() > AlertState::PendingClear.priority());
        assert_eq!(AlertState::Inactive.priority(), 0);
    }

    #[test]
    fn test_kind_lookup() {
        assert_eq!(AlarmKind::from_name("SMOKE"), Some(AlarmKind::Smoke));
        assert_eq!(AlarmKind::from_name("co"), Some(AlarmKind::Co));
        assert_eq!(AlarmKind::from_name("weather"), None);
        assert_eq!(AlarmKind::ALL[4], AlarmKind::Security);
        assert!(AlarmKind::Smoke.priority() < AlarmKind::Panic.priority());
    }

    #[test]
    fn test_security_mode_parse() {
        assert_eq!("PARTIAL".parse::<SecurityMode>().unwrap(), SecurityMode::Partial);
        assert!("AWAY".parse::<SecurityMode>().unwrap_err().is_fatal());
        assert_eq!(SecurityMode::from(ArmMode::On), SecurityMode::On);
    }
}
