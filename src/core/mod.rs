// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Core engine module - the controller that arbitrates between alarms and the
//! async runtime that serialises all work onto it

mod controller;
mod engine;
mod event_bus;
mod scheduler;

pub use controller::{Controller, CurrentIncident};
pub use engine::{AlarmEngine, EngineHandle};
pub use event_bus::EventBus;
pub use scheduler::Scheduler;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AlarmError;

/// Whether the hub alarm is processing anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivationState {
    Active,
    Suspended,
}

impl ActivationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationState::Active => "ACTIVE",
            ActivationState::Suspended => "SUSPENDED",
        }
    }
}

impl FromStr for ActivationState {
    type Err = AlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(ActivationState::Active),
            "SUSPENDED" => Ok(ActivationState::Suspended),
            other => Err(AlarmError::UnknownState(other.to_string())),
        }
    }
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hub-wide alarm state, folded from every kind's alert state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateAlarmState {
    Inactive,
    Ready,
    Clearing,
    Prealert,
    Alerting,
}

impl AggregateAlarmState {
    /// Map the highest alert-state priority onto the hub state.
    pub fn from_priority(priority: u8) -> Self {
        match priority {
            0 => AggregateAlarmState::Inactive,
            1..=3 => AggregateAlarmState::Ready,
            4 | 5 => AggregateAlarmState::Clearing,
            6 => AggregateAlarmState::Prealert,
            _ => AggregateAlarmState::Alerting,
        }
    }

    /// States during which an incident is open.
    pub fn is_alerting(&self) -> bool {
        matches!(self, AggregateAlarmState::Prealert | AggregateAlarmState::Alerting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlertState;

    #[test]
    fn test_priority_table() {
        assert_eq!(
            AggregateAlarmState::from_priority(AlertState::Inactive.priority()),
            AggregateAlarmState::Inactive
        );
        assert_eq!(
            AggregateAlarmState::from_priority(AlertState::Disarmed.priority()),
            AggregateAlarmState::Ready
        );
        assert_eq!(
            AggregateAlarmState::from_priority(AlertState::Arming.priority()),
            AggregateAlarmState::Ready
        );
        assert_eq!(
            AggregateAlarmState::from_priority(AlertState::PendingClear.priority()),
            AggregateAlarmState::Clearing
        );
        assert_eq!(
            AggregateAlarmState::from_priority(AlertState::Prealert.priority()),
            AggregateAlarmState::Prealert
        );
        assert_eq!(
            AggregateAlarmState::from_priority(AlertState::Alert.priority()),
            AggregateAlarmState::Alerting
        );
    }

    #[test]
    fn test_activation_parse() {
        assert_eq!("ACTIVE".parse::<ActivationState>().unwrap(), ActivationState::Active);
        assert!("PAUSED".parse::<ActivationState>().unwrap_err().is_fatal());
    }
}
