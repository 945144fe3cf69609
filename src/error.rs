// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Error types for the alarm engine

use thiserror::Error;

use crate::devices::Address;

pub type Result<T> = std::result::Result<T, AlarmError>;

/// Every way a request to the alarm engine can be refused.
///
/// Rejections detected while asking the alarms whether they accept an event
/// never mutate state. Arm-time rejections roll back their speculative writes
/// before the error is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlarmError {
    /// One or more alarms refused the event in their current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Security refused an arm or disarm request.
    #[error("invalid security state: {0}")]
    InvalidSecurityState(String),

    /// The hub alarm is suspended and only accepts activate/suspend.
    #[error("hub local alarms are currently suspended")]
    Suspended,

    /// Not enough participating devices are online and clear to arm.
    #[error("there are less than {required} devices online and clear")]
    InsufficientDevices { required: u32 },

    /// Arming without bypass while participating devices are open or offline.
    #[error("triggered or offline devices: {}", join_addresses(.0))]
    TriggeredOrOfflineDevices(Vec<Address>),

    /// A persisted alert state that does not name a known state.
    #[error("unknown alert state '{0}'")]
    UnknownState(String),

    /// A persisted or requested mode that does not name a known mode.
    #[error("unknown mode '{0}'")]
    UnknownMode(String),

    #[error("unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("attribute store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The engine task has shut down and no longer answers.
    #[error("alarm engine is not running")]
    EngineStopped,
}

impl AlarmError {
    /// Stable error code reported back to the requester.
    pub fn code(&self) -> &'static str {
        match self {
            AlarmError::InvalidState(_) => "alarm.invalidState",
            AlarmError::InvalidSecurityState(_) => "security.invalidState",
            AlarmError::Suspended => "alarm.invalidState",
            AlarmError::InsufficientDevices { .. } => "security.insufficientDevices",
            AlarmError::TriggeredOrOfflineDevices(_) => "security.triggeredDevices",
            AlarmError::UnknownState(_) => "alarm.unknownState",
            AlarmError::UnknownMode(_) => "error.invalid.param",
            AlarmError::UnsupportedMessageType(_) => "UnsupportedMessageType",
            AlarmError::Store(_) => "alarm.store",
            AlarmError::Config(_) => "alarm.config",
            AlarmError::EngineStopped => "alarm.engineStopped",
        }
    }

    /// True for invariant violations that must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AlarmError::UnknownState(_) | AlarmError::UnknownMode(_))
    }
}

impl From<rusqlite::Error> for AlarmError {
    fn from(e: rusqlite::Error) -> Self {
        AlarmError::Store(e.to_string())
    }
}

impl From<serde_json::Error> for AlarmError {
    fn from(e: serde_json::Error) -> Self {
        AlarmError::Store(e.to_string())
    }
}

fn join_addresses(addrs: &[Address]) -> String {
    addrs
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AlarmError::Suspended.code(), "alarm.invalidState");
        assert_eq!(
            AlarmError::InsufficientDevices { required: 2 }.code(),
            "security.insufficientDevices"
        );
        assert!(AlarmError::UnknownState("BOGUS".into()).is_fatal());
        assert!(!AlarmError::InvalidState("cannot panic".into()).is_fatal());
        assert_eq!(
            AlarmError::InvalidSecurityState("cannot arm".into()).code(),
            "security.invalidState"
        );
    }

    #[test]
    fn test_triggered_devices_message_lists_addresses() {
        let err = AlarmError::TriggeredOrOfflineDevices(vec![
            Address::from("DRIV:dev:door"),
            Address::from("DRIV:dev:hall"),
        ]);
        assert_eq!(
            err.to_string(),
            "triggered or offline devices: DRIV:dev:door,DRIV:dev:hall"
        );
    }
}
