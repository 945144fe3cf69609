// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Sounder tables

use super::SounderMode;
use crate::alarm::{AlarmKind, AlertState};

/// Sound played when an alarm of this kind goes off locally.
pub fn sound_triggered(kind: AlarmKind) -> SounderMode {
    match kind {
        AlarmKind::Panic => SounderMode::PanicAlarm,
        AlarmKind::Security => SounderMode::SecurityAlarmTriggered,
        AlarmKind::Smoke => SounderMode::SmokeAlarmTriggered,
        AlarmKind::Co => SounderMode::CoTriggered,
        AlarmKind::Water => SounderMode::WaterLeakDetected,
    }
}

/// Sound played when the alarm went off and monitoring has been notified.
pub fn sound_monitored(kind: AlarmKind) -> SounderMode {
    match kind {
        AlarmKind::Panic => SounderMode::PanicTriggeredMonitoringNotified,
        AlarmKind::Security => SounderMode::SecurityTriggeredMonitoringNotified,
        AlarmKind::Smoke => SounderMode::SmokeTriggeredMonitoringNotified,
        AlarmKind::Co => SounderMode::CoTriggeredMonitoringNotified,
        AlarmKind::Water => SounderMode::WaterLeakAlarm,
    }
}

/// Sound played when an alert of this kind is cancelled.
pub fn sound_cleared(kind: AlarmKind) -> SounderMode {
    match kind {
        AlarmKind::Panic => SounderMode::PanicAlarmCancelled,
        AlarmKind::Security => SounderMode::SecurityAlarmOff,
        AlarmKind::Smoke => SounderMode::SmokeAlarmCancelled,
        AlarmKind::Co => SounderMode::CoAlarmCancelled,
        AlarmKind::Water => SounderMode::WaterLeakAlarmCancelled,
    }
}

/// Voice cue for a state transition, if there is one.
///
/// `partial` only matters for security arming cues.
pub fn sound_for_transition(
    kind: AlarmKind,
    from: AlertState,
    to: AlertState,
    partial: bool,
) -> Option<SounderMode> {
    use AlertState::*;

    if from == to {
        return None;
    }

    match (kind, from, to) {
        (AlarmKind::Security, _, Arming) if partial => Some(SounderMode::ArmingGraceExitPartial),
        (AlarmKind::Security, _, Arming) => Some(SounderMode::ArmingGraceExit),
        (AlarmKind::Security, Arming, Ready) if partial => Some(SounderMode::SecurityAlarmPartial),
        (AlarmKind::Security, Arming, Ready) => Some(SounderMode::SecurityAlarmOn),
        (AlarmKind::Security, _, Prealert) => Some(SounderMode::ArmingGraceEnter),
        (AlarmKind::Security, Inactive, Disarmed) => None,
        (AlarmKind::Security, _, Disarmed) => Some(SounderMode::SecurityAlarmOff),
        (kind, _, Alert) => Some(sound_triggered(kind)),
        (kind, Alert, PendingClear) if kind != AlarmKind::Security => Some(sound_cleared(kind)),
        _ => None,
    }
}
