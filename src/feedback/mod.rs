// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Hardware feedback seam - the one sounder, the one LED and the keypads

mod lights;
mod sounds;

pub use lights::{led_for, LedCue};
pub use sounds::{sound_cleared, sound_monitored, sound_triggered, sound_for_transition};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alarm::{ArmMode, SecurityMode};
use crate::core::AggregateAlarmState;

/// Sounds the hub sounder knows how to play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SounderMode {
    NoSound,
    ArmingGraceExit,
    ArmingGraceExitPartial,
    ArmingGraceEnter,
    SecurityAlarmOn,
    SecurityAlarmPartial,
    SecurityAlarmOff,
    SecurityAlarmFailed,
    SecurityAlarmTriggered,
    SecurityTriggeredMonitoringNotified,
    PanicAlarm,
    PanicTriggeredMonitoringNotified,
    PanicAlarmCancelled,
    SmokeAlarmTriggered,
    SmokeTriggeredMonitoringNotified,
    SmokeAlarmCancelled,
    CoTriggered,
    CoTriggeredMonitoringNotified,
    CoAlarmCancelled,
    WaterLeakDetected,
    WaterLeakAlarm,
    WaterLeakAlarmCancelled,
}

/// Patterns the hub status LED knows how to show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedState {
    AllOff,
    AlarmOff,
    AlarmOn,
    AlarmGraceExit,
    AlarmGraceEnter,
    AlarmFailure,
    AlarmTriggeredIntruder,
    AlarmTriggeredPanic,
    AlarmTriggeredSmoke,
    AlarmTriggeredCo,
    AlarmTriggeredWater,
}

/// Alarm mode a keypad shows while alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeypadAlarmMode {
    /// Security alerts report the mode security was armed in.
    Security(SecurityMode),
    /// Every other alarm reports as a panic.
    Panic,
}

/// Notifications for keypads and other local annunciators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeypadNotice {
    Arming {
        mode: ArmMode,
        exit_delay_secs: u32,
        silent: bool,
        sounds_enabled: bool,
        alarm_state: AggregateAlarmState,
    },
    Armed {
        mode: ArmMode,
        sounds_enabled: bool,
        alarm_state: AggregateAlarmState,
    },
    ArmFailed {
        alarm_state: AggregateAlarmState,
    },
    Prealert {
        mode: SecurityMode,
        entrance_delay_secs: u32,
        sounds_enabled: bool,
        alarm_state: AggregateAlarmState,
    },
    Alerting {
        sound: SounderMode,
        keypad_mode: KeypadAlarmMode,
        led: LedState,
        led_duration_secs: Option<u32>,
    },
    Disarmed,
    DisarmFailed,
}

/// Drives local sound, light and keypad output.
///
/// Every call is fire-and-forget from the engine's point of view and must
/// not block the work queue.
pub trait Feedback: Send + Sync {
    /// Play a sound, optionally for a bounded number of seconds.
    fn set_sounder(&self, mode: SounderMode, duration_secs: Option<u32>);

    /// Show an LED pattern, optionally for a bounded number of seconds.
    fn set_led(&self, state: LedState, duration_secs: Option<u32>);

    /// Whether the hub is currently running on battery.
    fn is_battery_powered(&self) -> bool;

    /// Forward a notice to keypads.
    fn keypad(&self, notice: KeypadNotice);
}

/// Feedback that only logs. Used when no hardware layer is attached.
#[derive(Debug, Default)]
pub struct TracingFeedback;

impl Feedback for TracingFeedback {
    fn set_sounder(&self, mode: SounderMode, duration_secs: Option<u32>) {
        info!("sounder -> {:?} ({:?}s)", mode, duration_secs);
    }

    fn set_led(&self, state: LedState, duration_secs: Option<u32>) {
        info!("led -> {:?} ({:?}s)", state, duration_secs);
    }

    fn is_battery_powered(&self) -> bool {
        false
    }

    fn keypad(&self, notice: KeypadNotice) {
        debug!("keypad notice: {:?}", notice);
    }
}

/// One recorded feedback call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackCall {
    Sounder(SounderMode, Option<u32>),
    Led(LedState, Option<u32>),
    Keypad(KeypadNotice),
}

/// Feedback that records every call, for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct RecordingFeedback {
    calls: Mutex<Vec<FeedbackCall>>,
    battery_powered: Mutex<bool>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_battery_powered(&self, on_battery: bool) {
        *self.battery_powered.lock() = on_battery;
    }

    pub fn calls(&self) -> Vec<FeedbackCall> {
        self.calls.lock().clone()
    }

    /// Drain the recorded calls.
    pub fn take(&self) -> Vec<FeedbackCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    pub fn keypad_notices(&self) -> Vec<KeypadNotice> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                FeedbackCall::Keypad(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn sounds(&self) -> Vec<SounderMode> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                FeedbackCall::Sounder(m, _) => Some(*m),
                _ => None,
            })
            .collect()
    }

    pub fn leds(&self) -> Vec<LedState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                FeedbackCall::Led(s, _) => Some(*s),
                _ => None,
            })
            .collect()
    }
}

impl Feedback for RecordingFeedback {
    fn set_sounder(&self, mode: SounderMode, duration_secs: Option<u32>) {
        self.calls.lock().push(FeedbackCall::Sounder(mode, duration_secs));
    }

    fn set_led(&self, state: LedState, duration_secs: Option<u32>) {
        self.calls.lock().push(FeedbackCall::Led(state, duration_secs));
    }

    fn is_battery_powered(&self) -> bool {
        *self.battery_powered.lock()
    }

    fn keypad(&self, notice: KeypadNotice) {
        self.calls.lock().push(FeedbackCall::Keypad(notice));
    }
}
