// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! LED table

use serde::{Deserialize, Serialize};

use super::LedState;
use crate::alarm::AlarmKind;

/// LED pattern plus how long to show it (`None` = until replaced)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedCue {
    pub state: LedState,
    pub duration_secs: Option<u32>,
}

/// LED cue for an alerting alarm.
///
/// On battery the pattern only runs for `battery_secs` to save power.
pub fn led_for(kind: AlarmKind, battery_powered: bool, battery_secs: u32) -> LedCue {
    let state = match kind {
        AlarmKind::Panic => LedState::AlarmTriggeredPanic,
        AlarmKind::Security => LedState::AlarmTriggeredIntruder,
        AlarmKind::Smoke => LedState::AlarmTriggeredSmoke,
        AlarmKind::Co => LedState::AlarmTriggeredCo,
        AlarmKind::Water => LedState::AlarmTriggeredWater,
    };

    LedCue {
        state,
        duration_secs: battery_powered.then_some(battery_secs),
    }
}
