// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Panic, smoke, CO and water alarms
//!
//! These never arm. They sit in Ready while they have devices, go to Alert
//! as soon as something triggers and return to Ready through PendingClear
//! and Clearing once the alert is disarmed and cleared.

use super::events::{AlarmEvent, Trigger};
use super::machine::{default_can_handle, AlarmMachine};
use super::{AlarmContext, AlarmKind, AlertState};
use crate::devices::{attrs, Capability, Device};

pub(super) fn is_supported(kind: AlarmKind, device: &Device) -> bool {
    match kind {
        AlarmKind::Panic => device.has(Capability::KeyPad),
        AlarmKind::Smoke => device.has(Capability::Smoke),
        AlarmKind::Co => device.has(Capability::CarbonMonoxide),
        AlarmKind::Water => device.has(Capability::LeakH2O),
        AlarmKind::Security => false,
    }
}

/// Panic has no device-level triggered state; it is raised by events only.
pub(super) fn is_triggered(kind: AlarmKind, device: &Device) -> bool {
    match kind {
        AlarmKind::Smoke => device.attribute_is(attrs::SMOKE, attrs::SMOKE_DETECTED),
        AlarmKind::Co => device.attribute_is(attrs::CO, attrs::CO_DETECTED),
        AlarmKind::Water => device.attribute_is(attrs::LEAK, attrs::LEAK_DETECTED),
        AlarmKind::Panic | AlarmKind::Security => false,
    }
}

pub(super) fn is_interesting(kind: AlarmKind, trigger: Trigger) -> bool {
    matches!(
        (kind, trigger),
        (AlarmKind::Panic, Trigger::Panic)
            | (AlarmKind::Smoke, Trigger::Smoke)
            | (AlarmKind::Co, Trigger::Co)
            | (AlarmKind::Water, Trigger::Water)
    )
}

pub(super) fn can_handle(state: AlertState, event: &AlarmEvent) -> bool {
    match state {
        AlertState::Clearing => matches!(
            event,
            AlarmEvent::Clear { .. } | AlarmEvent::Trigger(_) | AlarmEvent::Arm(_) | AlarmEvent::Disarm { .. }
        ),
        state => default_can_handle(state, event),
    }
}

pub(super) fn after_process_devices(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>) {
    if !matches!(
        machine.state,
        AlertState::Inactive | AlertState::Disarmed | AlertState::Ready
    ) {
        return;
    }

    let target = if !machine.triggered_devices(ctx.devices).is_empty() {
        AlertState::Alert
    } else if machine.kind != AlarmKind::Panic && machine.supported_devices(ctx.devices).is_empty() {
        AlertState::Inactive
    } else {
        AlertState::Ready
    };

    if target != machine.state {
        machine.transition_to(ctx, target);
    }
}

pub(super) fn handle(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>, event: &AlarmEvent) {
    match (machine.state, event) {
        (AlertState::Ready, AlarmEvent::Trigger(t)) => {
            if t.triggered || !machine.triggered_devices(ctx.devices).is_empty() {
                machine.transition_to(ctx, AlertState::Alert);
            }
        }
        (AlertState::Alert, AlarmEvent::Disarm { .. }) => {
            machine.transition_to(ctx, AlertState::PendingClear);
        }
        (AlertState::PendingClear, AlarmEvent::Clear { .. }) => {
            machine.transition_to(ctx, AlertState::Clearing);
        }
        (AlertState::PendingClear | AlertState::Clearing, AlarmEvent::Trigger(t)) if t.triggered => {
            machine.transition_to(ctx, AlertState::Alert);
        }
        (AlertState::Clearing, AlarmEvent::Clear { .. }) => {
            if machine.triggered_devices(ctx.devices).is_empty() {
                machine.transition_to(ctx, AlertState::Ready);
            }
        }
        _ => {}
    }
}

pub(super) fn enter_state(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>, state: AlertState) {
    if state == AlertState::Clearing && machine.triggered_devices(ctx.devices).is_empty() {
        machine.transition_to(ctx, AlertState::Ready);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::Address;
    use crate::feedback::RecordingFeedback;
    use chrono::Utc;

    fn keypad() -> Device {
        Device::new("DRIV:dev:keypad", &[Capability::KeyPad])
    }

    #[test]
    fn test_panic_is_available_without_keypads() {
        let feedback = RecordingFeedback::new();
        let mut ctx = AlarmContext::new(&[], &feedback, Utc::now(), false);

        let mut panic = AlarmMachine::new(AlarmKind::Panic);
        panic.after_process_devices(&mut ctx);
        assert_eq!(panic.state(), AlertState::Ready);

        let mut water = AlarmMachine::new(AlarmKind::Water);
        water.after_process_devices(&mut ctx);
        assert_eq!(water.state(), AlertState::Inactive);
    }

    #[test]
    fn test_panic_full_cycle_chains_through_clearing() {
        let devices = vec![keypad()];
        let feedback = RecordingFeedback::new();
        let mut ctx = AlarmContext::new(&devices, &feedback, Utc::now(), false);

        let mut panic = AlarmMachine::new(AlarmKind::Panic);
        panic.after_process_devices(&mut ctx);

        let press = AlarmEvent::trigger(Address::from("PROT:ZIGB:kp"), None, Trigger::Panic, true);
        panic.handle(&mut ctx, &press).unwrap();
        assert_eq!(panic.state(), AlertState::Alert);

        panic.handle(&mut ctx, &AlarmEvent::disarm(Address::broadcast(), None)).unwrap();
        assert_eq!(panic.state(), AlertState::PendingClear);

        // Clearing is entered and left within the one call.
        panic.handle(&mut ctx, &AlarmEvent::clear(Address::broadcast(), None)).unwrap();
        assert_eq!(panic.state(), AlertState::Ready);
    }

    #[test]
    fn test_clearing_holds_while_device_still_triggered() {
        let devices = vec![Device::new("DRIV:dev:leak", &[Capability::LeakH2O])
            .with_attribute(attrs::LEAK, attrs::LEAK_DETECTED)];
        let feedback = RecordingFeedback::new();
        let mut ctx = AlarmContext::new(&devices, &feedback, Utc::now(), false);

        let mut water = AlarmMachine::new(AlarmKind::Water);
        water.after_process_devices(&mut ctx);
        assert_eq!(water.state(), AlertState::Alert);

        water.handle(&mut ctx, &AlarmEvent::disarm(Address::broadcast(), None)).unwrap();
        water.handle(&mut ctx, &AlarmEvent::clear(Address::broadcast(), None)).unwrap();
        assert_eq!(water.state(), AlertState::Clearing);

        let again = AlarmEvent::trigger(Address::from("DRIV:dev:leak"), None, Trigger::Water, true);
        water.handle(&mut ctx, &again).unwrap();
        assert_eq!(water.state(), AlertState::Alert);
    }

    #[test]
    fn test_pending_clear_bounces_back_on_trigger() {
        let devices = vec![Device::new("DRIV:dev:co", &[Capability::CarbonMonoxide])];
        let feedback = RecordingFeedback::new();
        let mut ctx = AlarmContext::new(&devices, &feedback, Utc::now(), false);

        let mut co = AlarmMachine::new(AlarmKind::Co);
        co.after_process_devices(&mut ctx);
        let detected = AlarmEvent::trigger(Address::from("DRIV:dev:co"), None, Trigger::Co, true);
        co.handle(&mut ctx, &detected).unwrap();
        co.handle(&mut ctx, &AlarmEvent::disarm(Address::broadcast(), None)).unwrap();
        assert_eq!(co.state(), AlertState::PendingClear);

        co.handle(&mut ctx, &detected).unwrap();
        assert_eq!(co.state(), AlertState::Alert);
        assert_eq!(co.triggers().len(), 2);
    }

    #[test]
    fn test_clearing_acceptance() {
        assert!(can_handle(
            AlertState::Clearing,
            &AlarmEvent::clear(Address::broadcast(), None)
        ));
        assert!(!can_handle(
            AlertState::Clearing,
            &AlarmEvent::activate(Address::broadcast(), None)
        ));
    }
}
