// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Security alarm
//!
//! Arming runs an exit delay, a trip in Ready runs an entrance delay, and
//! motion only counts once enough distinct sensors agree. Both delays are
//! tagged with a generation token minted on state entry; a fire carrying an
//! older token is ignored.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::events::{AlarmEvent, ArmEvent, Trigger, TriggerEvent};
use super::incident::IncidentEvent;
use super::machine::{default_can_handle, AlarmMachine};
use super::{AlarmContext, AlertState, Notice, SecurityMode, TimerFire};
use crate::db::{load_value, persist_value, AttributeStore};
use crate::devices::{attrs, Address, Capability, Device};
use crate::error::{AlarmError, Result};

/// How long motion must stay quiet in Ready before motion triggers are forgotten.
pub const MOTION_IDLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const DEFAULT_DELAY_SECS: u32 = 30;

const KEY_MODE: &str = "hubalarm:securityMode";
const KEY_ARM_TIME: &str = "hubalarm:securityArmTime";
const KEY_LAST_ARMED_TIME: &str = "hubalarm:lastArmedTime";
const KEY_LAST_ARMED_BY: &str = "hubalarm:lastArmedBy";
const KEY_LAST_ARMED_FROM: &str = "hubalarm:lastArmedFrom";
const KEY_LAST_DISARMED_TIME: &str = "hubalarm:lastDisarmedTime";
const KEY_LAST_DISARMED_BY: &str = "hubalarm:lastDisarmedBy";
const KEY_LAST_DISARMED_FROM: &str = "hubalarm:lastDisarmedFrom";
const KEY_CURRENT_ACTIVE: &str = "hubalarm:securityCurrentActive";
const KEY_EXCLUDED: &str = "hubalarm:securityExcludedDevices";
const KEY_ENTRANCE_DELAY: &str = "hubalarm:securityEntranceDelay";
const KEY_SENSITIVITY: &str = "hubalarm:securitySensitivity";
const KEY_PREALERT_END: &str = "hubalarm:securityPrealertEndTime";

/// Fields only the security alarm carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityExt {
    pub mode: SecurityMode,
    pub arm_time: Option<DateTime<Utc>>,
    pub last_armed_time: Option<DateTime<Utc>>,
    pub last_armed_by: Option<Address>,
    pub last_armed_from: Option<Address>,
    pub last_disarmed_time: Option<DateTime<Utc>>,
    pub last_disarmed_by: Option<Address>,
    pub last_disarmed_from: Option<Address>,
    /// Devices the current arm cycle asked for.
    pub current_active: BTreeSet<Address>,
    /// Devices bypassed at arm time or tripped during the exit delay.
    pub excluded: BTreeSet<Address>,
    pub entrance_delay_secs: u32,
    pub exit_delay_secs: u32,
    pub sensitivity: u32,
    pub prealert_end: Option<DateTime<Utc>>,
    pub sounds_enabled: bool,

    pending_armed_by: Option<Address>,
    pending_armed_from: Option<Address>,
    pub(super) arm_generation: Option<Uuid>,
    pub(super) entry_generation: Option<Uuid>,
    pub(super) idle_generation: Option<Uuid>,
}

impl Default for SecurityExt {
    fn default() -> Self {
        Self {
            mode: SecurityMode::Inactive,
            arm_time: None,
            last_armed_time: None,
            last_armed_by: None,
            last_armed_from: None,
            last_disarmed_time: None,
            last_disarmed_by: None,
            last_disarmed_from: None,
            current_active: BTreeSet::new(),
            excluded: BTreeSet::new(),
            entrance_delay_secs: DEFAULT_DELAY_SECS,
            exit_delay_secs: DEFAULT_DELAY_SECS,
            sensitivity: 1,
            prealert_end: None,
            sounds_enabled: true,
            pending_armed_by: None,
            pending_armed_from: None,
            arm_generation: None,
            entry_generation: None,
            idle_generation: None,
        }
    }
}

impl SecurityExt {
    pub(super) fn restore(store: &dyn AttributeStore) -> Result<Self> {
        let mut ext = Self::default();
        if let Some(mode) = load_value::<String>(store, KEY_MODE)? {
            ext.mode = mode.parse()?;
        }
        ext.arm_time = load_value::<Option<DateTime<Utc>>>(store, KEY_ARM_TIME)?.flatten();
        ext.last_armed_time = load_value::<Option<DateTime<Utc>>>(store, KEY_LAST_ARMED_TIME)?.flatten();
        ext.last_armed_by = load_value::<Option<Address>>(store, KEY_LAST_ARMED_BY)?.flatten();
        ext.last_armed_from = load_value::<Option<Address>>(store, KEY_LAST_ARMED_FROM)?.flatten();
        ext.last_disarmed_time = load_value::<Option<DateTime<Utc>>>(store, KEY_LAST_DISARMED_TIME)?.flatten();
        ext.last_disarmed_by = load_value::<Option<Address>>(store, KEY_LAST_DISARMED_BY)?.flatten();
        ext.last_disarmed_from = load_value::<Option<Address>>(store, KEY_LAST_DISARMED_FROM)?.flatten();
        ext.current_active = load_value::<BTreeSet<Address>>(store, KEY_CURRENT_ACTIVE)?.unwrap_or_default();
        ext.excluded = load_value::<BTreeSet<Address>>(store, KEY_EXCLUDED)?.unwrap_or_default();
        ext.entrance_delay_secs = load_value::<u32>(store, KEY_ENTRANCE_DELAY)?.unwrap_or(DEFAULT_DELAY_SECS);
        ext.sensitivity = load_value::<u32>(store, KEY_SENSITIVITY)?.unwrap_or(1);
        ext.prealert_end = load_value::<Option<DateTime<Utc>>>(store, KEY_PREALERT_END)?.flatten();
        Ok(ext)
    }

    pub(super) fn persist(&self, store: &dyn AttributeStore) -> Result<()> {
        persist_value(store, KEY_MODE, &self.mode.as_str())?;
        persist_value(store, KEY_ARM_TIME, &self.arm_time)?;
        persist_value(store, KEY_LAST_ARMED_TIME, &self.last_armed_time)?;
        persist_value(store, KEY_LAST_ARMED_BY, &self.last_armed_by)?;
        persist_value(store, KEY_LAST_ARMED_FROM, &self.last_armed_from)?;
        persist_value(store, KEY_LAST_DISARMED_TIME, &self.last_disarmed_time)?;
        persist_value(store, KEY_LAST_DISARMED_BY, &self.last_disarmed_by)?;
        persist_value(store, KEY_LAST_DISARMED_FROM, &self.last_disarmed_from)?;
        persist_value(store, KEY_CURRENT_ACTIVE, &self.current_active)?;
        persist_value(store, KEY_EXCLUDED, &self.excluded)?;
        persist_value(store, KEY_ENTRANCE_DELAY, &self.entrance_delay_secs)?;
        persist_value(store, KEY_SENSITIVITY, &self.sensitivity)?;
        persist_value(store, KEY_PREALERT_END, &self.prealert_end)?;
        Ok(())
    }
}

fn ext(machine: &mut AlarmMachine) -> &mut SecurityExt {
    machine.security.get_or_insert_with(SecurityExt::default)
}

pub(super) fn is_supported(device: &Device) -> bool {
    device.has(Capability::Contact)
        || device.has(Capability::Motion)
        || device.has(Capability::Glass)
        || device.has(Capability::MotorizedDoor)
}

pub(super) fn is_triggered(device: &Device) -> bool {
    device.attribute_is(attrs::CONTACT, attrs::CONTACT_OPENED)
        || device.attribute_is(attrs::MOTION, attrs::MOTION_DETECTED)
        || device.attribute_is(attrs::GLASS_BREAK, attrs::GLASS_DETECTED)
        || matches!(
            device.attribute(attrs::DOOR_STATE),
            Some(attrs::DOOR_OPEN) | Some(attrs::DOOR_OPENING) | Some(attrs::DOOR_OBSTRUCTION)
        )
}

pub(super) fn is_interesting(machine: &AlarmMachine, trigger: &TriggerEvent) -> bool {
    matches!(
        trigger.trigger,
        Trigger::Contact | Trigger::Motion | Trigger::Glass | Trigger::Door
    ) && machine
        .security
        .as_ref()
        .map(|ext| ext.current_active.contains(&trigger.source))
        .unwrap_or(false)
}

pub(super) fn can_handle(state: AlertState, event: &AlarmEvent) -> bool {
    match state {
        AlertState::Inactive | AlertState::Ready if event.is_arm() => false,
        AlertState::Clearing => event.is_disarm(),
        state => default_can_handle(state, event),
    }
}

pub(super) fn after_process_devices(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>) {
    if machine.supported_devices(ctx.devices).is_empty() {
        if machine.state != AlertState::Inactive {
            machine.transition_to(ctx, AlertState::Inactive);
        }
    } else if machine.state == AlertState::Inactive {
        machine.transition_to(ctx, AlertState::Disarmed);
    }
}

pub(super) fn handle(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>, event: &AlarmEvent) -> Result<()> {
    match machine.state {
        AlertState::Disarmed => {
            if let AlarmEvent::Arm(arm) = event {
                do_arm(machine, ctx, arm)?;
            }
        }
        AlertState::Arming => match event {
            AlarmEvent::Disarm { source, actor } => do_disarm(machine, ctx, source, actor.as_ref()),
            AlarmEvent::Trigger(t) if t.triggered => {
                if ext(machine).excluded.insert(t.source.clone()) {
                    debug!("excluding {} tripped during exit delay", t.source);
                    machine.dirty = true;
                }
            }
            AlarmEvent::Trigger(t) => clear_excluded(machine, &t.source),
            _ => {}
        },
        AlertState::Ready => handle_ready(machine, ctx, event),
        AlertState::Prealert | AlertState::Alert => match event {
            AlarmEvent::Disarm { source, actor } => do_disarm(machine, ctx, source, actor.as_ref()),
            AlarmEvent::Trigger(t) if !t.triggered => clear_excluded(machine, &t.source),
            _ => {}
        },
        AlertState::PendingClear => {
            if event.is_clear() {
                machine.clear_triggers();
                ext(machine).prealert_end = None;
                machine.transition_to(ctx, AlertState::Disarmed);
            }
        }
        AlertState::Clearing => {
            if let AlarmEvent::Disarm { source, actor } = event {
                do_disarm(machine, ctx, source, actor.as_ref());
            }
        }
        AlertState::Inactive => {}
    }
    Ok(())
}

fn handle_ready(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>, event: &AlarmEvent) {
    let trigger = match event {
        AlarmEvent::Disarm { source, actor } => {
            // motion below the sensitivity threshold may have left triggers behind
            machine.clear_triggers();
            do_disarm(machine, ctx, source, actor.as_ref());
            return;
        }
        AlarmEvent::Trigger(t) => t,
        _ => return,
    };

    if !trigger.triggered {
        if ext(machine).excluded.contains(&trigger.source) {
            clear_excluded(machine, &trigger.source);
        } else if is_motion_source(ctx, &trigger.source, trigger.trigger == Trigger::Motion)
            && all_motion_cleared(machine, ctx, &trigger.source)
        {
            start_idle_timer(machine, ctx);
        }
        return;
    }

    if ext(machine).excluded.contains(&trigger.source) {
        return;
    }

    if is_motion_source(ctx, &trigger.source, trigger.trigger == Trigger::Motion) {
        let sensitivity = ext(machine).sensitivity.max(1) as usize;
        let count = motion_sources(machine, ctx, None).len();
        if count < sensitivity {
            debug!("motion from {} of {} sensors, waiting for more", count, sensitivity);
            return;
        }
    }
    machine.transition_to(ctx, AlertState::Prealert);
}

/// Whether `source` is a motion sensor. Known devices decide by capability,
/// unknown ones fall back to `tagged_motion`.
fn is_motion_source(ctx: &AlarmContext<'_>, source: &Address, tagged_motion: bool) -> bool {
    ctx.devices
        .iter()
        .find(|d| &d.address == source)
        .map(|d| d.has(Capability::Motion))
        .unwrap_or(tagged_motion)
}

/// Distinct recorded trigger sources that are motion sensors, minus `skip`.
fn motion_sources<'a>(
    machine: &'a AlarmMachine,
    ctx: &AlarmContext<'_>,
    skip: Option<&Address>,
) -> BTreeSet<&'a Address> {
    machine
        .triggers
        .iter()
        .filter(|t| Some(&t.source) != skip)
        .filter(|t| is_motion_source(ctx, &t.source, t.event == IncidentEvent::Motion))
        .map(|t| &t.source)
        .collect()
}

/// True when no recorded motion source other than `clearing` still reports motion.
fn all_motion_cleared(machine: &AlarmMachine, ctx: &AlarmContext<'_>, clearing: &Address) -> bool {
    let sources = motion_sources(machine, ctx, Some(clearing));

    !ctx.devices.iter().any(|d| {
        sources.contains(&d.address)
            && !d.is_offline()
            && d.attribute_is(attrs::MOTION, attrs::MOTION_DETECTED)
    })
}

fn start_idle_timer(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>) {
    let generation = Uuid::new_v4();
    ext(machine).idle_generation = Some(generation);
    ctx.schedule(MOTION_IDLE_TIMEOUT, TimerFire::MotionIdle(generation));
}

fn clear_excluded(machine: &mut AlarmMachine, address: &Address) {
    if ext(machine).excluded.remove(address) {
        debug!("{} cleared, no longer excluded", address);
        machine.dirty = true;
    }
}

fn do_arm(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>, arm: &ArmEvent) -> Result<()> {
    let previous = std::mem::replace(&mut ext(machine).current_active, arm.active_devices.clone());

    let triggered = machine.triggered_devices(ctx.devices);
    let offline = machine.offline_devices(ctx.devices);
    if !arm.bypass && (!triggered.is_empty() || !offline.is_empty()) {
        ext(machine).current_active = previous;
        let blocking = triggered.union(&offline).cloned().collect();
        return Err(AlarmError::TriggeredOrOfflineDevices(blocking));
    }

    let ready = machine.active_devices(ctx.devices);
    // motion alone never arms the system
    let has_non_motion = ctx
        .devices
        .iter()
        .any(|d| ready.contains(&d.address) && !d.has(Capability::Motion));
    if !has_non_motion || (ready.len() as u32) < arm.sensitivity_device_count {
        ext(machine).current_active = previous;
        ctx.notify(Notice::ArmFailed);
        return Err(AlarmError::InsufficientDevices {
            required: arm.sensitivity_device_count.max(1),
        });
    }

    {
        let ext = ext(machine);
        ext.mode = arm.mode.into();
        if arm.bypass {
            ext.excluded = triggered.union(&offline).cloned().collect();
        }
        ext.pending_armed_from = Some(arm.source.clone());
        ext.pending_armed_by = arm.actor.clone();
        ext.exit_delay_secs = arm.exit_delay_secs;
        ext.entrance_delay_secs = arm.entrance_delay_secs;
        ext.sensitivity = arm.sensitivity_device_count.max(1);
        ext.sounds_enabled = arm.sounds_enabled;
    }
    machine.silent = arm.silent;
    machine.dirty = true;

    info!("arming security {} with {} devices", arm.mode, ready.len());
    machine.transition_to(ctx, AlertState::Arming);
    Ok(())
}

fn do_disarm(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>, source: &Address, actor: Option<&Address>) {
    {
        let ext = ext(machine);
        ext.last_disarmed_from = Some(source.clone());
        ext.last_disarmed_by = actor.cloned();
        ext.last_disarmed_time = Some(ctx.now);
        ext.excluded.clear();
    }
    machine.dirty = true;

    let next = if machine.triggers.is_empty() {
        AlertState::Disarmed
    } else {
        AlertState::PendingClear
    };
    machine.transition_to(ctx, next);
}

pub(super) fn enter_state(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>, state: AlertState) {
    match state {
        AlertState::Disarmed => {
            let ext = ext(machine);
            ext.mode = SecurityMode::Disarmed;
            ext.prealert_end = None;
            ext.current_active.clear();
            ext.excluded.clear();
            machine.clear_triggers();
        }
        AlertState::Arming => {
            let generation = Uuid::new_v4();
            let silent = machine.silent;
            let ext = ext(machine);
            ext.arm_generation = Some(generation);
            ext.arm_time = Some(ctx.now + chrono::Duration::seconds(i64::from(ext.exit_delay_secs)));
            let notice = Notice::Arming {
                mode: ext.mode.arm_mode(),
                exit_delay_secs: ext.exit_delay_secs,
                silent,
                sounds_enabled: ext.sounds_enabled,
            };
            let delay = Duration::from_secs(u64::from(ext.exit_delay_secs));
            ctx.schedule(delay, TimerFire::ExitDelay(generation));
            ctx.notify(notice);
        }
        AlertState::Ready => {
            let ext = ext(machine);
            ext.last_armed_by = ext.pending_armed_by.take();
            ext.last_armed_from = ext.pending_armed_from.take();
            ext.last_armed_time = Some(ctx.now);
            let notice = Notice::Armed {
                mode: ext.mode.arm_mode(),
                sounds_enabled: ext.sounds_enabled,
            };
            ctx.notify(notice);
        }
        AlertState::Prealert => {
            let generation = Uuid::new_v4();
            let silent = machine.silent;
            let ext = ext(machine);
            ext.entry_generation = Some(generation);
            ext.prealert_end = Some(ctx.now + chrono::Duration::seconds(i64::from(ext.entrance_delay_secs)));
            let notice = Notice::Prealert {
                mode: ext.mode,
                entrance_delay_secs: ext.entrance_delay_secs,
                sounds_enabled: ext.sounds_enabled && !silent,
            };
            let delay = Duration::from_secs(u64::from(ext.entrance_delay_secs));
            ctx.schedule(delay, TimerFire::EntranceDelay(generation));
            ctx.notify(notice);
        }
        AlertState::Clearing => {
            if machine.triggered_devices(ctx.devices).is_empty() {
                machine.transition_to(ctx, AlertState::Disarmed);
            }
        }
        AlertState::Inactive | AlertState::Alert | AlertState::PendingClear => {}
    }
}

pub(super) fn exit_state(machine: &mut AlarmMachine, _ctx: &mut AlarmContext<'_>, state: AlertState) {
    match state {
        AlertState::Arming => ext(machine).arm_generation = None,
        AlertState::Ready => ext(machine).idle_generation = None,
        _ => {}
    }
}

pub(super) fn fire_timer(machine: &mut AlarmMachine, ctx: &mut AlarmContext<'_>, fire: TimerFire) -> bool {
    let live = {
        let ext = ext(machine);
        match fire {
            TimerFire::ExitDelay(g) => ext.arm_generation == Some(g),
            TimerFire::EntranceDelay(g) => ext.entry_generation == Some(g),
            TimerFire::MotionIdle(g) => ext.idle_generation == Some(g),
        }
    };
    if !live {
        debug!("ignoring stale timer {:?}", fire);
        return false;
    }

    match fire {
        TimerFire::ExitDelay(_) => machine.transition_to_from(ctx, AlertState::Arming, AlertState::Ready),
        TimerFire::EntranceDelay(_) => machine.transition_to_from(ctx, AlertState::Prealert, AlertState::Alert),
        TimerFire::MotionIdle(_) => {
            if machine.state != AlertState::Ready {
                return false;
            }
            debug!("no motion for {:?}, clearing triggers", MOTION_IDLE_TIMEOUT);
            ext(machine).idle_generation = None;
            machine.clear_triggers();
            machine.mark_needs_report();
            true
        }
    }
}
