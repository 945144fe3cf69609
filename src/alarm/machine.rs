// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Shared eight-state skeleton every alarm kind runs on

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::events::{AlarmEvent, TriggerEvent};
use super::incident::{IncidentEvent, IncidentTrigger, TriggerLog};
use super::security::{self, SecurityExt};
use super::{safety, AlarmContext, AlarmKind, AlertState, TimerFire};
use crate::db::{load_value, persist_value, AttributeStore};
use crate::devices::{Address, Device};
use crate::error::Result;
use crate::feedback::{sound_for_transition, LedState, SounderMode};

/// State of one alarm kind.
///
/// Only the controller's work queue ever touches a machine, so nothing here
/// is synchronised.
#[derive(Debug, Clone)]
pub struct AlarmMachine {
    pub(super) kind: AlarmKind,
    pub(super) state: AlertState,
    pub(super) silent: bool,
    pub(super) triggers: TriggerLog,
    pub(super) needs_report: bool,
    pub(super) dirty: bool,
    pub(super) security: Option<SecurityExt>,
}

impl AlarmMachine {
    pub fn new(kind: AlarmKind) -> Self {
        Self {
            kind,
            state: AlertState::Inactive,
            silent: false,
            triggers: TriggerLog::new(),
            needs_report: false,
            dirty: false,
            security: (kind == AlarmKind::Security).then(SecurityExt::default),
        }
    }

    /// Rebuild a machine from the attribute store.
    ///
    /// Timer-bounded states are never resumed as-is: the timer that would
    /// have moved them on did not survive the restart.
    pub fn restore(kind: AlarmKind, store: &dyn AttributeStore, devices: &[Device]) -> Result<Self> {
        let mut machine = Self::new(kind);

        if let Some(state) = load_value::<String>(store, &machine.key("AlertState"))? {
            machine.state = state.parse()?;
        }
        if let Some(silent) = load_value::<bool>(store, &machine.key("Silent"))? {
            machine.silent = silent;
        }
        if let Some(triggers) = load_value::<TriggerLog>(store, &machine.key("Triggers"))? {
            machine.triggers = triggers;
        }
        if kind == AlarmKind::Security {
            machine.security = Some(SecurityExt::restore(store)?);
        }

        let restored = machine.state;
        machine.state = machine.restart_state(devices);
        if machine.state != restored {
            debug!("{} restored as {} (was {})", kind, machine.state, restored);
            machine.dirty = true;
        }
        Ok(machine)
    }

    fn restart_state(&self, devices: &[Device]) -> AlertState {
        let nothing_triggered = self.triggered_devices(devices).is_empty();
        match (self.kind, self.state) {
            (AlarmKind::Security, AlertState::Arming) => match self.security.as_ref().map(|s| s.mode) {
                Some(super::SecurityMode::Disarmed) => AlertState::Disarmed,
                _ => AlertState::Ready,
            },
            (AlarmKind::Security, AlertState::Clearing) if nothing_triggered => AlertState::Disarmed,
            (_, AlertState::Clearing) if nothing_triggered => AlertState::Ready,
            (_, AlertState::Prealert) => AlertState::Alert,
            (_, state) => state,
        }
    }

    /// Write every persisted field.
    pub fn persist(&self, store: &dyn AttributeStore) -> Result<()> {
        persist_value(store, &self.key("AlertState"), &self.state.as_str())?;
        persist_value(store, &self.key("Silent"), &self.silent)?;
        persist_value(store, &self.key("Triggers"), &self.triggers)?;
        if let Some(ext) = &self.security {
            ext.persist(store)?;
        }
        Ok(())
    }

    fn key(&self, field: &str) -> String {
        format!("hubalarm:{}{}", self.kind.name(), field)
    }

    pub fn kind(&self) -> AlarmKind {
        self.kind
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    pub fn triggers(&self) -> &TriggerLog {
        &self.triggers
    }

    pub fn clear_triggers(&mut self) {
        if !self.triggers.is_empty() {
            self.triggers.clear();
            self.dirty = true;
        }
    }

    pub fn security(&self) -> Option<&SecurityExt> {
        self.security.as_ref()
    }

    pub fn needs_report(&self) -> bool {
        self.needs_report
    }

    pub fn mark_needs_report(&mut self) {
        self.needs_report = true;
    }

    pub fn clear_needs_report(&mut self) {
        self.needs_report = false;
    }

    /// Returns whether persisted fields changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    // ----- derived device sets ---------------------------------------------

    pub fn is_supported(&self, device: &Device) -> bool {
        match self.kind {
            AlarmKind::Security => security::is_supported(device),
            kind => safety::is_supported(kind, device),
        }
    }

    pub fn is_triggered(&self, device: &Device) -> bool {
        match self.kind {
            AlarmKind::Security => security::is_triggered(device),
            kind => safety::is_triggered(kind, device),
        }
    }

    fn is_participating(&self, device: &Device) -> bool {
        self.is_supported(device)
            && match &self.security {
                Some(ext) => ext.current_active.contains(&device.address),
                None => true,
            }
    }

    /// Every device this kind could use.
    pub fn supported_devices(&self, devices: &[Device]) -> BTreeSet<Address> {
        devices
            .iter()
            .filter(|d| self.is_supported(d))
            .map(|d| d.address.clone())
            .collect()
    }

    pub fn offline_devices(&self, devices: &[Device]) -> BTreeSet<Address> {
        devices
            .iter()
            .filter(|d| self.is_participating(d) && d.is_offline())
            .map(|d| d.address.clone())
            .collect()
    }

    pub fn triggered_devices(&self, devices: &[Device]) -> BTreeSet<Address> {
        devices
            .iter()
            .filter(|d| self.is_participating(d) && !d.is_offline() && self.is_triggered(d))
            .map(|d| d.address.clone())
            .collect()
    }

    /// Participating devices that are online and clear.
    pub fn active_devices(&self, devices: &[Device]) -> BTreeSet<Address> {
        devices
            .iter()
            .filter(|d| self.is_participating(d) && !d.is_offline() && !self.is_triggered(d))
            .map(|d| d.address.clone())
            .collect()
    }

    // ----- event handling --------------------------------------------------

    /// Whether the current state accepts `event`. Triggers are always
    /// accepted and judged for interest when handled.
    pub fn can_handle(&self, event: &AlarmEvent) -> bool {
        if event.is_trigger() {
            return true;
        }
        match self.kind {
            AlarmKind::Security => security::can_handle(self.state, event),
            _ => safety::can_handle(self.state, event),
        }
    }

    /// Apply an event the whole group has already agreed to accept.
    pub fn handle(&mut self, ctx: &mut AlarmContext<'_>, event: &AlarmEvent) -> Result<()> {
        if let AlarmEvent::Trigger(trigger) = event {
            if !self.is_trigger_interesting(trigger) {
                return Ok(());
            }
            if trigger.triggered && !self.is_excluded(&trigger.source) {
                self.add_incident(ctx, trigger);
            }
            self.needs_report = true;
        }

        match self.kind {
            AlarmKind::Security => security::handle(self, ctx, event),
            _ => {
                safety::handle(self, ctx, event);
                Ok(())
            }
        }
    }

    fn is_trigger_interesting(&self, trigger: &TriggerEvent) -> bool {
        match self.kind {
            AlarmKind::Security => security::is_interesting(self, trigger),
            kind => safety::is_interesting(kind, trigger.trigger),
        }
    }

    fn is_excluded(&self, source: &Address) -> bool {
        self.security
            .as_ref()
            .map(|ext| ext.excluded.contains(source))
            .unwrap_or(false)
    }

    fn can_add_incident(&self) -> bool {
        match self.state {
            AlertState::Inactive | AlertState::Disarmed | AlertState::Arming => false,
            AlertState::PendingClear => self.kind != AlarmKind::Security,
            _ => true,
        }
    }

    fn add_incident(&mut self, ctx: &AlarmContext<'_>, trigger: &TriggerEvent) {
        if !self.can_add_incident() {
            return;
        }

        let entry = IncidentTrigger {
            source: trigger.source.clone(),
            actor: trigger.actor.clone(),
            time: ctx.now,
            event: IncidentEvent::classify(&trigger.source, trigger.trigger),
            alarm: self.kind,
        };
        if self.triggers.push(entry) {
            self.dirty = true;
        } else {
            warn!("{} incident trail full, dropping trigger from {}", self.kind, trigger.source);
        }
        self.needs_report = true;
    }

    /// Reconcile with a changed device population.
    pub fn after_process_devices(&mut self, ctx: &mut AlarmContext<'_>) {
        match self.kind {
            AlarmKind::Security => security::after_process_devices(self, ctx),
            _ => safety::after_process_devices(self, ctx),
        }
    }

    pub fn on_device_online(&mut self, address: &Address) {
        if let Some(ext) = self.security.as_mut() {
            if ext.excluded.remove(address) {
                self.dirty = true;
                self.needs_report = true;
            }
        }
    }

    pub fn on_device_offline(&mut self, _address: &Address) {
        self.needs_report = true;
    }

    /// Monitoring confirmed the incident.
    pub fn on_verified(&mut self, ctx: &mut AlarmContext<'_>) {
        if self.kind == AlarmKind::Security && self.state == AlertState::Prealert {
            self.transition_to(ctx, AlertState::Alert);
        }
    }

    /// Deliver a timer. Stale generations are ignored; returns whether the
    /// fire was acted on.
    pub fn fire_timer(&mut self, ctx: &mut AlarmContext<'_>, fire: TimerFire) -> bool {
        match self.kind {
            AlarmKind::Security => security::fire_timer(self, ctx, fire),
            _ => false,
        }
    }

    // ----- transitions -----------------------------------------------------

    pub(super) fn transition_to(&mut self, ctx: &mut AlarmContext<'_>, new: AlertState) {
        let from = self.state;

        match new {
            AlertState::Disarmed => ctx.feedback.set_led(LedState::AlarmOff, None),
            AlertState::PendingClear if ctx.voice_cues => ctx.feedback.set_led(LedState::AllOff, None),
            _ => {}
        }

        if matches!(from, AlertState::Arming | AlertState::Prealert | AlertState::Alert) {
            ctx.feedback.set_sounder(SounderMode::NoSound, None);
        }

        if ctx.voice_cues {
            if let Some(cue) = self.transition_cue(from, new) {
                ctx.feedback.set_sounder(cue, None);
            }
        }

        debug!("{} transitioning {} -> {}", self.kind, from, new);
        self.exit_state(ctx, from);
        self.state = new;
        self.dirty = true;
        self.enter_state(ctx, new);
        self.needs_report = true;
    }

    /// Transition only if still in `expected`; stale callbacks become no-ops.
    pub(super) fn transition_to_from(&mut self, ctx: &mut AlarmContext<'_>, expected: AlertState, new: AlertState) -> bool {
        if self.state != expected {
            debug!("{} not in {} (is {}), ignoring move to {}", self.kind, expected, self.state, new);
            return false;
        }
        self.transition_to(ctx, new);
        true
    }

    fn transition_cue(&self, from: AlertState, to: AlertState) -> Option<SounderMode> {
        if self.silent && matches!(to, AlertState::Prealert | AlertState::Alert) {
            return None;
        }
        let partial = self
            .security
            .as_ref()
            .map(|ext| ext.mode == super::SecurityMode::Partial)
            .unwrap_or(false);
        sound_for_transition(self.kind, from, to, partial)
    }

    fn exit_state(&mut self, ctx: &mut AlarmContext<'_>, state: AlertState) {
        if self.kind == AlarmKind::Security {
            security::exit_state(self, ctx, state);
        }
    }

    fn enter_state(&mut self, ctx: &mut AlarmContext<'_>, state: AlertState) {
        match state {
            AlertState::Inactive => self.clear_triggers(),
            AlertState::Alert => ctx.notify(super::Notice::Alert(self.kind)),
            _ => {}
        }

        match self.kind {
            AlarmKind::Security => security::enter_state(self, ctx, state),
            _ => safety::enter_state(self, ctx, state),
        }
    }
}

/// Acceptance shared by every kind before specialisation.
pub(super) fn default_can_handle(state: AlertState, event: &AlarmEvent) -> bool {
    match state {
        AlertState::Inactive | AlertState::Disarmed | AlertState::Ready => true,
        AlertState::Arming | AlertState::Prealert | AlertState::Alert => event.is_disarm(),
        AlertState::PendingClear => event.is_clear() || event.is_disarm(),
        AlertState::Clearing => false,
    }
}
