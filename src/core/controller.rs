// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Alarm controller - owns every alarm machine and is the only thing that
//! mutates them
//!
//! Every event goes through [`Controller::dispatch`]: all machines are asked
//! whether they accept it, and only if every one does is it applied to all of
//! them. Once applied the dispatch settles: hub state and the current
//! incident are recomputed, keypad notices go out, and changed machines are
//! persisted. Reports are queued and published by [`Controller::run_deferred`].

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::{ActivationState, AggregateAlarmState};
use crate::alarm::{
    AlarmContext, AlarmEvent, AlarmKind, AlarmMachine, AlertState, ArmMode, IncidentRecord, Notice,
    SecurityExt, SecurityMode, TimerFire, TimerRequest, Trigger,
};
use crate::config::{AlarmConfig, Config, HubConfig};
use crate::db::{load_value, persist_value, AttributeStore};
use crate::devices::{Address, DeviceRegistry};
use crate::error::{AlarmError, Result};
use crate::feedback::{
    led_for, sound_cleared, sound_monitored, sound_triggered, Feedback, KeypadAlarmMode, KeypadNotice, LedState,
    SounderMode,
};
use crate::protocol::{
    trigger_for_attribute, AlarmRequest, AlarmResponse, ArmRequest, PlatformRequest, ProtocolBody, ProtocolMessage,
};
use crate::report::{AlarmReport, HubAlarmReport, ReportSink, SecurityReport};

const KEY_STATE: &str = "hubalarm:state";
const KEY_INCIDENT: &str = "hubalarm:currentIncident";

/// The open incident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentIncident {
    pub id: Uuid,
    pub started: DateTime<Utc>,
}

/// Work left for after the current item has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    /// Report only if some machine flagged a change.
    UpdateAndReport,
    Report { reconnect: bool },
}

pub struct Controller {
    machines: Vec<AlarmMachine>,
    registry: Arc<dyn DeviceRegistry>,
    feedback: Arc<dyn Feedback>,
    store: Arc<dyn AttributeStore>,
    sink: Arc<dyn ReportSink>,
    hub: HubConfig,
    defaults: AlarmConfig,
    activation: ActivationState,
    alarm_state: AggregateAlarmState,
    active_alerts: BTreeSet<AlarmKind>,
    incident: Option<CurrentIncident>,
    device_addresses: Option<BTreeSet<Address>>,
    devices_processed: bool,
    deferred: VecDeque<Deferred>,
    timers: Vec<TimerRequest>,
}

impl Controller {
    /// Build the controller, restoring every machine from the store.
    ///
    /// Fails with a fatal error when a persisted state or mode is unknown.
    pub fn new(
        config: &Config,
        registry: Arc<dyn DeviceRegistry>,
        feedback: Arc<dyn Feedback>,
        store: Arc<dyn AttributeStore>,
        sink: Arc<dyn ReportSink>,
    ) -> Result<Self> {
        let devices = registry.devices();
        let machines = AlarmKind::ALL
            .iter()
            .map(|&kind| AlarmMachine::restore(kind, store.as_ref(), &devices))
            .collect::<Result<Vec<_>>>()?;

        let activation = match load_value::<String>(store.as_ref(), KEY_STATE)? {
            Some(state) => state.parse()?,
            None => ActivationState::Suspended,
        };
        let incident = load_value::<Option<CurrentIncident>>(store.as_ref(), KEY_INCIDENT)?.flatten();

        let mut controller = Self {
            machines,
            registry,
            feedback,
            store,
            sink,
            hub: config.hub.clone(),
            defaults: config.alarm.clone(),
            activation,
            alarm_state: AggregateAlarmState::Inactive,
            active_alerts: BTreeSet::new(),
            incident,
            device_addresses: None,
            devices_processed: false,
            deferred: VecDeque::new(),
            timers: Vec::new(),
        };
        controller.refresh_state(Utc::now());
        controller.persist_dirty();

        info!(
            "hub alarm controller started ({}, {:?})",
            controller.activation, controller.alarm_state
        );
        Ok(controller)
    }

    // ----- accessors -------------------------------------------------------

    pub fn is_active(&self) -> bool {
        self.activation == ActivationState::Active
    }

    pub fn activation(&self) -> ActivationState {
        self.activation
    }

    pub fn alarm_state(&self) -> AggregateAlarmState {
        self.alarm_state
    }

    pub fn active_alerts(&self) -> &BTreeSet<AlarmKind> {
        &self.active_alerts
    }

    /// Kinds with any participating devices.
    pub fn available_alerts(&self) -> BTreeSet<AlarmKind> {
        self.machines
            .iter()
            .filter(|m| m.state() != AlertState::Inactive)
            .map(|m| m.kind())
            .collect()
    }

    pub fn current_incident(&self) -> Option<&CurrentIncident> {
        self.incident.as_ref()
    }

    pub fn machines(&self) -> &[AlarmMachine] {
        &self.machines
    }

    pub fn machine(&self, kind: AlarmKind) -> Option<&AlarmMachine> {
        self.machines.iter().find(|m| m.kind() == kind)
    }

    pub fn security(&self) -> Option<&SecurityExt> {
        self.machine(AlarmKind::Security).and_then(AlarmMachine::security)
    }

    /// Timers requested since the last call.
    pub fn take_timers(&mut self) -> Vec<TimerRequest> {
        std::mem::take(&mut self.timers)
    }

    // ----- dispatch --------------------------------------------------------

    /// Offer `event` to every alarm.
    ///
    /// Returns `Ok(false)` without touching anything when any alarm refuses
    /// it. An arm failure is returned as an error after its speculative
    /// writes were rolled back and the dispatch has settled.
    pub fn dispatch(&mut self, event: &AlarmEvent, allow_state_update: bool) -> Result<bool> {
        if let Some(refusing) = self.machines.iter().find(|m| !m.can_handle(event)) {
            debug!(
                "{} refused {} while {}",
                refusing.kind(),
                event.name(),
                refusing.state()
            );
            return Ok(false);
        }

        let mut outcome = Ok(());
        self.each_machine(|machine, ctx| {
            if outcome.is_ok() {
                outcome = machine.handle(ctx, event);
            }
        });
        outcome?;

        if allow_state_update {
            self.update_and_report_state();
        }
        Ok(true)
    }

    /// Run `f` over every machine with a shared context, then settle.
    fn each_machine<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut AlarmMachine, &mut AlarmContext<'_>),
    {
        let devices = self.registry.devices();
        let feedback = Arc::clone(&self.feedback);
        let mut ctx = AlarmContext::new(&devices, feedback.as_ref(), Utc::now(), self.hub.voice_cues);

        for machine in self.machines.iter_mut() {
            f(machine, &mut ctx);
        }

        self.settle(ctx);
    }

    fn settle(&mut self, ctx: AlarmContext<'_>) {
        let now = ctx.now;
        self.timers.extend(ctx.timers);
        self.refresh_state(now);

        for notice in ctx.notices {
            self.announce(notice);
        }

        self.persist_dirty();
    }

    fn announce(&mut self, notice: Notice) {
        let alarm_state = self.alarm_state;
        match notice {
            Notice::Arming {
                mode,
                exit_delay_secs,
                silent,
                sounds_enabled,
            } => self.feedback.keypad(KeypadNotice::Arming {
                mode,
                exit_delay_secs,
                silent,
                sounds_enabled,
                alarm_state,
            }),
            Notice::Armed { mode, sounds_enabled } => {
                self.feedback.keypad(KeypadNotice::Armed {
                    mode,
                    sounds_enabled,
                    alarm_state,
                });
                self.update_and_report_state();
            }
            Notice::ArmFailed => self.feedback.keypad(KeypadNotice::ArmFailed { alarm_state }),
            Notice::Prealert {
                mode,
                entrance_delay_secs,
                sounds_enabled,
            } => self.feedback.keypad(KeypadNotice::Prealert {
                mode,
                entrance_delay_secs,
                sounds_enabled,
                alarm_state,
            }),
            Notice::Alert(kind) => {
                debug!("{} alert raised", kind);
                self.on_alert();
            }
        }
    }

    fn on_alert(&mut self) {
        if let Some(kind) = self.alert_alarm() {
            let led = led_for(kind, self.feedback.is_battery_powered(), self.hub.battery_powered_led_secs);
            self.feedback.keypad(KeypadNotice::Alerting {
                sound: sound_triggered(kind),
                keypad_mode: self.keypad_mode(kind),
                led: led.state,
                led_duration_secs: led.duration_secs,
            });
        }
        self.update_and_report_state();
    }

    /// The alarm that owns the sounder, LED and keypads: the active,
    /// non-silent kind with the lowest priority number.
    pub fn alert_alarm(&self) -> Option<AlarmKind> {
        let mut ordered: Vec<&AlarmMachine> = self.machines.iter().collect();
        ordered.sort_by_key(|m| m.kind().priority());
        ordered
            .into_iter()
            .find(|m| self.active_alerts.contains(&m.kind()) && !m.is_silent())
            .map(AlarmMachine::kind)
    }

    fn keypad_mode(&self, kind: AlarmKind) -> KeypadAlarmMode {
        match kind {
            AlarmKind::Security => {
                KeypadAlarmMode::Security(self.security().map(|s| s.mode).unwrap_or(SecurityMode::Inactive))
            }
            _ => KeypadAlarmMode::Panic,
        }
    }

    // ----- hub state -------------------------------------------------------

    fn refresh_state(&mut self, now: DateTime<Utc>) {
        self.alarm_state = self.compute_alarm_state();
        self.active_alerts = self.compute_active_alerts();

        if self.alarm_state.is_alerting() {
            if self.incident.is_none() {
                let incident = CurrentIncident {
                    id: Uuid::new_v4(),
                    started: now,
                };
                info!("new alarm incident started: {}", incident.id);
                self.incident = Some(incident);
                self.persist_incident();
            }
        } else {
            self.close_incident(now);
        }
    }

    fn compute_alarm_state(&self) -> AggregateAlarmState {
        if !self.is_active() {
            return AggregateAlarmState::Inactive;
        }
        let top = self
            .machines
            .iter()
            .map(|m| m.state().priority())
            .max()
            .unwrap_or(0);
        AggregateAlarmState::from_priority(top)
    }

    fn compute_active_alerts(&self) -> BTreeSet<AlarmKind> {
        if !self.is_active() {
            return BTreeSet::new();
        }
        self.machines
            .iter()
            .filter(|m| matches!(m.state(), AlertState::Alert | AlertState::PendingClear))
            .map(|m| m.kind())
            .collect()
    }

    /// Close the open incident, if any, and write it to the audit trail.
    fn close_incident(&mut self, now: DateTime<Utc>) {
        let Some(incident) = self.incident.take() else {
            return;
        };

        let mut alarms = Vec::new();
        let mut triggers = Vec::new();
        for machine in &self.machines {
            if !machine.triggers().is_empty()
                || matches!(machine.state(), AlertState::Alert | AlertState::PendingClear)
            {
                alarms.push(machine.kind());
            }
            triggers.extend(machine.triggers().iter().cloned());
        }
        triggers.sort_by_key(|t| t.time);

        let record = IncidentRecord {
            id: incident.id,
            started: incident.started,
            ended: now,
            alarms,
            triggers,
        };
        info!("alarm incident {} closed", incident.id);
        if let Err(e) = self.store.append_incident(&record) {
            warn!("failed to record incident {}: {}", incident.id, e);
        }
        self.persist_incident();
    }

    fn persist_incident(&self) {
        if let Err(e) = persist_value(self.store.as_ref(), KEY_INCIDENT, &self.incident) {
            warn!("failed to persist current incident: {}", e);
        }
    }

    fn persist_dirty(&mut self) {
        for machine in self.machines.iter_mut() {
            if machine.take_dirty() {
                if let Err(e) = machine.persist(self.store.as_ref()) {
                    warn!("failed to persist {} alarm: {}", machine.kind(), e);
                }
            }
        }
    }

    // ----- reporting -------------------------------------------------------

    fn update_and_report_state(&mut self) {
        self.deferred.push_back(Deferred::UpdateAndReport);
    }

    /// Publish the reports queued by earlier work.
    pub fn run_deferred(&mut self) {
        while let Some(work) = self.deferred.pop_front() {
            match work {
                Deferred::UpdateAndReport => {
                    if !self.is_active() {
                        continue;
                    }
                    let mut report = false;
                    for machine in self.machines.iter_mut() {
                        report |= machine.needs_report();
                        machine.clear_needs_report();
                    }
                    if report {
                        self.report_state(false);
                    }
                }
                Deferred::Report { reconnect } => self.report_state(reconnect),
            }
        }
    }

    /// Snapshot of everything the hub alarm reports.
    pub fn report(&self, reconnect: bool) -> HubAlarmReport {
        let devices = self.registry.devices();
        HubAlarmReport {
            state: self.activation,
            alarm_state: self.alarm_state,
            active_alerts: self.active_alerts.clone(),
            available_alerts: self.available_alerts(),
            current_incident: self.incident.map(|i| i.id),
            reconnect,
            alarms: self
                .machines
                .iter()
                .map(|m| AlarmReport::from_machine(m, &devices))
                .collect(),
            security: self
                .machine(AlarmKind::Security)
                .and_then(|m| SecurityReport::from_machine(m, &devices)),
            timestamp: Utc::now(),
        }
    }

    fn report_state(&self, reconnect: bool) {
        trace!("reporting alarm state...");
        self.sink.publish(self.report(reconnect));
    }

    // ----- inbound ---------------------------------------------------------

    /// Answer one platform request.
    pub fn handle_request(&mut self, request: PlatformRequest) -> Result<AlarmResponse> {
        trace!("alarm processing {} from {}", request.body.name(), request.source);
        if request.body.requires_active() && !self.is_active() {
            return Err(AlarmError::Suspended);
        }

        let PlatformRequest { source, actor, body } = request;
        match body {
            AlarmRequest::Activate => self.set_activation(source, actor, ActivationState::Active),
            AlarmRequest::Suspend => self.set_activation(source, actor, ActivationState::Suspended),

            AlarmRequest::Panic { source: panic_source } => {
                let from = panic_source.unwrap_or_else(Address::broadcast);
                if self.dispatch(&AlarmEvent::trigger(from, actor, Trigger::Panic, true), true)? {
                    Ok(AlarmResponse::Panicked)
                } else {
                    Err(AlarmError::InvalidState("cannot panic in current state".to_string()))
                }
            }

            AlarmRequest::Arm(arm) => self.on_arm_request(&arm),

            AlarmRequest::Disarm {
                disarmed_by,
                disarmed_from,
            } => {
                if self.dispatch(&AlarmEvent::disarm(disarmed_from, disarmed_by), true)? {
                    self.feedback.keypad(KeypadNotice::Disarmed);
                    Ok(AlarmResponse::Disarmed)
                } else {
                    Err(AlarmError::InvalidSecurityState("cannot disarm".to_string()))
                }
            }

            AlarmRequest::ClearIncident => {
                self.clear_incident(source, actor)?;
                Ok(AlarmResponse::IncidentCleared)
            }

            AlarmRequest::Verified => {
                self.each_machine(|machine, ctx| machine.on_verified(ctx));
                self.update_and_report_state();
                Ok(AlarmResponse::Handled)
            }

            AlarmRequest::PrealertTriggered { duration_secs } => {
                self.feedback.set_sounder(SounderMode::ArmingGraceEnter, Some(duration_secs));
                self.feedback.set_led(LedState::AlarmGraceEnter, Some(duration_secs));
                Ok(AlarmResponse::Handled)
            }

            AlarmRequest::AlertTriggered { alert, monitored } => {
                self.feedback.set_sounder(SounderMode::NoSound, None);
                if let Some(kind) = AlarmKind::from_name(&alert) {
                    let sound = if monitored {
                        sound_monitored(kind)
                    } else {
                        sound_triggered(kind)
                    };
                    self.feedback.set_sounder(sound, None);
                    let led = led_for(kind, self.feedback.is_battery_powered(), self.hub.battery_powered_led_secs);
                    self.feedback.set_led(led.state, led.duration_secs);
                }
                Ok(AlarmResponse::Handled)
            }

            AlarmRequest::AlertCancelled { alert } => {
                self.feedback.set_sounder(SounderMode::NoSound, None);
                if let Some(kind) = AlarmKind::from_name(&alert) {
                    self.feedback.set_sounder(sound_cleared(kind), None);
                    self.feedback.set_led(LedState::AllOff, None);
                }
                Ok(AlarmResponse::Handled)
            }

            AlarmRequest::SecurityArming { mode, duration_secs } => {
                let sound = match mode {
                    ArmMode::Partial => SounderMode::ArmingGraceExitPartial,
                    ArmMode::On => SounderMode::ArmingGraceExit,
                };
                self.feedback.set_sounder(sound, Some(duration_secs));
                self.feedback.set_led(LedState::AlarmGraceExit, Some(duration_secs));
                Ok(AlarmResponse::Handled)
            }

            AlarmRequest::SecurityArmed { mode } => {
                self.feedback.set_sounder(SounderMode::NoSound, None);
                match mode {
                    SecurityMode::Partial => self.feedback.set_sounder(SounderMode::SecurityAlarmPartial, None),
                    SecurityMode::On => self.feedback.set_sounder(SounderMode::SecurityAlarmOn, None),
                    SecurityMode::Inactive | SecurityMode::Disarmed => {}
                }
                self.feedback.set_led(LedState::AlarmOn, None);
                Ok(AlarmResponse::Handled)
            }

            AlarmRequest::SecurityDisarmed => {
                self.feedback.set_sounder(SounderMode::SecurityAlarmOff, None);
                self.feedback.set_led(LedState::AlarmOff, None);
                Ok(AlarmResponse::Handled)
            }

            AlarmRequest::Unsupported { message_type } => Err(AlarmError::UnsupportedMessageType(message_type)),
        }
    }

    fn set_activation(
        &mut self,
        source: Address,
        actor: Option<Address>,
        target: ActivationState,
    ) -> Result<AlarmResponse> {
        let event = match target {
            ActivationState::Active => AlarmEvent::activate(source, actor),
            ActivationState::Suspended => AlarmEvent::suspend(source, actor),
        };

        let accepted = self.dispatch(&event, true)?;
        self.deferred.push_back(Deferred::Report { reconnect: false });
        if !accepted {
            return Err(AlarmError::InvalidState(format!(
                "cannot {} while in the current state",
                event.name()
            )));
        }

        self.activation = target;
        info!("hub alarm {}", target);
        if let Err(e) = persist_value(self.store.as_ref(), KEY_STATE, &target.as_str()) {
            warn!("failed to persist activation state: {}", e);
        }
        self.refresh_state(Utc::now());

        Ok(match target {
            ActivationState::Active => AlarmResponse::Activated,
            ActivationState::Suspended => AlarmResponse::Suspended,
        })
    }

    fn on_arm_request(&mut self, arm: &ArmRequest) -> Result<AlarmResponse> {
        let event = AlarmEvent::Arm(arm.to_event(&self.defaults));
        match self.dispatch(&event, true) {
            Ok(true) => Ok(AlarmResponse::Armed {
                security_arm_time: self.security().and_then(|s| s.arm_time),
            }),
            Ok(false) => Err(AlarmError::InvalidSecurityState("cannot arm".to_string())),
            Err(e) => {
                // insufficient devices already told the keypads
                if arm.armed_from.is_protocol() && !matches!(e, AlarmError::InsufficientDevices { .. }) {
                    self.feedback.keypad(KeypadNotice::ArmFailed {
                        alarm_state: self.alarm_state,
                    });
                }
                Err(e)
            }
        }
    }

    fn clear_incident(&mut self, source: Address, actor: Option<Address>) -> Result<()> {
        self.close_incident(Utc::now());
        for machine in self.machines.iter_mut() {
            machine.clear_triggers();
            machine.mark_needs_report();
        }

        if !self.dispatch(&AlarmEvent::clear(source, actor), true)? {
            debug!("clear refused, triggers cleared only");
        }
        self.persist_dirty();
        self.deferred.push_back(Deferred::Report { reconnect: false });
        Ok(())
    }

    /// Handle a keypad protocol message. Ignored while suspended.
    pub fn handle_protocol(&mut self, message: ProtocolMessage) {
        if !self.is_active() {
            trace!("suspended, ignoring protocol message from {}", message.source);
            return;
        }

        let ProtocolMessage { source, actor, body } = message;
        match body {
            ProtocolBody::PanicPressed => {
                let event = AlarmEvent::trigger(source, actor, Trigger::Panic, true);
                if let Err(e) = self.dispatch(&event, true) {
                    warn!("panic from {} failed: {}", event.source(), e);
                }
            }
            ProtocolBody::DisarmPressed => match self.dispatch(&AlarmEvent::disarm(source, actor), true) {
                Ok(true) => self.feedback.keypad(KeypadNotice::Disarmed),
                _ => self.feedback.keypad(KeypadNotice::DisarmFailed),
            },
            ProtocolBody::ValueChange(attrs) | ProtocolBody::SetAttributes(attrs) => {
                let mut update = false;
                for (name, value) in &attrs {
                    let Some((trigger, triggered)) = trigger_for_attribute(name, value) else {
                        continue;
                    };
                    let event = AlarmEvent::trigger(source.clone(), actor.clone(), trigger, triggered);
                    match self.dispatch(&event, false) {
                        Ok(accepted) => update |= accepted,
                        Err(e) => warn!("{} from {} failed: {}", name, source, e),
                    }
                }
                if update {
                    self.update_and_report_state();
                }
            }
            ProtocolBody::Other(message_type) => {
                trace!("ignoring protocol message {} from {}", message_type, source);
            }
        }
    }

    /// Reconcile with the registry after the device population changed.
    pub fn on_devices_updated(&mut self) {
        let addresses: BTreeSet<Address> = self
            .registry
            .devices()
            .into_iter()
            .map(|d| d.address)
            .collect();

        if self.device_addresses.as_ref() != Some(&addresses) {
            debug!("device population changed, {} devices", addresses.len());
            self.device_addresses = Some(addresses);
            self.each_machine(|machine, ctx| machine.after_process_devices(ctx));
            let reconnect = !self.devices_processed;
            self.deferred.push_back(Deferred::Report { reconnect });
        }
        self.devices_processed = true;
    }

    pub fn on_device_online(&mut self, address: &Address) {
        for machine in self.machines.iter_mut() {
            machine.on_device_online(address);
        }
        self.persist_dirty();
        self.deferred.push_back(Deferred::Report { reconnect: false });
    }

    pub fn on_device_offline(&mut self, address: &Address) {
        for machine in self.machines.iter_mut() {
            machine.on_device_offline(address);
        }
        self.persist_dirty();
        self.deferred.push_back(Deferred::Report { reconnect: false });
    }

    /// The uplink came back; resend everything once devices are known.
    pub fn on_connected(&mut self) {
        if self.devices_processed {
            self.deferred.push_back(Deferred::Report { reconnect: true });
        }
    }

    /// Deliver a timer. Returns whether any alarm acted on it.
    pub fn fire_timer(&mut self, fire: TimerFire) -> bool {
        let mut acted = false;
        self.each_machine(|machine, ctx| acted |= machine.fire_timer(ctx, fire));
        if acted {
            self.update_and_report_state();
        }
        acted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::devices::{attrs, Capability, Device, InMemoryRegistry};
    use crate::feedback::RecordingFeedback;
    use crate::report::RecordingSink;

    const DOOR: &str = "DRIV:dev:door";
    const SMOKE: &str = "DRIV:dev:smoke";
    const KEYPAD: &str = "PROT:ZIGB:keypad";

    struct Harness {
        controller: Controller,
        registry: Arc<InMemoryRegistry>,
        feedback: Arc<RecordingFeedback>,
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
    }

    impl Harness {
        fn request(&mut self, body: AlarmRequest) -> Result<AlarmResponse> {
            let response = self.controller.handle_request(PlatformRequest::new("SERV:person:1", body));
            self.controller.run_deferred();
            response
        }

        fn state(&self, kind: AlarmKind) -> AlertState {
            self.controller.machine(kind).unwrap().state()
        }

        fn fire_all_timers(&mut self) {
            for timer in self.controller.take_timers() {
                self.controller.fire_timer(timer.fire);
            }
            self.controller.run_deferred();
        }

        fn set(&mut self, address: &str, name: &str, value: &str) {
            self.registry.set_attribute(&Address::from(address), name, value);
            self.controller
                .handle_protocol(ProtocolMessage::attributes(address, [(name, value)]));
            self.controller.run_deferred();
        }
    }

    fn devices() -> Vec<Device> {
        vec![
            Device::new(DOOR, &[Capability::Contact]).with_attribute(attrs::CONTACT, attrs::CONTACT_CLOSED),
            Device::new(SMOKE, &[Capability::Smoke]).with_attribute(attrs::SMOKE, attrs::SMOKE_SAFE),
            Device::new(KEYPAD, &[Capability::KeyPad]),
        ]
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.hub.voice_cues = false;
        config
    }

    fn build(store: Arc<MemoryStore>, activate: bool) -> Harness {
        let registry = Arc::new(InMemoryRegistry::with_devices(devices()));
        let feedback = Arc::new(RecordingFeedback::new());
        let sink = Arc::new(RecordingSink::new());
        let mut controller = Controller::new(
            &test_config(),
            registry.clone(),
            feedback.clone(),
            store.clone(),
            sink.clone(),
        )
        .unwrap();
        controller.on_devices_updated();
        controller.run_deferred();

        let mut harness = Harness {
            controller,
            registry,
            feedback,
            store,
            sink,
        };
        if activate {
            harness.request(AlarmRequest::Activate).unwrap();
        }
        harness
    }

    fn harness() -> Harness {
        build(Arc::new(MemoryStore::new()), true)
    }

    fn arm(from: &str, exit_delay_secs: u32) -> AlarmRequest {
        AlarmRequest::Arm(ArmRequest {
            mode: ArmMode::On,
            bypassed: false,
            entrance_delay_secs: Some(30),
            exit_delay_secs: Some(exit_delay_secs),
            sensitivity_device_count: Some(1),
            silent: false,
            sounds_enabled: true,
            active_devices: [Address::from(DOOR)].into_iter().collect(),
            armed_by: Some(Address::from("SERV:person:1")),
            armed_from: Address::from(from),
        })
    }

    #[test]
    fn test_initial_population_settles_alarms() {
        let h = harness();
        assert_eq!(h.controller.activation(), ActivationState::Active);
        assert_eq!(h.state(AlarmKind::Panic), AlertState::Ready);
        assert_eq!(h.state(AlarmKind::Smoke), AlertState::Ready);
        assert_eq!(h.state(AlarmKind::Water), AlertState::Inactive);
        assert_eq!(h.state(AlarmKind::Security), AlertState::Disarmed);
        assert_eq!(h.controller.alarm_state(), AggregateAlarmState::Ready);

        let available = h.controller.available_alerts();
        assert!(available.contains(&AlarmKind::Security));
        assert!(!available.contains(&AlarmKind::Co));
    }

    #[test]
    fn test_refused_event_mutates_nothing() {
        let mut h = harness();
        h.set(SMOKE, attrs::SMOKE, attrs::SMOKE_DETECTED);
        assert_eq!(h.state(AlarmKind::Smoke), AlertState::Alert);

        let err = h.request(arm("CLNT:app:1", 0)).unwrap_err();
        assert_eq!(err.code(), "security.invalidState");

        assert_eq!(h.state(AlarmKind::Security), AlertState::Disarmed);
        let security = h.controller.security().unwrap();
        assert_eq!(security.mode, SecurityMode::Disarmed);
        assert!(security.current_active.is_empty());
        assert!(h.controller.take_timers().is_empty());
        assert_eq!(h.controller.machine(AlarmKind::Smoke).unwrap().triggers().len(), 1);
    }

    #[test]
    fn test_arbitration_prefers_lowest_priority_number() {
        let mut h = harness();
        h.request(arm("CLNT:app:1", 0)).unwrap();
        h.fire_all_timers();
        assert_eq!(h.state(AlarmKind::Security), AlertState::Ready);

        h.set(DOOR, attrs::CONTACT, attrs::CONTACT_OPENED);
        h.fire_all_timers();
        assert_eq!(h.state(AlarmKind::Security), AlertState::Alert);
        assert_eq!(h.controller.alert_alarm(), Some(AlarmKind::Security));

        h.request(AlarmRequest::Panic { source: None }).unwrap();
        assert_eq!(h.state(AlarmKind::Panic), AlertState::Alert);
        assert_eq!(h.controller.alert_alarm(), Some(AlarmKind::Panic));

        let last = h.feedback.keypad_notices().into_iter().last().unwrap();
        match last {
            KeypadNotice::Alerting {
                sound, keypad_mode, led, ..
            } => {
                assert_eq!(sound, SounderMode::PanicAlarm);
                assert_eq!(keypad_mode, KeypadAlarmMode::Panic);
                assert_eq!(led, LedState::AlarmTriggeredPanic);
            }
            other => panic!("expected alerting notice, got {:?}", other),
        }
    }

    #[test]
    fn test_incident_lifecycle() {
        let mut h = harness();
        assert!(h.controller.current_incident().is_none());

        h.set(SMOKE, attrs::SMOKE, attrs::SMOKE_DETECTED);
        assert_eq!(h.controller.alarm_state(), AggregateAlarmState::Alerting);
        let id = h.controller.current_incident().unwrap().id;

        // a second trigger stays within the same incident
        h.request(AlarmRequest::Panic { source: None }).unwrap();
        assert_eq!(h.controller.current_incident().unwrap().id, id);

        h.request(AlarmRequest::Disarm {
            disarmed_by: None,
            disarmed_from: Address::from("CLNT:app:1"),
        })
        .unwrap();
        assert_eq!(h.state(AlarmKind::Smoke), AlertState::PendingClear);
        assert_eq!(h.controller.alarm_state(), AggregateAlarmState::Clearing);
        assert!(h.controller.current_incident().is_none());

        let incidents = h.store.incidents();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].id, id);
        assert!(incidents[0].alarms.contains(&AlarmKind::Smoke));
        assert!(incidents[0].alarms.contains(&AlarmKind::Panic));

        h.registry
            .set_attribute(&Address::from(SMOKE), attrs::SMOKE, attrs::SMOKE_SAFE);
        h.request(AlarmRequest::ClearIncident).unwrap();
        assert_eq!(h.state(AlarmKind::Smoke), AlertState::Ready);
        assert_eq!(h.state(AlarmKind::Panic), AlertState::Ready);
        assert_eq!(h.controller.alarm_state(), AggregateAlarmState::Ready);
        assert!(h.controller.machine(AlarmKind::Smoke).unwrap().triggers().is_empty());
    }

    #[test]
    fn test_security_end_to_end() {
        let mut h = harness();

        let response = h.request(arm("CLNT:app:1", 0)).unwrap();
        match response {
            AlarmResponse::Armed { security_arm_time } => assert!(security_arm_time.is_some()),
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(h.state(AlarmKind::Security), AlertState::Arming);

        h.fire_all_timers();
        assert_eq!(h.state(AlarmKind::Security), AlertState::Ready);
        let notices = h.feedback.keypad_notices();
        assert!(matches!(notices[0], KeypadNotice::Arming { mode: ArmMode::On, .. }));
        assert!(matches!(notices[1], KeypadNotice::Armed { mode: ArmMode::On, .. }));

        h.set(DOOR, attrs::CONTACT, attrs::CONTACT_OPENED);
        assert_eq!(h.state(AlarmKind::Security), AlertState::Prealert);
        assert_eq!(h.controller.alarm_state(), AggregateAlarmState::Prealert);
        assert!(h.controller.current_incident().is_some());

        h.fire_all_timers();
        assert_eq!(h.state(AlarmKind::Security), AlertState::Alert);
        assert_eq!(h.controller.alarm_state(), AggregateAlarmState::Alerting);
        assert!(h.feedback.keypad_notices().iter().any(|n| matches!(
            n,
            KeypadNotice::Alerting {
                keypad_mode: KeypadAlarmMode::Security(SecurityMode::On),
                led: LedState::AlarmTriggeredIntruder,
                ..
            }
        )));

        h.request(AlarmRequest::Disarm {
            disarmed_by: None,
            disarmed_from: Address::from(KEYPAD),
        })
        .unwrap();
        assert_eq!(h.state(AlarmKind::Security), AlertState::PendingClear);
        assert!(h.controller.current_incident().is_none());
        assert_eq!(
            h.controller.security().unwrap().last_disarmed_from,
            Some(Address::from(KEYPAD))
        );

        h.request(AlarmRequest::ClearIncident).unwrap();
        assert_eq!(h.state(AlarmKind::Security), AlertState::Disarmed);

        let report = h.sink.last().unwrap();
        assert_eq!(report.alarm_state, AggregateAlarmState::Ready);
        assert_eq!(
            report.alarm(AlarmKind::Security).unwrap().alert_state,
            AlertState::Disarmed
        );
    }

    #[test]
    fn test_verified_skips_entrance_delay() {
        let mut h = harness();
        h.request(arm("CLNT:app:1", 0)).unwrap();
        h.fire_all_timers();
        h.set(DOOR, attrs::CONTACT, attrs::CONTACT_OPENED);
        assert_eq!(h.state(AlarmKind::Security), AlertState::Prealert);

        h.request(AlarmRequest::Verified).unwrap();
        assert_eq!(h.state(AlarmKind::Security), AlertState::Alert);

        // the entrance delay fires late and finds nothing to do
        let timers = h.controller.take_timers();
        assert_eq!(timers.len(), 1);
        assert!(!h.controller.fire_timer(timers[0].fire));
        assert_eq!(h.state(AlarmKind::Security), AlertState::Alert);
    }

    #[test]
    fn test_stale_exit_delay_is_ignored() {
        let mut h = harness();
        h.request(arm("CLNT:app:1", 30)).unwrap();
        let first = h.controller.take_timers();

        h.request(AlarmRequest::Disarm {
            disarmed_by: None,
            disarmed_from: Address::from("CLNT:app:1"),
        })
        .unwrap();
        assert_eq!(h.state(AlarmKind::Security), AlertState::Disarmed);

        h.request(arm("CLNT:app:1", 30)).unwrap();
        let second = h.controller.take_timers();

        assert!(!h.controller.fire_timer(first[0].fire));
        assert_eq!(h.state(AlarmKind::Security), AlertState::Arming);

        assert!(h.controller.fire_timer(second[0].fire));
        assert_eq!(h.state(AlarmKind::Security), AlertState::Ready);
    }

    #[test]
    fn test_keypad_arm_failure_notifies_keypads() {
        let mut h = harness();
        h.registry
            .set_attribute(&Address::from(DOOR), attrs::CONTACT, attrs::CONTACT_OPENED);

        let err = h.request(arm(KEYPAD, 0)).unwrap_err();
        assert_eq!(
            err,
            AlarmError::TriggeredOrOfflineDevices(vec![Address::from(DOOR)])
        );
        assert!(h
            .feedback
            .keypad_notices()
            .iter()
            .any(|n| matches!(n, KeypadNotice::ArmFailed { .. })));

        assert_eq!(h.state(AlarmKind::Security), AlertState::Disarmed);
        assert!(h.controller.security().unwrap().current_active.is_empty());
    }

    #[test]
    fn test_suspended_hub_rejects_alarm_requests() {
        let mut h = build(Arc::new(MemoryStore::new()), false);
        assert_eq!(h.controller.activation(), ActivationState::Suspended);
        assert_eq!(h.controller.alarm_state(), AggregateAlarmState::Inactive);

        assert_eq!(h.request(arm("CLNT:app:1", 0)).unwrap_err(), AlarmError::Suspended);
        assert_eq!(
            h.request(AlarmRequest::Panic { source: None }).unwrap_err(),
            AlarmError::Suspended
        );

        // protocol messages are dropped
        h.controller
            .handle_protocol(ProtocolMessage::new(KEYPAD, ProtocolBody::PanicPressed));
        assert_eq!(h.state(AlarmKind::Panic), AlertState::Ready);

        // cue requests still drive the hardware
        h.feedback.take();
        h.request(AlarmRequest::SecurityDisarmed).unwrap();
        assert_eq!(h.feedback.sounds(), vec![SounderMode::SecurityAlarmOff]);
        assert_eq!(h.feedback.leds(), vec![LedState::AlarmOff]);

        assert!(matches!(
            h.request(AlarmRequest::Unsupported {
                message_type: "hubalarm:Reboot".to_string()
            }),
            Err(AlarmError::UnsupportedMessageType(_))
        ));
    }

    #[test]
    fn test_keypad_disarm_press() {
        let mut h = harness();
        h.request(arm("CLNT:app:1", 30)).unwrap();

        h.controller
            .handle_protocol(ProtocolMessage::new(KEYPAD, ProtocolBody::DisarmPressed));
        assert_eq!(h.state(AlarmKind::Security), AlertState::Disarmed);
        assert_eq!(h.feedback.keypad_notices().last(), Some(&KeypadNotice::Disarmed));
    }

    #[test]
    fn test_attribute_batch_reports_once() {
        let mut h = harness();
        h.sink.clear();

        h.set(SMOKE, attrs::SMOKE, attrs::SMOKE_DETECTED);
        assert_eq!(h.sink.len(), 1);
        let report = h.sink.last().unwrap();
        assert_eq!(report.alarm_state, AggregateAlarmState::Alerting);
        assert!(report.active_alerts.contains(&AlarmKind::Smoke));
        assert!(report.current_incident.is_some());
    }

    #[test]
    fn test_reconnect_reports() {
        let mut h = harness();
        let first = h.sink.reports()[0].clone();
        assert!(first.reconnect);

        h.sink.clear();
        h.controller.on_devices_updated();
        h.controller.run_deferred();
        assert!(h.sink.is_empty());

        h.controller.on_connected();
        h.controller.run_deferred();
        assert!(h.sink.last().unwrap().reconnect);
    }

    #[test]
    fn test_restart_resumes_from_store() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut h = build(store.clone(), true);
            h.request(arm("CLNT:app:1", 30)).unwrap();
            assert_eq!(h.state(AlarmKind::Security), AlertState::Arming);
        }

        // the exit delay did not survive the restart
        let h = build(store, false);
        assert_eq!(h.controller.activation(), ActivationState::Active);
        assert_eq!(h.state(AlarmKind::Security), AlertState::Ready);
        assert_eq!(h.controller.security().unwrap().mode, SecurityMode::On);
    }

    #[test]
    fn test_unknown_persisted_state_is_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.persist(KEY_STATE, serde_json::json!("HIBERNATING")).unwrap();

        let result = Controller::new(
            &test_config(),
            Arc::new(InMemoryRegistry::new()),
            Arc::new(RecordingFeedback::new()),
            store,
            Arc::new(RecordingSink::new()),
        );
        assert!(result.err().unwrap().is_fatal());
    }
}
