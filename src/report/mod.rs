// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Reporting projection - the attribute set published on every state change

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alarm::{AlarmKind, AlarmMachine, AlertState, IncidentTrigger, SecurityMode};
use crate::core::{ActivationState, AggregateAlarmState};
use crate::devices::{Address, Device};

/// Hub-wide alarm report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubAlarmReport {
    pub state: ActivationState,
    pub alarm_state: AggregateAlarmState,
    pub active_alerts: BTreeSet<AlarmKind>,
    pub available_alerts: BTreeSet<AlarmKind>,
    pub current_incident: Option<Uuid>,
    /// Set on the first report after device reconciliation or a reconnect.
    pub reconnect: bool,
    pub alarms: Vec<AlarmReport>,
    pub security: Option<SecurityReport>,
    pub timestamp: DateTime<Utc>,
}

impl HubAlarmReport {
    pub fn alarm(&self, kind: AlarmKind) -> Option<&AlarmReport> {
        self.alarms.iter().find(|a| a.kind == kind)
    }
}

/// Per-kind slice of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmReport {
    pub kind: AlarmKind,
    pub alert_state: AlertState,
    pub silent: bool,
    pub offline_devices: BTreeSet<Address>,
    pub triggered_devices: BTreeSet<Address>,
    pub triggers: Vec<IncidentTrigger>,
}

impl AlarmReport {
    pub fn from_machine(machine: &AlarmMachine, devices: &[Device]) -> Self {
        Self {
            kind: machine.kind(),
            alert_state: machine.state(),
            silent: machine.is_silent(),
            offline_devices: machine.offline_devices(devices),
            triggered_devices: machine.triggered_devices(devices),
            triggers: machine.triggers().as_slice().to_vec(),
        }
    }
}

/// Fields only security reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub mode: SecurityMode,
    pub arm_time: Option<DateTime<Utc>>,
    pub last_armed_time: Option<DateTime<Utc>>,
    pub last_armed_by: Option<Address>,
    pub last_armed_from: Option<Address>,
    pub last_disarmed_time: Option<DateTime<Utc>>,
    pub last_disarmed_by: Option<Address>,
    pub last_disarmed_from: Option<Address>,
    /// Every device security could use.
    pub devices: BTreeSet<Address>,
    /// Armed devices that are online and clear.
    pub active_devices: BTreeSet<Address>,
    pub excluded_devices: BTreeSet<Address>,
    pub prealert_end: Option<DateTime<Utc>>,
}

impl SecurityReport {
    pub fn from_machine(machine: &AlarmMachine, devices: &[Device]) -> Option<Self> {
        let ext = machine.security()?;
        Some(Self {
            mode: ext.mode,
            arm_time: ext.arm_time,
            last_armed_time: ext.last_armed_time,
            last_armed_by: ext.last_armed_by.clone(),
            last_armed_from: ext.last_armed_from.clone(),
            last_disarmed_time: ext.last_disarmed_time,
            last_disarmed_by: ext.last_disarmed_by.clone(),
            last_disarmed_from: ext.last_disarmed_from.clone(),
            devices: machine.supported_devices(devices),
            active_devices: machine.active_devices(devices),
            excluded_devices: ext.excluded.clone(),
            prealert_end: ext.prealert_end,
        })
    }
}

/// Where reports go.
pub trait ReportSink: Send + Sync {
    fn publish(&self, report: HubAlarmReport);
}

/// Sink that keeps every report, for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<HubAlarmReport>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<HubAlarmReport> {
        self.reports.lock().clone()
    }

    pub fn last(&self) -> Option<HubAlarmReport> {
        self.reports.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl ReportSink for RecordingSink {
    fn publish(&self, report: HubAlarmReport) {
        self.reports.lock().push(report);
    }
}
