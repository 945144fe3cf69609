// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Incident trail - triggers recorded against an alarm while it is armed

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::Trigger;
use super::AlarmKind;
use crate::devices::Address;

/// Most triggers one alarm keeps for an incident. Later ones are dropped.
pub const MAX_TRIGGERS: usize = 100;

/// What an incident trigger records as having happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentEvent {
    Rule,
    Keypad,
    VerifiedAlarm,
    Contact,
    Motion,
    Smoke,
    Co,
    Leak,
    Glass,
}

impl IncidentEvent {
    /// Classify a trigger; panic triggers are told apart by who raised them.
    pub fn classify(source: &Address, trigger: Trigger) -> Self {
        match trigger {
            Trigger::Panic if source.is_rule() => IncidentEvent::Rule,
            Trigger::Panic if source.is_protocol() => IncidentEvent::Keypad,
            Trigger::Panic => IncidentEvent::VerifiedAlarm,
            Trigger::Contact | Trigger::Door => IncidentEvent::Contact,
            Trigger::Motion => IncidentEvent::Motion,
            Trigger::Smoke => IncidentEvent::Smoke,
            Trigger::Co => IncidentEvent::Co,
            Trigger::Water => IncidentEvent::Leak,
            Trigger::Glass => IncidentEvent::Glass,
        }
    }
}

/// One entry of an alarm's incident trail. Never modified once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentTrigger {
    pub source: Address,
    pub actor: Option<Address>,
    pub time: DateTime<Utc>,
    pub event: IncidentEvent,
    pub alarm: AlarmKind,
}

/// Ordered, capped list of incident triggers (oldest first).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerLog {
    entries: Vec<IncidentTrigger>,
}

impl TriggerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trigger. Returns false when the log is full and it was dropped.
    pub fn push(&mut self, trigger: IncidentTrigger) -> bool {
        if self.entries.len() >= MAX_TRIGGERS {
            return false;
        }
        self.entries.push(trigger);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IncidentTrigger> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[IncidentTrigger] {
        &self.entries
    }
}

/// Closed incident as written to the audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: Uuid,
    pub started: DateTime<Utc>,
    pub ended: DateTime<Utc>,
    pub alarms: Vec<AlarmKind>,
    pub triggers: Vec<IncidentTrigger>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(source: &str, event: IncidentEvent) -> IncidentTrigger {
        IncidentTrigger {
            source: Address::from(source),
            actor: None,
            time: Utc::now(),
            event,
            alarm: AlarmKind::Security,
        }
    }

    #[test]
    fn test_panic_classification() {
        assert_eq!(
            IncidentEvent::classify(&Address::from("SERV:rule:12"), Trigger::Panic),
            IncidentEvent::Rule
        );
        assert_eq!(
            IncidentEvent::classify(&Address::from("PROT:ZIGB:abcd"), Trigger::Panic),
            IncidentEvent::Keypad
        );
        assert_eq!(
            IncidentEvent::classify(&Address::from("SERV:person:1"), Trigger::Panic),
            IncidentEvent::VerifiedAlarm
        );
        assert_eq!(
            IncidentEvent::classify(&Address::from("DRIV:dev:1"), Trigger::Door),
            IncidentEvent::Contact
        );
        assert_eq!(
            IncidentEvent::classify(&Address::from("DRIV:dev:1"), Trigger::Water),
            IncidentEvent::Leak
        );
    }

    #[test]
    fn test_log_is_capped_and_keeps_oldest() {
        let mut log = TriggerLog::new();
        for i in 0..MAX_TRIGGERS {
            assert!(log.push(trigger(&format!("DRIV:dev:{}", i), IncidentEvent::Contact)));
        }
        assert!(!log.push(trigger("DRIV:dev:late", IncidentEvent::Contact)));

        assert_eq!(log.len(), MAX_TRIGGERS);
        assert_eq!(log.as_slice()[0].source.as_str(), "DRIV:dev:0");
        assert_eq!(log.as_slice()[MAX_TRIGGERS - 1].source.as_str(), "DRIV:dev:99");
    }
}
