// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! HubAlarm - hub-local alarm arbitration
//!
//! Runs the panic, smoke, CO, water and security alarms on the hub itself,
//! so the house keeps protecting itself while the uplink is down:
//! - one state machine per alarm kind, fed by device attribute changes
//! - transactional dispatch: every alarm accepts an event or none sees it
//! - a single hub-wide alarm state and incident id
//! - arbitration of the one sounder, LED and keypad set between alarms
//! - exit, entrance and motion-idle delays guarded by generation tokens
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Alarm Engine                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  requests / protocol / devices / timers                      │
//! │                 ↓ (one work queue)                           │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ Controller                                             │  │
//! │  │  Panic  Smoke  CO  Water  Security   (AlarmMachine)    │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │       ↓              ↓               ↓             ↓         │
//! │  ┌──────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐   │
//! │  │ Feedback │  │ Scheduler │  │ Attribute  │  │ EventBus │   │
//! │  │ (sounder │  │ (timers)  │  │ Store (db) │  │ → MQTT   │   │
//! │  │ LED, kp) │  │           │  │            │  │          │   │
//! │  └──────────┘  └───────────┘  └────────────┘  └──────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod alarm;
pub mod config;
pub mod core;
pub mod db;
pub mod devices;
pub mod error;
pub mod feedback;
pub mod protocol;
pub mod report;
pub mod streaming;

// Re-exports for convenience
pub use alarm::{AlarmKind, AlertState, SecurityMode};
pub use config::Config;
pub use core::{AggregateAlarmState, AlarmEngine, Controller, EngineHandle, EventBus};
pub use db::{AttributeStore, Database, MemoryStore};
pub use devices::{Address, DeviceRegistry, InMemoryRegistry};
pub use error::{AlarmError, Result};
pub use feedback::{Feedback, TracingFeedback};
pub use protocol::{AlarmRequest, AlarmResponse, PlatformRequest, ProtocolMessage};
pub use report::{HubAlarmReport, ReportSink};

/// HubAlarm version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// HubAlarm name
pub const NAME: &str = "HubAlarm";

/// Build info
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION.to_string(),
        rust_version: env!("CARGO_PKG_RUST_VERSION").to_string(),
        target: std::env::consts::ARCH.to_string(),
        os: std::env::consts::OS.to_string(),
        features: enabled_features(),
    }
}

/// Build information
#[derive(Debug, Clone)]
pub struct BuildInfo {
    pub version: String,
    pub rust_version: String,
    pub target: String,
    pub os: String,
    pub features: Vec<String>,
}

fn enabled_features() -> Vec<String> {
    let mut features = vec![];

    #[cfg(feature = "mqtt")]
    features.push("mqtt".to_string());

    features
}
