// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Event bus fanning alarm reports out to every subscriber

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::trace;

use crate::report::{HubAlarmReport, ReportSink};

/// Central pub/sub for hub alarm reports
pub struct EventBus {
    report_tx: broadcast::Sender<HubAlarmReport>,
    report_counter: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (report_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            report_tx,
            report_counter: AtomicU64::new(0),
        }
    }

    pub fn subscribe_reports(&self) -> broadcast::Receiver<HubAlarmReport> {
        self.report_tx.subscribe()
    }

    /// Reports published since startup, delivered or not.
    pub fn published(&self) -> u64 {
        self.report_counter.load(Ordering::Relaxed)
    }
}

impl ReportSink for EventBus {
    fn publish(&self, report: HubAlarmReport) {
        let id = self.report_counter.fetch_add(1, Ordering::Relaxed);
        // no subscribers is fine
        if self.report_tx.send(report).is_err() {
            trace!("report {} had no subscribers", id);
        }
    }
}
