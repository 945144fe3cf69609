// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Timer scheduler for exit, entrance and motion-idle delays

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::engine::Work;
use crate::alarm::{TimerFire, TimerRequest};

/// Sleeps on behalf of the controller and feeds each fire back into the
/// engine's work queue, so timer callbacks are serialised like any other work.
///
/// Fires are never cancelled individually: a superseded timer still fires
/// and is dropped by the machine's generation check.
pub struct Scheduler {
    work_tx: mpsc::UnboundedSender<Work>,
    tasks: Arc<Mutex<HashMap<TimerFire, JoinHandle<()>>>>,
}

impl Scheduler {
    pub(crate) fn new(work_tx: mpsc::UnboundedSender<Work>) -> Self {
        Self {
            work_tx,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn schedule(&self, request: TimerRequest) {
        let TimerRequest { delay, fire } = request;
        let work_tx = self.work_tx.clone();
        let tasks = Arc::clone(&self.tasks);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tasks.lock().remove(&fire);
            if work_tx.send(Work::Timer(fire)).is_err() {
                trace!("engine gone, dropping {:?}", fire);
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.retain(|_, h| !h.is_finished());
        tasks.insert(fire, handle);
        debug!("scheduled {:?} in {:?}", fire, delay);
    }

    /// Timers still sleeping.
    pub fn pending(&self) -> usize {
        self.tasks.lock().values().filter(|h| !h.is_finished()).count()
    }

    pub fn cancel_all(&self) {
        for (_, handle) in self.tasks.lock().drain() {
            handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_fire_is_fed_back_as_work() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(tx);

        let fire = TimerFire::ExitDelay(Uuid::new_v4());
        scheduler.schedule(TimerRequest {
            delay: Duration::from_millis(10),
            fire,
        });

        match rx.recv().await {
            Some(Work::Timer(got)) => assert_eq!(got, fire),
            _ => panic!("expected timer work"),
        }
    }

    #[tokio::test]
    async fn test_cancel_all_aborts_sleepers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(tx);

        scheduler.schedule(TimerRequest {
            delay: Duration::from_secs(3600),
            fire: TimerFire::MotionIdle(Uuid::new_v4()),
        });
        assert_eq!(scheduler.pending(), 1);

        scheduler.cancel_all();
        assert_eq!(scheduler.pending(), 0);
        drop(scheduler);
        assert!(rx.recv().await.is_none());
    }
}
