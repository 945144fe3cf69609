// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! Alarm engine - a single task that owns the controller and drains its
//! work queue one item at a time

use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Controller, Scheduler};
use crate::alarm::TimerFire;
use crate::devices::Address;
use crate::error::{AlarmError, Result};
use crate::protocol::{AlarmResponse, PlatformRequest, ProtocolMessage};

/// One unit of work for the engine task
pub(crate) enum Work {
    Request(PlatformRequest, oneshot::Sender<Result<AlarmResponse>>),
    Protocol(ProtocolMessage),
    DevicesUpdated,
    DeviceOnline(Address),
    DeviceOffline(Address),
    Timer(TimerFire),
    Connected,
    Shutdown,
}

/// Owns the [`Controller`] and serialises every request, device change and
/// timer fire onto it
pub struct AlarmEngine {
    controller: Controller,
    work_rx: mpsc::UnboundedReceiver<Work>,
    scheduler: Scheduler,
}

impl AlarmEngine {
    pub fn new(controller: Controller) -> (Self, EngineHandle) {
        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let engine = Self {
            controller,
            work_rx,
            scheduler: Scheduler::new(work_tx.clone()),
        };
        (engine, EngineHandle { work_tx })
    }

    /// Run on a background task; the controller is handed back on shutdown.
    pub fn spawn(self) -> JoinHandle<Controller> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> Controller {
        info!("Starting alarm engine...");
        let start = Instant::now();
        self.schedule_timers();

        while let Some(work) = self.work_rx.recv().await {
            match work {
                Work::Request(request, reply) => {
                    let response = self.controller.handle_request(request);
                    if let Err(e) = &response {
                        debug!("request refused: {} ({})", e, e.code());
                    }
                    if reply.send(response).is_err() {
                        debug!("requester went away before the response");
                    }
                }
                Work::Protocol(message) => self.controller.handle_protocol(message),
                Work::DevicesUpdated => self.controller.on_devices_updated(),
                Work::DeviceOnline(address) => self.controller.on_device_online(&address),
                Work::DeviceOffline(address) => self.controller.on_device_offline(&address),
                Work::Timer(fire) => {
                    self.controller.fire_timer(fire);
                }
                Work::Connected => self.controller.on_connected(),
                Work::Shutdown => break,
            }

            self.controller.run_deferred();
            self.schedule_timers();
        }

        if self.scheduler.pending() > 0 {
            warn!("dropping {} pending alarm timers", self.scheduler.pending());
        }
        self.scheduler.cancel_all();
        info!("Alarm engine stopped after {}s", start.elapsed().as_secs());
        self.controller
    }

    fn schedule_timers(&mut self) {
        for timer in self.controller.take_timers() {
            self.scheduler.schedule(timer);
        }
    }
}

/// Cheap, cloneable way into a running [`AlarmEngine`]
#[derive(Clone)]
pub struct EngineHandle {
    work_tx: mpsc::UnboundedSender<Work>,
}

impl EngineHandle {
    /// Submit a platform request and wait for its answer.
    pub async fn request(&self, request: PlatformRequest) -> Result<AlarmResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Work::Request(request, reply_tx))?;
        reply_rx.await.map_err(|_| AlarmError::EngineStopped)?
    }

    pub fn protocol(&self, message: ProtocolMessage) -> Result<()> {
        self.send(Work::Protocol(message))
    }

    /// The registry's device population changed.
    pub fn devices_updated(&self) -> Result<()> {
        self.send(Work::DevicesUpdated)
    }

    pub fn device_online(&self, address: Address) -> Result<()> {
        self.send(Work::DeviceOnline(address))
    }

    pub fn device_offline(&self, address: Address) -> Result<()> {
        self.send(Work::DeviceOffline(address))
    }

    /// The uplink reconnected.
    pub fn connected(&self) -> Result<()> {
        self.send(Work::Connected)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Work::Shutdown)
    }

    fn send(&self, work: Work) -> Result<()> {
        self.work_tx.send(work).map_err(|_| AlarmError::EngineStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::alarm::{AlarmKind, AlertState, ArmMode};
    use crate::config::Config;
    use crate::core::{AggregateAlarmState, EventBus};
    use crate::db::MemoryStore;
    use crate::devices::{attrs, Capability, Device, InMemoryRegistry};
    use crate::feedback::RecordingFeedback;
    use crate::protocol::{AlarmRequest, ArmRequest, ProtocolBody};

    const DOOR: &str = "DRIV:dev:door";

    fn start() -> (EngineHandle, JoinHandle<Controller>, Arc<EventBus>, Arc<InMemoryRegistry>) {
        let registry = Arc::new(InMemoryRegistry::with_devices([
            Device::new(DOOR, &[Capability::Contact]).with_attribute(attrs::CONTACT, attrs::CONTACT_CLOSED),
        ]));
        let bus = Arc::new(EventBus::new(64));
        let mut config = Config::default();
        config.hub.voice_cues = false;

        let controller = Controller::new(
            &config,
            registry.clone(),
            Arc::new(RecordingFeedback::new()),
            Arc::new(MemoryStore::new()),
            bus.clone(),
        )
        .unwrap();

        let (engine, handle) = AlarmEngine::new(controller);
        (handle, engine.spawn(), bus, registry)
    }

    fn arm_now() -> PlatformRequest {
        PlatformRequest::new(
            "SERV:person:1",
            AlarmRequest::Arm(ArmRequest {
                mode: ArmMode::Partial,
                bypassed: false,
                entrance_delay_secs: Some(0),
                exit_delay_secs: Some(0),
                sensitivity_device_count: None,
                silent: false,
                sounds_enabled: true,
                active_devices: [Address::from(DOOR)].into_iter().collect(),
                armed_by: None,
                armed_from: Address::from("CLNT:app:1"),
            }),
        )
    }

    #[tokio::test]
    async fn test_requests_are_answered_in_order() {
        let (handle, task, bus, _) = start();
        let mut reports = bus.subscribe_reports();

        handle.devices_updated().unwrap();
        let err = handle.request(arm_now()).await.unwrap_err();
        assert_eq!(err, AlarmError::Suspended);

        let response = handle
            .request(PlatformRequest::new("SERV:person:1", AlarmRequest::Activate))
            .await
            .unwrap();
        assert_eq!(response, AlarmResponse::Activated);

        let first = reports.recv().await.unwrap();
        assert!(first.reconnect);

        handle.shutdown().unwrap();
        let controller = task.await.unwrap();
        assert!(controller.is_active());
        assert_eq!(controller.alarm_state(), AggregateAlarmState::Ready);
    }

    #[tokio::test]
    async fn test_timers_run_through_the_queue() {
        let (handle, task, _bus, registry) = start();
        handle.devices_updated().unwrap();
        handle
            .request(PlatformRequest::new("SERV:person:1", AlarmRequest::Activate))
            .await
            .unwrap();

        handle.request(arm_now()).await.unwrap();
        // let the zero-length exit delay come back round
        tokio::time::sleep(Duration::from_millis(50)).await;

        registry.set_attribute(&Address::from(DOOR), attrs::CONTACT, attrs::CONTACT_OPENED);
        handle
            .protocol(ProtocolMessage::attributes(DOOR, [(attrs::CONTACT, attrs::CONTACT_OPENED)]))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle.shutdown().unwrap();
        let controller = task.await.unwrap();
        let security = controller.machine(AlarmKind::Security).unwrap();
        assert_eq!(security.state(), AlertState::Alert);
        assert_eq!(controller.active_alerts(), &BTreeSet::from([AlarmKind::Security]));
        assert!(controller.current_incident().is_some());
    }

    #[tokio::test]
    async fn test_handle_fails_once_engine_stops() {
        let (handle, task, _bus, _) = start();
        handle.shutdown().unwrap();
        task.await.unwrap();

        assert_eq!(
            handle.protocol(ProtocolMessage::new("PROT:ZIGB:kp", ProtocolBody::PanicPressed)),
            Err(AlarmError::EngineStopped)
        );
        assert_eq!(
            handle
                .request(PlatformRequest::new("SERV:person:1", AlarmRequest::Activate))
                .await,
            Err(AlarmError::EngineStopped)
        );
    }
}
