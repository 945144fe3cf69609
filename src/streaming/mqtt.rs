// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! MQTT publisher for alarm reports

use anyhow::{anyhow, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::StreamingConfig;
use crate::report::HubAlarmReport;

/// Publishes every report from the bus to one MQTT topic
pub struct MqttReporter {
    client: AsyncClient,
    topic: String,
}

impl MqttReporter {
    /// Must be called inside a tokio runtime; spawns the connection event loop.
    pub fn new(config: &StreamingConfig) -> Result<Self> {
        let mut options = MqttOptions::new(&config.mqtt_client_id, &config.mqtt_broker, config.mqtt_port);
        options.set_keep_alive(Duration::from_secs(config.mqtt_keep_alive_secs));

        if let (Some(username), Some(password)) = (&config.mqtt_username, &config.mqtt_password) {
            options.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 100);

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("MQTT connected");
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        debug!("MQTT disconnected");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT error: {:?}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        info!(
            "MQTT reporter for {}:{} on topic {}",
            config.mqtt_broker, config.mqtt_port, config.report_topic
        );

        Ok(Self {
            client,
            topic: config.report_topic.clone(),
        })
    }

    pub async fn publish(&self, report: &HubAlarmReport) -> Result<()> {
        let json = serde_json::to_vec(report)?;

        self.client
            .publish(&self.topic, QoS::AtLeastOnce, false, json)
            .await
            .map_err(|e| anyhow!("MQTT publish failed: {}", e))?;

        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| anyhow!("MQTT disconnect failed: {}", e))?;
        Ok(())
    }

    /// Forward reports from the bus until shutdown.
    pub fn spawn(
        self,
        mut reports: broadcast::Receiver<HubAlarmReport>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    report = reports.recv() => match report {
                        Ok(report) => {
                            if let Err(e) = self.publish(&report).await {
                                warn!("{}", e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("MQTT reporter lagged, skipped {} reports", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }

            if let Err(e) = self.disconnect().await {
                debug!("{}", e);
            }
        })
    }
}
