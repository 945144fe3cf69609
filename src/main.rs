// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/hubalarm

//! HubAlarm - hub-local alarm arbitration daemon
//!
//! Loads the configuration, restores every alarm from the attribute store and
//! runs the alarm engine until Ctrl+C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use hubalarm::{
    build_info, AlarmEngine, AttributeStore, Config, Controller, Database, EventBus, InMemoryRegistry, MemoryStore,
    TracingFeedback, NAME, VERSION,
};

/// HubAlarm - hub-local alarm arbitration engine
#[derive(Parser, Debug)]
#[command(name = "hubalarm")]
#[command(author = "bad-antics")]
#[command(version = VERSION)]
#[command(about = "Security, panic, smoke, CO and water alarms that keep working offline")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// MQTT broker address; enables report publishing
    #[arg(long)]
    mqtt_broker: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration before logging so its level applies
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let build = build_info();
    info!("{} v{} ({}/{}, features: {:?})", NAME, VERSION, build.os, build.target, build.features);
    info!("Configuration loaded from {:?}", config_path);

    // Override with command line args
    if let Some(data_dir) = args.data_dir {
        config.database.path = data_dir.join("hubalarm.db");
        config.data_dir = data_dir;
    }
    if let Some(mqtt) = args.mqtt_broker {
        config.streaming.mqtt_enabled = true;
        config.streaming.mqtt_broker = mqtt;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

/// Standalone wiring with an empty device registry and no inbound transport.
/// Embedders supply their own [`hubalarm::DeviceRegistry`] and feed requests
/// and protocol messages through the [`hubalarm::EngineHandle`].
async fn run(config: Config) -> Result<()> {
    let store: Arc<dyn AttributeStore> = if config.database.enabled {
        let db = Database::open(&config.database)?;
        match db.cleanup(config.database.retention_days) {
            Ok(removed) if removed > 0 => info!("Removed {} expired incidents", removed),
            Ok(_) => {}
            Err(e) => warn!("Incident cleanup failed: {}", e),
        }
        Arc::new(db)
    } else {
        warn!("Database disabled, alarm state will not survive a restart");
        Arc::new(MemoryStore::new())
    };

    // populated by the embedding platform, never by the daemon itself
    let registry = Arc::new(InMemoryRegistry::new());
    let bus = Arc::new(EventBus::new(config.alarm.queue_capacity));
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    #[cfg(feature = "mqtt")]
    let reporter = if config.streaming.mqtt_enabled {
        let reporter = hubalarm::streaming::MqttReporter::new(&config.streaming)?;
        Some(reporter.spawn(bus.subscribe_reports(), shutdown_tx.subscribe()))
    } else {
        None
    };

    let controller = Controller::new(&config, registry, Arc::new(TracingFeedback), store, bus.clone())?;
    let (engine, handle) = AlarmEngine::new(controller);
    let engine_task = engine.spawn();

    handle.devices_updated()?;
    handle.connected()?;

    info!("🚨 {} running", NAME);
    info!("   Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");

    let _ = shutdown_tx.send(());
    handle.shutdown()?;
    let controller = engine_task.await?;
    info!(
        "Final state {} / {:?}, {} reports published",
        controller.activation(),
        controller.alarm_state(),
        bus.published()
    );

    #[cfg(feature = "mqtt")]
    {
        if let Some(reporter) = reporter {
            if let Err(e) = reporter.await {
                warn!("MQTT reporter ended abnormally: {}", e);
            }
        }
    }

    info!("{} shutdown complete", NAME);

    Ok(())
}
