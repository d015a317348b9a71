//! Process startup and shutdown
//!
//! The binary hands [`run`] the process environment, the I2C sensor opener
//! and the rumqttc broker; tests hand it an environment map and mocks. The
//! order is fixed: configuration, then the sensor, then the publish loop.

use crate::config::{ConfigError, PublisherConfig, TuningFile};
use crate::error::error_chain;
use crate::observability::LogHandle;
use crate::publisher::{LoopStats, PublishLoop};
use crate::sensor::{SensorError, SensorReader};
use crate::transport::Broker;
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn};

/// Reasons the publisher never reaches its loop
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration")]
    Config(#[from] ConfigError),

    #[error("sensor unavailable")]
    Sensor(#[from] SensorError),
}

/// Validate the broker variables and the tuning, logging a fatal error
pub fn load_config<F>(lookup: F, tuning: TuningFile) -> Result<PublisherConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    PublisherConfig::load(lookup, tuning).map_err(|e| {
        error!("Fatal configuration error: {}", e);
        e
    })
}

/// Install SIGINT/SIGTERM handlers
///
/// The returned receiver flips to `true` on the first signal. Call this
/// before any slow startup work so an early signal still ends cleanly.
pub fn listen_for_signals(log: &LogHandle) -> std::io::Result<watch::Receiver<bool>> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::spawn(
        async move {
            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
            }
            if shutdown_tx.send(true).is_err() {
                warn!("Publish loop already stopped");
            }
        }
        .with_subscriber(log.dispatch().clone()),
    );

    Ok(shutdown_rx)
}

/// Configure, open the sensor and publish until `shutdown` is set
///
/// Neither `open_sensor` nor `make_broker` is called when the configuration
/// is invalid.
pub async fn run<F, O, S, M, B>(
    lookup: F,
    tuning: TuningFile,
    open_sensor: O,
    make_broker: M,
    log: LogHandle,
    shutdown: watch::Receiver<bool>,
) -> Result<LoopStats, StartupError>
where
    F: Fn(&str) -> Option<String>,
    O: FnOnce(&PublisherConfig) -> Result<S, SensorError>,
    S: SensorReader,
    M: FnOnce(&PublisherConfig) -> B,
    B: Broker,
{
    let dispatch = log.dispatch().clone();
    async move {
        let config = load_config(lookup, tuning)?;

        let sensor = open_sensor(&config).map_err(|e| {
            error!("Failed to open sensor: {}", error_chain(&e));
            e
        })?;
        let broker = make_broker(&config);

        let stats = PublishLoop::new(&config, sensor, broker, log)
            .run(shutdown)
            .await;

        info!(
            cycles = stats.cycles,
            published = stats.published,
            failures = stats.failures,
            "Stopping publisher"
        );
        Ok::<_, StartupError>(stats)
    }
    .with_subscriber(dispatch)
    .await
}
