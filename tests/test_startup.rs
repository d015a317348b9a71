//! Startup and shutdown sequence tests
//!
//! Drive `startup::run` the way the binary does, with an environment map,
//! mock hardware and a shutdown channel:
//! - A missing variable is fatal before the sensor or broker is touched
//! - A sensor that cannot be opened stops startup
//! - A shutdown request ends the loop with its stats and a final log line
//! - SIGTERM sets the shutdown flag

mod test_helpers;

use shtc3_publisher::config::{ConfigError, TuningFile};
use shtc3_publisher::sensor::SensorError;
use shtc3_publisher::startup::{self, StartupError};
use shtc3_publisher::testing::{capture_logs, MockBroker, MockSensor};
use std::cell::Cell;
use std::time::Duration;
use test_helpers::{full_env, living_room};
use tokio::sync::watch;

#[tokio::test]
async fn test_missing_topic_is_fatal_before_any_io() {
    // Arrange
    let (log, logs) = capture_logs();
    let mut env = full_env();
    env.remove("BROKER_TOPIC");
    let broker = MockBroker::new();
    let sensor_opened = Cell::new(false);
    let broker_built = Cell::new(false);
    let (_tx, rx) = watch::channel(false);

    // Act
    let result = startup::run(
        |name| env.get(name).cloned(),
        TuningFile::default(),
        |_| {
            sensor_opened.set(true);
            Ok(MockSensor::constant(living_room()))
        },
        |_| {
            broker_built.set(true);
            broker.clone()
        },
        log,
        rx,
    )
    .await;

    // Assert
    match result {
        Err(StartupError::Config(ConfigError::MissingEnvVars(names))) => {
            assert_eq!(names, vec!["BROKER_TOPIC"]);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(stats) => panic!("startup should fail, got {stats:?}"),
    }
    assert!(!sensor_opened.get());
    assert!(!broker_built.get());
    assert_eq!(broker.connect_attempts().await, 0);

    assert!(logs.contains("Fatal configuration error"));
    assert!(logs.contains("BROKER_TOPIC"));
    assert!(!logs.contains("Publish loop started"));
}

#[tokio::test]
async fn test_invalid_port_is_fatal() {
    let (log, logs) = capture_logs();
    let mut env = full_env();
    env.insert("BROKER_PORT".to_string(), "mqtt".to_string());
    let (_tx, rx) = watch::channel(false);

    let result = startup::run(
        |name| env.get(name).cloned(),
        TuningFile::default(),
        |_| Ok(MockSensor::constant(living_room())),
        |_| MockBroker::new(),
        log,
        rx,
    )
    .await;

    assert!(matches!(
        result,
        Err(StartupError::Config(ConfigError::InvalidPort(_)))
    ));
    assert_eq!(logs.count("Fatal configuration error"), 1);
}

#[tokio::test]
async fn test_sensor_open_failure_stops_startup() {
    let (log, logs) = capture_logs();
    let env = full_env();
    let broker = MockBroker::new();
    let (_tx, rx) = watch::channel(false);

    let result = startup::run(
        |name| env.get(name).cloned(),
        TuningFile::default(),
        |config| {
            Err::<MockSensor, _>(SensorError::BusOpen {
                device: config.sensor.i2c_device.display().to_string(),
                source: "No such file or directory".into(),
            })
        },
        |_| broker.clone(),
        log,
        rx,
    )
    .await;

    assert!(matches!(result, Err(StartupError::Sensor(_))));
    assert_eq!(broker.connect_attempts().await, 0);
    assert!(logs.contains("Failed to open sensor: Failed to open sensor bus /dev/i2c-1: No such file or directory"));
    assert!(!logs.contains("Publish loop started"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_request_returns_stats() {
    // Arrange
    let (log, logs) = capture_logs();
    let env = full_env();
    let broker = MockBroker::new();
    let (tx, rx) = watch::channel(false);

    // Act: one publish, then a shutdown while sleeping
    let stopper = async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        tx.send(true).expect("publisher should still be listening");
    };
    let (result, ()) = tokio::join!(
        startup::run(
            |name| env.get(name).cloned(),
            TuningFile::default(),
            |_| Ok(MockSensor::constant(living_room())),
            |_| broker.clone(),
            log,
            rx,
        ),
        stopper
    );

    // Assert
    let stats = result.expect("shutdown is a clean exit");
    assert_eq!(stats.cycles, 1);
    assert_eq!(stats.published, 1);
    assert_eq!(stats.failures, 0);
    assert_eq!(broker.get_published().await.len(), 1);

    assert!(logs.contains("Publish loop stopped"));
    assert!(logs.contains("Stopping publisher"));
    assert!(logs.contains("published=1"));
}

#[tokio::test]
async fn test_shutdown_before_first_cycle() {
    let (log, logs) = capture_logs();
    let env = full_env();
    let broker = MockBroker::new();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let stats = startup::run(
        |name| env.get(name).cloned(),
        TuningFile::default(),
        |_| Ok(MockSensor::constant(living_room())),
        |_| broker.clone(),
        log,
        rx,
    )
    .await
    .expect("shutdown is a clean exit");

    assert_eq!(stats.cycles, 0);
    assert_eq!(broker.connect_attempts().await, 0);
    assert!(logs.contains("Stopping publisher"));
}

#[tokio::test]
async fn test_sigterm_requests_shutdown() {
    let (log, logs) = capture_logs();
    let mut shutdown = startup::listen_for_signals(&log).expect("signal handlers should install");

    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("kill -TERM {}", std::process::id()))
        .status()
        .expect("sh should run");
    assert!(status.success());

    tokio::time::timeout(Duration::from_secs(5), shutdown.changed())
        .await
        .expect("shutdown flag should be set")
        .expect("signal task should still hold the sender");
    assert!(*shutdown.borrow());
    assert!(logs.contains("Received SIGTERM, shutting down gracefully..."));
}
