//! Test helpers and utilities for integration tests

use shtc3_publisher::config::{BrokerSection, PublisherConfig, SessionPolicy, TuningFile};
use shtc3_publisher::observability::LogHandle;
use shtc3_publisher::publisher::{LoopStats, PublishLoop};
use shtc3_publisher::reading::Measurement;
use shtc3_publisher::testing::{MockBroker, MockSensor};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

pub const TEST_TOPIC: &str = "home/livingroom/shtc3";

/// Broker section pointing at a local test broker
#[allow(dead_code)]
pub fn test_broker() -> BrokerSection {
    BrokerSection {
        host: "localhost".to_string(),
        port: 1883,
        username: "sensor".to_string(),
        password: "secret".to_string(),
        topic: TEST_TOPIC.to_string(),
    }
}

/// Create a test configuration with deterministic (jitter-free) backoff
#[allow(dead_code)]
pub fn test_config(policy: SessionPolicy) -> PublisherConfig {
    let mut tuning = TuningFile::default();
    tuning.backoff.jitter = 0.0;
    tuning.mqtt.session = policy;
    PublisherConfig::from_parts(test_broker(), tuning).expect("test config should validate")
}

/// Environment map with every broker variable set
#[allow(dead_code)]
pub fn full_env() -> HashMap<String, String> {
    [
        ("BROKER_HOST", "broker.local"),
        ("BROKER_PORT", "1883"),
        ("BROKER_USER", "sensor"),
        ("BROKER_PWD", "hunter2"),
        ("BROKER_TOPIC", TEST_TOPIC),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[allow(dead_code)]
pub fn living_room() -> Measurement {
    Measurement::new(21.5, 44.25)
}

/// Run a publish loop and request shutdown after `stop_after` (paused clock)
#[allow(dead_code)]
pub async fn run_loop_for(
    config: &PublisherConfig,
    sensor: MockSensor,
    broker: MockBroker,
    log: LogHandle,
    stop_after: Duration,
) -> LoopStats {
    let (tx, rx) = watch::channel(false);
    let publish_loop = PublishLoop::new(config, sensor, broker, log).with_seed(7);

    let stopper = async {
        tokio::time::sleep(stop_after).await;
        tx.send(true).expect("loop should still be listening");
    };

    let (stats, ()) = tokio::join!(publish_loop.run(rx), stopper);
    stats
}
