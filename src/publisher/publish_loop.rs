//! The read → connect → publish → sleep loop
//!
//! Every failure inside a cycle is caught here, logged with its source chain
//! and followed by a backoff delay. Nothing escapes except the shutdown
//! signal, which is honoured at every await point.

use super::backoff::Backoff;
use super::state::{LoopEvent, LoopState};
use crate::config::{PublisherConfig, SessionPolicy};
use crate::error::{error_chain, PublisherError, PublisherResult};
use crate::observability::LogHandle;
use crate::reading::Reading;
use crate::sensor::SensorReader;
use crate::transport::{Broker, BrokerEndpoint, BrokerSession, OutboundMessage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::sync::watch;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn};

/// Counters reported when the loop stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub published: u64,
    pub failures: u64,
}

pub struct PublishLoop<S, B>
where
    S: SensorReader,
    B: Broker,
{
    sensor: S,
    broker: B,
    endpoint: BrokerEndpoint,
    topic: String,
    policy: SessionPolicy,
    interval: Duration,
    backoff: Backoff,
    log: LogHandle,
    session: Option<B::Session>,
    state: LoopState,
    consecutive_failures: u32,
    stats: LoopStats,
    rng: StdRng,
}

impl<S, B> PublishLoop<S, B>
where
    S: SensorReader,
    B: Broker,
{
    pub fn new(config: &PublisherConfig, sensor: S, broker: B, log: LogHandle) -> Self {
        Self {
            sensor,
            broker,
            endpoint: BrokerEndpoint::from_config(&config.broker),
            topic: config.broker.topic.clone(),
            policy: config.mqtt.session,
            interval: config.publish_interval(),
            backoff: Backoff::from_config(&config.backoff),
            log,
            session: None,
            state: LoopState::Idle,
            consecutive_failures: 0,
            stats: LoopStats::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed jitter seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run cycles until `shutdown` becomes true
    ///
    /// All events are recorded through the loop's [`LogHandle`].
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> LoopStats {
        let dispatch = self.log.dispatch().clone();
        self.run_until_shutdown(shutdown)
            .with_subscriber(dispatch)
            .await
    }

    async fn run_until_shutdown(mut self, mut shutdown: watch::Receiver<bool>) -> LoopStats {
        info!(
            topic = %self.topic,
            interval_secs = self.interval.as_secs(),
            session_policy = ?self.policy,
            "Publish loop started for broker {}",
            self.endpoint
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                result = self.run_cycle() => result,
            };
            self.stats.cycles += 1;

            let pause = match outcome {
                Ok(reading) => {
                    self.transition(LoopEvent::Published);
                    self.consecutive_failures = 0;
                    self.stats.published += 1;
                    debug!("Next reading at {}", reading.timestamp + chrono_interval(self.interval));
                    self.interval
                }
                Err(e) => {
                    self.transition(LoopEvent::Failed);
                    self.handle_failure(&e)
                }
            };

            if !interruptible_sleep(&mut shutdown, pause).await {
                break;
            }
            self.transition(match self.state {
                LoopState::Error => LoopEvent::Recovered,
                _ => LoopEvent::SleepElapsed,
            });
        }

        self.close_session().await;
        info!(
            cycles = self.stats.cycles,
            published = self.stats.published,
            failures = self.stats.failures,
            "Publish loop stopped"
        );
        self.stats
    }

    /// One pass through Connecting and Publishing
    async fn run_cycle(&mut self) -> PublisherResult<Reading> {
        self.transition(LoopEvent::CycleStarted);

        let mut session = match self.session.take() {
            Some(session) if session.is_connected() => {
                debug!("Reusing broker session to {}", self.endpoint);
                session
            }
            _ => self.broker.connect(&self.endpoint).await?,
        };
        self.transition(LoopEvent::SessionReady);

        match self.publish_reading(&mut session).await {
            Ok(reading) => {
                match self.policy {
                    SessionPolicy::PerCycle => {
                        if let Err(e) = session.disconnect().await {
                            warn!("Disconnect after publish failed: {}", error_chain(&e));
                        }
                    }
                    SessionPolicy::Persistent => self.session = Some(session),
                }
                Ok(reading)
            }
            // A failed sensor read leaves a persistent session usable
            Err(e @ PublisherError::Sensor(_))
                if self.policy == SessionPolicy::Persistent && session.is_connected() =>
            {
                self.session = Some(session);
                Err(e)
            }
            Err(e) => {
                if let Err(close) = session.disconnect().await {
                    debug!("Disconnect after failure: {}", error_chain(&close));
                }
                Err(e)
            }
        }
    }

    async fn publish_reading(&mut self, session: &mut B::Session) -> PublisherResult<Reading> {
        let measurement = self.sensor.read()?;
        let reading = Reading::now(measurement);
        let message = OutboundMessage::retained(&self.topic, reading.to_payload()?);

        session.publish(&message).await?;

        info!(
            sensor = self.sensor.name(),
            temperature = reading.temperature,
            humidity = reading.humidity,
            "Published reading to {}",
            self.topic
        );
        Ok(reading)
    }

    /// Log the failure and compute the retry delay
    fn handle_failure(&mut self, error: &PublisherError) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.stats.failures += 1;

        let retry_in = self.backoff.delay(self.consecutive_failures, &mut self.rng);
        error!(
            error_kind = error.kind(),
            consecutive_failures = self.consecutive_failures,
            retry_in_ms = u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX),
            "Error publishing data: {}",
            error_chain(error)
        );
        retry_in
    }

    async fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.disconnect().await {
                warn!("Failed to close broker session: {}", error_chain(&e));
            }
        }
    }

    fn transition(&mut self, event: LoopEvent) {
        let next = self.state.next(event);
        if next != self.state {
            debug!(target: "publish_loop", "{} -> {}", self.state, next);
        }
        self.state = next;
    }
}

fn chrono_interval(interval: Duration) -> chrono::Duration {
    chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Resolve once shutdown has been requested
///
/// A dropped sender means nobody can request shutdown any more, so this
/// never resolves in that case.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Sleep for `duration` unless shutdown is requested first
///
/// Returns `true` when the full duration elapsed.
pub async fn interruptible_sleep(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = wait_for_shutdown(shutdown) => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Measurement;
    use crate::testing::mocks::{ConnectBehavior, MockBroker, MockSensor};
    use tokio::time::Instant;

    fn config_without_jitter(policy: SessionPolicy) -> PublisherConfig {
        let mut config = PublisherConfig::test_config();
        config.backoff.jitter = 0.0;
        config.mqtt.session = policy;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_interruptible_sleep_completes() {
        let (_tx, mut rx) = watch::channel(false);
        let start = Instant::now();
        assert!(interruptible_sleep(&mut rx, Duration::from_secs(900)).await);
        assert_eq!(start.elapsed(), Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interruptible_sleep_stops_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let start = Instant::now();

        let stopper = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            tx.send(true).unwrap();
        };
        let (slept, ()) = tokio::join!(interruptible_sleep(&mut rx, Duration::from_secs(900)), stopper);

        assert!(!slept);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_requested_shutdown_runs_no_cycle() {
        let (_tx, rx) = watch::channel(true);
        let broker = MockBroker::new();
        let publish_loop = PublishLoop::new(
            &PublisherConfig::test_config(),
            MockSensor::constant(Measurement::new(21.0, 40.0)),
            broker.clone(),
            LogHandle::disabled(),
        );

        let stats = publish_loop.run(rx).await;

        assert_eq!(stats, LoopStats::default());
        assert_eq!(broker.connect_attempts().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_reset_after_success() {
        let (tx, rx) = watch::channel(false);
        let broker = MockBroker::scripted(vec![
            ConnectBehavior::Unreachable,
            ConnectBehavior::Unreachable,
            ConnectBehavior::Accept,
            ConnectBehavior::Unreachable,
        ]);
        let publish_loop = PublishLoop::new(
            &config_without_jitter(SessionPolicy::PerCycle),
            MockSensor::constant(Measurement::new(21.0, 40.0)),
            broker.clone(),
            LogHandle::disabled(),
        );

        // 1s + 2s backoff, publish, 900s interval, then the fourth attempt fails
        let stopper = async {
            tokio::time::sleep(Duration::from_secs(1 + 2 + 900) + Duration::from_millis(500)).await;
            tx.send(true).unwrap();
        };
        let (stats, ()) = tokio::join!(publish_loop.run(rx), stopper);

        assert_eq!(stats.cycles, 4);
        assert_eq!(stats.published, 1);
        assert_eq!(stats.failures, 3);
        assert_eq!(broker.connect_attempts().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_session_is_reused() {
        let (tx, rx) = watch::channel(false);
        let broker = MockBroker::new();
        let publish_loop = PublishLoop::new(
            &config_without_jitter(SessionPolicy::Persistent),
            MockSensor::constant(Measurement::new(21.0, 40.0)),
            broker.clone(),
            LogHandle::disabled(),
        );

        let stopper = async {
            tokio::time::sleep(Duration::from_secs(3 * 900 + 1)).await;
            tx.send(true).unwrap();
        };
        let (stats, ()) = tokio::join!(publish_loop.run(rx), stopper);

        assert_eq!(stats.published, 4);
        assert_eq!(broker.connect_attempts().await, 1);
        // Closed once, at shutdown
        assert_eq!(broker.disconnects().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_cycle_session_disconnects_every_time() {
        let (tx, rx) = watch::channel(false);
        let broker = MockBroker::new();
        let publish_loop = PublishLoop::new(
            &config_without_jitter(SessionPolicy::PerCycle),
            MockSensor::constant(Measurement::new(21.0, 40.0)),
            broker.clone(),
            LogHandle::disabled(),
        );

        let stopper = async {
            tokio::time::sleep(Duration::from_secs(2 * 900 + 1)).await;
            tx.send(true).unwrap();
        };
        let (stats, ()) = tokio::join!(publish_loop.run(rx), stopper);

        assert_eq!(stats.published, 3);
        assert_eq!(broker.connect_attempts().await, 3);
        assert_eq!(broker.disconnects().await, 3);
    }

    #[test]
    fn test_new_loop_starts_idle() {
        let publish_loop = PublishLoop::new(
            &PublisherConfig::test_config(),
            MockSensor::constant(Measurement::new(21.0, 40.0)),
            MockBroker::new(),
            LogHandle::disabled(),
        )
        .with_seed(3);
        assert_eq!(publish_loop.state(), LoopState::Idle);
    }
}
