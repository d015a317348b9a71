//! Mock implementations for testing
//!
//! Provides a scripted sensor and a scripted broker so the publish loop can be
//! exercised without I2C hardware or an MQTT broker.

use crate::reading::Measurement;
use crate::sensor::{SensorError, SensorReader};
use crate::transport::{
    Broker, BrokerEndpoint, BrokerSession, ConnectionError, OutboundMessage, PublishError,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, PoisonError};
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Mock sensor for testing
///
/// Plays back `steps` in order (`None` = the device does not answer), then
/// keeps returning `fallback`.
#[derive(Debug, Clone)]
pub struct MockSensor {
    steps: Arc<std::sync::Mutex<VecDeque<Option<Measurement>>>>,
    fallback: Option<Measurement>,
    reads: Arc<std::sync::Mutex<usize>>,
}

impl MockSensor {
    pub fn constant(measurement: Measurement) -> Self {
        Self::scripted(Vec::new(), Some(measurement))
    }

    pub fn scripted(steps: Vec<Option<Measurement>>, fallback: Option<Measurement>) -> Self {
        Self {
            steps: Arc::new(std::sync::Mutex::new(steps.into())),
            fallback,
            reads: Arc::new(std::sync::Mutex::new(0)),
        }
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SensorReader for MockSensor {
    fn name(&self) -> &str {
        "mock-shtc3"
    }

    fn read(&mut self) -> Result<Measurement, SensorError> {
        *self.reads.lock().unwrap_or_else(PoisonError::into_inner) += 1;

        let step = self
            .steps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.fallback);

        step.ok_or_else(|| SensorError::Unresponsive {
            device: self.name().to_string(),
            message: "no acknowledge from 0x70".to_string(),
        })
    }
}

/// How the mock broker answers one connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// CONNACK accepted, publishes are acknowledged
    Accept,
    /// CONNACK with "bad user name or password"
    RefuseAuth,
    /// TCP connect fails
    Unreachable,
    /// CONNACK accepted, connection drops before PUBACK
    DropOnPublish,
    /// CONNACK never arrives
    HangOnConnect,
    /// CONNACK accepted, PUBACK never arrives
    HangOnPublish,
}

/// A message as the mock broker received it
#[derive(Debug, Clone)]
pub struct PublishRecord {
    pub message: OutboundMessage,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct BrokerState {
    script: VecDeque<ConnectBehavior>,
    connect_attempts: usize,
    disconnects: usize,
    published: Vec<PublishRecord>,
}

/// Mock broker for testing
///
/// Each connect attempt consumes the next scripted behaviour; once the
/// script runs out every attempt is accepted.
#[derive(Debug, Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<ConnectBehavior>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                script: script.into(),
                ..Default::default()
            })),
        }
    }

    /// Every connect attempt is refused
    pub fn with_failure() -> Self {
        Self::scripted(vec![ConnectBehavior::RefuseAuth; 1024])
    }

    pub async fn connect_attempts(&self) -> usize {
        self.state.lock().await.connect_attempts
    }

    pub async fn disconnects(&self) -> usize {
        self.state.lock().await.disconnects
    }

    pub async fn get_published(&self) -> Vec<PublishRecord> {
        self.state.lock().await.published.clone()
    }
}

#[async_trait]
impl Broker for MockBroker {
    type Session = MockSession;

    async fn connect(&mut self, endpoint: &BrokerEndpoint) -> Result<MockSession, ConnectionError> {
        let behavior = {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.script.pop_front().unwrap_or(ConnectBehavior::Accept)
        };

        match behavior {
            ConnectBehavior::RefuseAuth => Err(ConnectionError::Refused {
                endpoint: endpoint.to_string(),
                reason: "bad user name or password".to_string(),
            }),
            ConnectBehavior::Unreachable => Err(ConnectionError::Network {
                endpoint: endpoint.to_string(),
                source: Box::new(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )),
            }),
            ConnectBehavior::HangOnConnect => std::future::pending().await,
            accepted => Ok(MockSession {
                state: self.state.clone(),
                behavior: accepted,
                connected: true,
            }),
        }
    }
}

/// Session handed out by [`MockBroker`]
#[derive(Debug)]
pub struct MockSession {
    state: Arc<Mutex<BrokerState>>,
    behavior: ConnectBehavior,
    connected: bool,
}

#[async_trait]
impl BrokerSession for MockSession {
    async fn publish(&mut self, message: &OutboundMessage) -> Result<(), PublishError> {
        if !self.connected {
            return Err(PublishError::Dropped {
                topic: message.topic.clone(),
                source: "session is closed".into(),
            });
        }

        match self.behavior {
            ConnectBehavior::DropOnPublish => {
                self.connected = false;
                Err(PublishError::Dropped {
                    topic: message.topic.clone(),
                    source: Box::new(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    )),
                })
            }
            ConnectBehavior::HangOnPublish => std::future::pending().await,
            _ => {
                self.state.lock().await.published.push(PublishRecord {
                    message: message.clone(),
                    at: Instant::now(),
                });
                Ok(())
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        if self.connected {
            self.connected = false;
            self.state.lock().await.disconnects += 1;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
