//! Broker transport
//!
//! The publish loop talks to the broker through [`Broker`] (session factory)
//! and [`BrokerSession`] (one live connection). The MQTT implementation is in
//! [`mqtt`]; tests use the mocks in [`crate::testing`].

use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Username/password pair sent in CONNECT
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Where to connect and as whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub credentials: Credentials,
}

impl BrokerEndpoint {
    pub fn from_config(broker: &crate::config::BrokerSection) -> Self {
        Self {
            host: broker.host.clone(),
            port: broker.port,
            credentials: Credentials {
                username: broker.username.clone(),
                password: broker.password.clone(),
            },
        }
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A message ready to be published
///
/// Sessions deliver every message at least once (QoS 1) and only report
/// success once the broker has acknowledged it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl OutboundMessage {
    /// Retained: the broker keeps the latest reading for new subscribers
    pub fn retained(topic: &str, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.to_string(),
            payload,
            retain: true,
        }
    }
}

/// Failures while establishing a session
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Broker {endpoint} refused the connection: {reason}")]
    Refused { endpoint: String, reason: String },
    #[error("Broker {endpoint} is unreachable")]
    Network {
        endpoint: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("No CONNACK from {endpoint} within {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },
}

/// Failures after the session was established
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Connection dropped while publishing to {topic}")]
    Dropped {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Publish to {topic} not acknowledged within {timeout:?}")]
    Timeout { topic: String, timeout: Duration },
    #[error("Publish to {topic} could not be queued")]
    Rejected {
        topic: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Opens broker sessions
///
/// One implementation per transport; the loop is generic over it so tests
/// can script broker behaviour.
#[async_trait::async_trait]
pub trait Broker: Send {
    type Session: BrokerSession;

    /// Connect and wait for the broker to accept the session
    async fn connect(&mut self, endpoint: &BrokerEndpoint) -> Result<Self::Session, ConnectionError>;
}

/// One established broker connection
#[async_trait::async_trait]
pub trait BrokerSession: Send {
    /// Publish and wait until the broker acknowledges the message
    async fn publish(&mut self, message: &OutboundMessage) -> Result<(), PublishError>;

    /// Send DISCONNECT; a no-op when the connection is already gone
    async fn disconnect(&mut self) -> Result<(), ConnectionError>;

    /// False once the connection is known to be dead
    fn is_connected(&self) -> bool;
}
