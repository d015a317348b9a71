//! Impure I/O operations for the MQTT client
//!
//! Each [`MqttSession`] owns one rumqttc client/event loop pair. Nothing runs
//! in the background: the event loop is polled inline while connecting,
//! publishing and disconnecting, so the whole session lives on the caller's
//! task.

use super::connection::{classify_connect_failure, configure_mqtt_options};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::{MqttSection, PUBLISH_INTERVAL};
use crate::transport::{
    Broker, BrokerEndpoint, BrokerSession, ConnectionError, OutboundMessage, PublishError,
};
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Capacity of the client request channel; one message is in flight at a time
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Readings are confirmed by PUBACK
const PUBLISH_QOS: QoS = QoS::AtLeastOnce;

/// How long to wait for the DISCONNECT packet to be written
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Session factory backed by rumqttc
#[derive(Debug, Clone)]
pub struct MqttBroker {
    config: MqttSection,
    publish_interval: Duration,
}

impl MqttBroker {
    pub fn new(config: MqttSection) -> Self {
        Self {
            config,
            publish_interval: PUBLISH_INTERVAL,
        }
    }

    /// Poll until the broker accepts CONNECT
    ///
    /// A refusal code never shows up as an event: the event loop turns it
    /// into `ConnectionRefused` and it is classified from the poll error.
    async fn wait_for_connack(
        event_loop: &mut EventLoop,
        endpoint: &BrokerEndpoint,
    ) -> Result<(), ConnectionError> {
        loop {
            let event = event_loop
                .poll()
                .await
                .map_err(|e| classify_connect_failure(endpoint, e))?;

            match MessageHandler::route_mqtt_event(&event) {
                EventRoute::ConnectionAcknowledged => return Ok(()),
                route => debug!(target: "mqtt_transport", "Event while connecting: {:?}", route),
            }
        }
    }
}

#[async_trait]
impl Broker for MqttBroker {
    type Session = MqttSession;

    async fn connect(&mut self, endpoint: &BrokerEndpoint) -> Result<MqttSession, ConnectionError> {
        let options = configure_mqtt_options(endpoint, &self.config, self.publish_interval);
        debug!(
            client_id = %options.client_id(),
            keep_alive_secs = options.keep_alive().as_secs(),
            "Connecting to MQTT broker {}",
            endpoint
        );

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let timeout = self.config.connect_timeout();
        match tokio::time::timeout(timeout, Self::wait_for_connack(&mut event_loop, endpoint)).await {
            Ok(Ok(())) => {
                info!("MQTT client connected to host {}", endpoint);
                Ok(MqttSession {
                    client,
                    event_loop,
                    endpoint: endpoint.to_string(),
                    publish_timeout: self.config.publish_timeout(),
                    connected: true,
                })
            }
            Ok(Err(e)) => {
                if let ConnectionError::Refused { reason, .. } = &e {
                    debug!("Could not connect to {}: {}", endpoint, reason);
                }
                Err(e)
            }
            Err(_) => Err(ConnectionError::Timeout {
                endpoint: endpoint.to_string(),
                timeout,
            }),
        }
    }
}

/// One live MQTT connection
pub struct MqttSession {
    client: AsyncClient,
    event_loop: EventLoop,
    endpoint: String,
    publish_timeout: Duration,
    connected: bool,
}

impl MqttSession {
    /// Poll until the broker acknowledges the publish
    async fn wait_for_delivery(&mut self, message: &OutboundMessage) -> Result<(), PublishError> {
        loop {
            let event = match self.event_loop.poll().await {
                Ok(event) => event,
                Err(e) => {
                    self.connected = false;
                    return Err(PublishError::Dropped {
                        topic: message.topic.clone(),
                        source: Box::new(e),
                    });
                }
            };

            match MessageHandler::route_mqtt_event(&event) {
                EventRoute::PublishAcknowledged { .. } => return Ok(()),
                EventRoute::Disconnected => {
                    self.connected = false;
                    return Err(PublishError::Dropped {
                        topic: message.topic.clone(),
                        source: "broker sent DISCONNECT".into(),
                    });
                }
                route => debug!(target: "mqtt_transport", "Event while publishing: {:?}", route),
            }
        }
    }
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn publish(&mut self, message: &OutboundMessage) -> Result<(), PublishError> {
        if !self.connected {
            return Err(PublishError::Dropped {
                topic: message.topic.clone(),
                source: format!("session to {} is closed", self.endpoint).into(),
            });
        }

        self.client
            .publish(
                message.topic.as_str(),
                PUBLISH_QOS,
                message.retain,
                message.payload.clone(),
            )
            .await
            .map_err(|e| PublishError::Rejected {
                topic: message.topic.clone(),
                source: Box::new(e),
            })?;

        let timeout = self.publish_timeout;
        match tokio::time::timeout(timeout, self.wait_for_delivery(message)).await {
            Ok(result) => result,
            Err(_) => {
                // An unacknowledged QoS 1 message leaves the session in an unknown state
                self.connected = false;
                Err(PublishError::Timeout {
                    topic: message.topic.clone(),
                    timeout,
                })
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), ConnectionError> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;

        self.client
            .disconnect()
            .await
            .map_err(|e| ConnectionError::Network {
                endpoint: self.endpoint.clone(),
                source: Box::new(e),
            })?;

        // Drive the event loop until the DISCONNECT packet is flushed
        let flushed = tokio::time::timeout(DISCONNECT_GRACE, async {
            loop {
                match self.event_loop.poll().await {
                    Ok(event) => {
                        if MessageHandler::route_mqtt_event(&event) == EventRoute::DisconnectSent {
                            return true;
                        }
                    }
                    Err(_) => return false,
                }
            }
        })
        .await;

        if !matches!(flushed, Ok(true)) {
            warn!("DISCONNECT to {} was not confirmed, dropping connection", self.endpoint);
        }

        info!("MQTT client disconnected from host {}", self.endpoint);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
