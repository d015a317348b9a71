//! Pure routing of MQTT event loop events
//!
//! The client only cares about a handful of packets: CONNACK while
//! connecting, PUBACK while publishing and the outgoing DISCONNECT while
//! closing. Everything else is infrastructure noise.

use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet};

/// Routing decision for one event loop event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRoute {
    /// CONNACK with a success code
    ConnectionAcknowledged,
    /// QoS 1 delivery confirmed
    PublishAcknowledged { packet_id: u16 },
    /// Our DISCONNECT left the socket
    DisconnectSent,
    /// Broker closed the session
    Disconnected,
    /// Pings, other acks and anything else
    InfrastructureEvent(String),
}

pub struct MessageHandler;

impl MessageHandler {
    /// Route an event loop event (pure function)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) if connack.code == ConnectReturnCode::Success => {
                    EventRoute::ConnectionAcknowledged
                }
                Packet::PubAck(puback) => EventRoute::PublishAcknowledged {
                    packet_id: puback.pkid,
                },
                Packet::Disconnect => EventRoute::Disconnected,
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(other) => EventRoute::InfrastructureEvent(format!("{other:?}")),
        }
    }
}
