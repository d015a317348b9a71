//! Pure connection configuration for the MQTT client
//!
//! Builds `MqttOptions` from the endpoint and tuning section and maps
//! rumqttc connection failures onto [`ConnectionError`].

use crate::config::{MqttSection, SessionPolicy};
use crate::transport::{BrokerEndpoint, ConnectionError};
use rumqttc::{ConnectReturnCode, MqttOptions};
use std::time::Duration;

/// Largest keep-alive MQTT can express (u16 seconds)
const MAX_KEEP_ALIVE_SECS: u64 = u16::MAX as u64;

/// Slack added on top of the publish interval for persistent sessions
const PERSISTENT_KEEP_ALIVE_SLACK: Duration = Duration::from_secs(60);

/// Unique client id per connection so a stale session never blocks a new one
pub fn generate_client_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4().simple())
}

/// Keep-alive to announce in CONNECT
///
/// A persistent session is only driven once per publish interval, so the
/// keep-alive must outlast the interval or the broker drops the idle client.
pub fn effective_keep_alive(
    configured: Duration,
    policy: SessionPolicy,
    publish_interval: Duration,
) -> Duration {
    let wanted = match policy {
        SessionPolicy::PerCycle => configured,
        SessionPolicy::Persistent => configured.max(publish_interval + PERSISTENT_KEEP_ALIVE_SLACK),
    };
    wanted.min(Duration::from_secs(MAX_KEEP_ALIVE_SECS))
}

/// Build client options for one connection attempt
pub fn configure_mqtt_options(
    endpoint: &BrokerEndpoint,
    config: &MqttSection,
    publish_interval: Duration,
) -> MqttOptions {
    let client_id = generate_client_id(&config.client_id_prefix);
    let mut mqtt_options = MqttOptions::new(client_id, endpoint.host.clone(), endpoint.port);

    // Anonymous brokers are only used by local tests
    if !endpoint.credentials.username.is_empty() {
        mqtt_options.set_credentials(
            endpoint.credentials.username.clone(),
            endpoint.credentials.password.clone(),
        );
    }
    mqtt_options.set_clean_session(true);
    mqtt_options.set_keep_alive(effective_keep_alive(
        config.keep_alive(),
        config.session,
        publish_interval,
    ));

    mqtt_options
}

/// Human readable CONNACK return code
pub fn describe_return_code(code: ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::Success => "accepted",
        ConnectReturnCode::RefusedProtocolVersion => "unacceptable protocol version",
        ConnectReturnCode::BadClientId => "client identifier rejected",
        ConnectReturnCode::ServiceUnavailable => "server unavailable",
        ConnectReturnCode::BadUserNamePassword => "bad user name or password",
        ConnectReturnCode::NotAuthorized => "not authorized",
    }
}

/// Map an event loop failure during connect onto the crate error
pub fn classify_connect_failure(
    endpoint: &BrokerEndpoint,
    error: rumqttc::ConnectionError,
) -> ConnectionError {
    match error {
        rumqttc::ConnectionError::ConnectionRefused(code) => ConnectionError::Refused {
            endpoint: endpoint.to_string(),
            reason: describe_return_code(code).to_string(),
        },
        other => ConnectionError::Network {
            endpoint: endpoint.to_string(),
            source: Box::new(other),
        },
    }
}
