//! MQTT transport built on rumqttc
//!
//! This module keeps pure functions apart from I/O:
//!
//! - [`connection`] - Client options, keep-alive and error mapping
//! - [`message_handler`] - Event loop event routing
//! - [`client`] - Session factory and live session (impure)
//!
//! # Usage
//!
//! ```rust,no_run
//! use shtc3_publisher::config::MqttSection;
//! use shtc3_publisher::transport::mqtt::MqttBroker;
//! use shtc3_publisher::transport::{
//!     Broker, BrokerEndpoint, BrokerSession, Credentials, OutboundMessage,
//! };
//!
//! # tokio_test_block_on(async {
//! let endpoint = BrokerEndpoint {
//!     host: "localhost".to_string(),
//!     port: 1883,
//!     credentials: Credentials {
//!         username: "sensor".to_string(),
//!         password: "secret".to_string(),
//!     },
//! };
//!
//! let mut broker = MqttBroker::new(MqttSection::default());
//! let mut session = broker.connect(&endpoint).await?;
//! session
//!     .publish(&OutboundMessage::retained("home/shtc3", b"{}".to_vec()))
//!     .await?;
//! session.disconnect().await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

// Re-export public types for convenience
pub use client::{MqttBroker, MqttSession};
pub use connection::{configure_mqtt_options, effective_keep_alive};
pub use message_handler::{EventRoute, MessageHandler};
