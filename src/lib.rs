//! SHTC3 climate publisher
//!
//! Samples a Sensirion SHTC3 temperature/humidity sensor every 15 minutes and
//! publishes each reading as retained JSON over MQTT.
//!
//! # Overview
//!
//! - [`sensor`]: the [`SensorReader`] trait and the I2C SHTC3 driver
//! - [`transport`]: the [`Broker`](transport::Broker) session traits and their MQTT implementation
//! - [`publisher`]: the publish loop, its state machine and the retry backoff
//! - [`observability`]: console plus rotating file logging behind a [`LogHandle`]
//! - [`config`]: environment and TOML configuration
//! - [`startup`]: the configure, open, publish and shutdown sequence behind the binary
//!
//! # Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use shtc3_publisher::reading::{Measurement, Reading};
//!
//! let timestamp = NaiveDate::from_ymd_opt(2024, 3, 1)
//!     .unwrap()
//!     .and_hms_opt(14, 15, 0)
//!     .unwrap();
//! let reading = Reading::new(timestamp, Measurement::new(21.5, 44.25));
//!
//! let payload = String::from_utf8(reading.to_payload().unwrap()).unwrap();
//! assert_eq!(
//!     payload,
//!     r#"{"timestamp":"2024-03-01 14:15:00","temperature":21.5,"humidity":44.25}"#
//! );
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod publisher;
pub mod reading;
pub mod sensor;
pub mod startup;
pub mod testing;
pub mod transport;

pub use config::{PublisherConfig, SessionPolicy};
pub use error::{PublisherError, PublisherResult};
pub use observability::LogHandle;
pub use publisher::{LoopStats, PublishLoop};
pub use reading::{Measurement, Reading};
pub use sensor::{SensorError, SensorReader};
pub use transport::mqtt::MqttBroker;
