//! Sensor measurements and the JSON message published for each cycle
//!
//! A [`Measurement`] is what the driver returns. The publish loop stamps it
//! with the local wall clock to get a [`Reading`], which serializes to
//!
//! ```json
//! {"timestamp":"2024-03-01 14:15:00","temperature":21.37,"humidity":44.8}
//! ```

use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};

/// Wire format of [`Reading::timestamp`]
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Raw values from the sensor driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Degrees Celsius
    pub temperature: f64,
    /// Percent relative humidity
    pub humidity: f64,
}

impl Measurement {
    pub fn new(temperature: f64, humidity: f64) -> Self {
        Self {
            temperature,
            humidity,
        }
    }

    /// JSON has no representation for NaN or infinity
    pub fn is_finite(&self) -> bool {
        self.temperature.is_finite() && self.humidity.is_finite()
    }
}

/// One published sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub temperature: f64,
    pub humidity: f64,
}

impl Reading {
    /// Stamp a measurement; sub-second precision is dropped
    pub fn new(timestamp: NaiveDateTime, measurement: Measurement) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(0),
            temperature: measurement.temperature,
            humidity: measurement.humidity,
        }
    }

    /// Stamp a measurement with the current local time
    pub fn now(measurement: Measurement) -> Self {
        Self::new(Local::now().naive_local(), measurement)
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// UTF-8 JSON payload for the MQTT message
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}
