//! Configuration for the SHTC3 publisher
//!
//! Broker settings come from the environment only (`BROKER_HOST`,
//! `BROKER_PORT`, `BROKER_USER`, `BROKER_PWD`, `BROKER_TOPIC`). The MQTT
//! session, retry backoff, sensor bus and log file can be tuned from an
//! optional TOML file. The publish interval is fixed.

use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_BROKER_HOST: &str = "BROKER_HOST";
pub const ENV_BROKER_PORT: &str = "BROKER_PORT";
pub const ENV_BROKER_USER: &str = "BROKER_USER";
pub const ENV_BROKER_PWD: &str = "BROKER_PWD";
pub const ENV_BROKER_TOPIC: &str = "BROKER_TOPIC";

/// Every variable that must be present before the publisher starts
pub const REQUIRED_ENV_VARS: [&str; 5] = [
    ENV_BROKER_HOST,
    ENV_BROKER_PORT,
    ENV_BROKER_USER,
    ENV_BROKER_PWD,
    ENV_BROKER_TOPIC,
];

/// Time between two successful publishes (15 minutes)
pub const PUBLISH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Complete publisher configuration
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PublisherConfig {
    pub broker: BrokerSection,
    pub mqtt: MqttSection,
    pub backoff: BackoffSection,
    pub sensor: SensorSection,
    pub logging: LoggingSection,
}

/// Broker endpoint, credentials and topic, read from the environment
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BrokerSection {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(serialize_with = "redacted")]
    pub password: String,
    pub topic: String,
}

/// How the broker session is managed between cycles
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPolicy {
    /// Connect, publish and disconnect on every cycle
    #[default]
    PerCycle,
    /// Keep the session open across cycles, reconnect after a failure
    Persistent,
}

/// MQTT session tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MqttSection {
    /// Keep-alive in seconds (raised above the publish interval for persistent sessions)
    pub keep_alive_secs: u64,
    /// How long to wait for CONNACK
    pub connect_timeout_secs: u64,
    /// How long to wait for PUBACK
    pub publish_timeout_secs: u64,
    /// Prefix of the generated client id
    pub client_id_prefix: String,
    pub session: SessionPolicy,
}

impl Default for MqttSection {
    fn default() -> Self {
        Self {
            keep_alive_secs: 60,
            connect_timeout_secs: 30,
            publish_timeout_secs: 30,
            client_id_prefix: "shtc3-publisher".to_string(),
            session: SessionPolicy::PerCycle,
        }
    }
}

impl MqttSection {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}

/// Retry backoff after a failed cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffSection {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    /// Relative jitter, 0.2 means +/- 20%
    pub jitter: f64,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial_ms: 1_000,
            max_ms: 5 * 60 * 1_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Sensor bus settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SensorSection {
    pub i2c_device: PathBuf,
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            i2c_device: PathBuf::from("/dev/i2c-1"),
        }
    }
}

/// Rotating log file settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub file: PathBuf,
    pub max_bytes: u64,
    pub backups: usize,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            file: PathBuf::from("/logs/shtc3_publisher.log"),
            max_bytes: 500_000_000,
            backups: 1,
        }
    }
}

/// Optional TOML overrides for everything except the broker section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TuningFile {
    pub mqtt: MqttSection,
    pub backoff: BackoffSection,
    pub sensor: SensorSection,
    pub logging: LoggingSection,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingEnvVars(Vec<String>),
    #[error("Invalid BROKER_PORT '{0}': expected a port number between 1 and 65535")]
    InvalidPort(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TuningFile {
    /// Load tuning overrides from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let tuning: TuningFile = toml::from_str(&content)?;
        Ok(tuning)
    }
}

/// Variable lookup backed by the process environment
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl BrokerSection {
    /// Read the broker section through an arbitrary variable lookup
    ///
    /// Blank values count as missing. All missing names are reported together.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut get = |name: &str| match lookup(name) {
            Some(value) if !value.trim().is_empty() => value,
            _ => {
                missing.push(name.to_string());
                String::new()
            }
        };

        let host = get(ENV_BROKER_HOST);
        let port = get(ENV_BROKER_PORT);
        let username = get(ENV_BROKER_USER);
        let password = get(ENV_BROKER_PWD);
        let topic = get(ENV_BROKER_TOPIC);

        if !missing.is_empty() {
            return Err(ConfigError::MissingEnvVars(missing));
        }

        Ok(Self {
            host: host.trim().to_string(),
            port: parse_port(&port)?,
            username,
            password,
            topic: topic.trim().to_string(),
        })
    }
}

impl PublisherConfig {
    /// Load the full configuration: broker variables through `lookup` plus tuning
    pub fn load<F>(lookup: F, tuning: TuningFile) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_parts(BrokerSection::from_lookup(lookup)?, tuning)
    }

    /// Assemble and validate a configuration from its parts
    pub fn from_parts(broker: BrokerSection, tuning: TuningFile) -> Result<Self, ConfigError> {
        let config = Self {
            broker,
            mqtt: tuning.mqtt,
            backoff: tuning.backoff,
            sensor: tuning.sensor,
            logging: tuning.logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Time between two successful publishes
    pub fn publish_interval(&self) -> Duration {
        PUBLISH_INTERVAL
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_topic(&self.broker.topic)?;

        if self.mqtt.keep_alive_secs < 5 {
            return Err(ConfigError::InvalidConfig(
                "mqtt.keep_alive_secs must be at least 5".to_string(),
            ));
        }
        if self.mqtt.connect_timeout_secs == 0 || self.mqtt.publish_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "mqtt timeouts must be greater than zero".to_string(),
            ));
        }

        let backoff = &self.backoff;
        if backoff.initial_ms == 0 || backoff.max_ms < backoff.initial_ms {
            return Err(ConfigError::InvalidConfig(format!(
                "backoff requires 0 < initial_ms <= max_ms, got initial_ms={} max_ms={}",
                backoff.initial_ms, backoff.max_ms
            )));
        }
        if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "backoff.multiplier must be >= 1.0, got {}",
                backoff.multiplier
            )));
        }
        if !(0.0..1.0).contains(&backoff.jitter) {
            return Err(ConfigError::InvalidConfig(format!(
                "backoff.jitter must be in [0.0, 1.0), got {}",
                backoff.jitter
            )));
        }

        if self.logging.max_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "logging.max_bytes must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self::from_parts(
            BrokerSection {
                host: "localhost".to_string(),
                port: 1883,
                username: "sensor".to_string(),
                password: "secret".to_string(),
                topic: "home/livingroom/shtc3".to_string(),
            },
            TuningFile::default(),
        )
        .expect("Test config should validate")
    }
}

fn parse_port(raw: &str) -> Result<u16, ConfigError> {
    match raw.trim().parse::<u16>() {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(raw.to_string())),
    }
}

/// Publish topics may not contain wildcards or be empty
fn validate_topic(topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() || topic.contains(['+', '#']) {
        return Err(ConfigError::InvalidConfig(format!(
            "{ENV_BROKER_TOPIC} '{topic}' must be a non-empty topic without wildcards"
        )));
    }
    Ok(())
}

fn redacted<S: Serializer>(_value: &str, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str("***")
}
