//! Error type for one publish cycle
//!
//! Every failure inside a cycle converts into [`PublisherError`] so the loop
//! can catch it at the iteration boundary, log the whole source chain and
//! carry on.

use crate::sensor::SensorError;
use crate::transport::{ConnectionError, PublishError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("sensor read failed")]
    Sensor(#[from] SensorError),

    #[error("broker connection failed")]
    Connection(#[from] ConnectionError),

    #[error("publish failed")]
    Publish(#[from] PublishError),

    #[error("reading could not be serialized")]
    Serialization(#[from] serde_json::Error),
}

impl PublisherError {
    /// Error taxonomy name used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            PublisherError::Sensor(_) => "SensorError",
            PublisherError::Connection(_) => "ConnectionError",
            PublisherError::Publish(_) => "PublishError",
            PublisherError::Serialization(_) => "SerializationError",
        }
    }
}

/// Result type for publisher operations
pub type PublisherResult<T> = Result<T, PublisherError>;

/// Render an error and all of its sources as `outer: inner: root`
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
