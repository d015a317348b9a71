//! Sensor access
//!
//! The publish loop only sees the [`SensorReader`] trait. The concrete SHTC3
//! driver lives in [`shtc3`] and is only built with the `hardware` feature.

use crate::reading::Measurement;
use thiserror::Error;

#[cfg(feature = "hardware")]
pub mod shtc3;

#[cfg(feature = "hardware")]
pub use shtc3::Shtc3Sensor;

/// Synchronous access to a temperature/humidity sensor
///
/// `read` blocks for the duration of one bus transaction.
pub trait SensorReader: Send {
    /// Human readable device name for logs
    fn name(&self) -> &str;

    /// Take one measurement
    fn read(&mut self) -> Result<Measurement, SensorError>;
}

impl<T: SensorReader + ?Sized> SensorReader for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn read(&mut self) -> Result<Measurement, SensorError> {
        (**self).read()
    }
}

/// Sensor failures
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Failed to open sensor bus {device}")]
    BusOpen {
        device: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Sensor {device} did not respond: {message}")]
    Unresponsive { device: String, message: String },
    #[error("Sensor {device} returned a non-finite value (temperature={temperature}, humidity={humidity})")]
    InvalidValue {
        device: String,
        temperature: f64,
        humidity: f64,
    },
}

/// Reject measurements that cannot be published as JSON numbers
pub fn validate_measurement(device: &str, measurement: Measurement) -> Result<Measurement, SensorError> {
    if measurement.is_finite() {
        Ok(measurement)
    } else {
        Err(SensorError::InvalidValue {
            device: device.to_string(),
            temperature: measurement.temperature,
            humidity: measurement.humidity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSensor(Measurement);

    impl SensorReader for FixedSensor {
        fn name(&self) -> &str {
            "fixed"
        }

        fn read(&mut self) -> Result<Measurement, SensorError> {
            validate_measurement(self.name(), self.0)
        }
    }

    #[test]
    fn test_boxed_reader_delegates() {
        let mut sensor: Box<dyn SensorReader> = Box::new(FixedSensor(Measurement::new(20.5, 41.0)));
        assert_eq!(sensor.name(), "fixed");
        assert_eq!(sensor.read().unwrap(), Measurement::new(20.5, 41.0));
    }

    #[test]
    fn test_non_finite_measurement_rejected() {
        let err = validate_measurement("shtc3", Measurement::new(f64::NAN, 41.0)).unwrap_err();
        assert!(matches!(err, SensorError::InvalidValue { .. }));
        assert!(err.to_string().contains("shtc3"));
    }

    #[test]
    fn test_sensor_error_display() {
        let errors = vec![
            SensorError::BusOpen {
                device: "/dev/i2c-1".to_string(),
                source: "permission denied".into(),
            },
            SensorError::Unresponsive {
                device: "/dev/i2c-1".to_string(),
                message: "NACK".to_string(),
            },
        ];

        for error in errors {
            assert!(error.to_string().contains("/dev/i2c-1"));
        }
    }
}
