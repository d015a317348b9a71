//! SHTC3 over Linux I2C
//!
//! The chip idles in sleep mode. Each read wakes it, runs one normal-power
//! measurement and puts it back to sleep.

use super::{validate_measurement, SensorError, SensorReader};
use crate::reading::Measurement;
use linux_embedded_hal::{Delay, I2cdev};
use shtcx::sensor_class::Sht2Gen;
use shtcx::{LowPower, PowerMode, ShtCx};
use std::path::Path;
use tracing::{debug, info};

pub struct Shtc3Sensor {
    driver: ShtCx<Sht2Gen, I2cdev>,
    delay: Delay,
    device: String,
}

impl Shtc3Sensor {
    /// Open the I2C bus and probe the sensor
    pub fn open(device: &Path) -> Result<Self, SensorError> {
        let label = device.display().to_string();
        let bus = I2cdev::new(device).map_err(|e| SensorError::BusOpen {
            device: label.clone(),
            source: Box::new(e),
        })?;

        let mut sensor = Self {
            driver: shtcx::shtc3(bus),
            delay: Delay,
            device: label,
        };

        sensor.wakeup()?;
        let id = sensor
            .driver
            .device_identifier()
            .map_err(|e| sensor.unresponsive(e))?;
        sensor.sleep();
        info!(device = %sensor.device, "SHTC3 found, device id {:#04x}", id);

        Ok(sensor)
    }

    fn wakeup(&mut self) -> Result<(), SensorError> {
        let Self { driver, delay, .. } = &mut *self;
        driver.wakeup(delay).map_err(|e| self.unresponsive(e))
    }

    fn sleep(&mut self) {
        // A failed sleep only costs power; the next wakeup recovers the chip.
        if let Err(e) = self.driver.sleep() {
            debug!(device = %self.device, "SHTC3 sleep command failed: {:?}", e);
        }
    }

    fn unresponsive<E: std::fmt::Debug>(&self, error: E) -> SensorError {
        SensorError::Unresponsive {
            device: self.device.clone(),
            message: format!("{error:?}"),
        }
    }
}

impl SensorReader for Shtc3Sensor {
    fn name(&self) -> &str {
        &self.device
    }

    fn read(&mut self) -> Result<Measurement, SensorError> {
        self.wakeup()?;
        let Self { driver, delay, .. } = &mut *self;
        let result = driver.measure(PowerMode::NormalMode, delay);
        self.sleep();

        let raw = result.map_err(|e| self.unresponsive(e))?;
        let measurement = Measurement::new(
            f64::from(raw.temperature.as_degrees_celsius()),
            f64::from(raw.humidity.as_percent()),
        );
        debug!(
            device = %self.device,
            temperature = measurement.temperature,
            humidity = measurement.humidity,
            "SHTC3 measurement"
        );
        validate_measurement(&self.device, measurement)
    }
}
