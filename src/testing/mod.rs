//! Testing utilities and mock implementations
//!
//! Mocks for the sensor and the broker plus an in-memory log sink, so the
//! publish loop can be tested without hardware or a running MQTT broker.

pub mod log_capture;
pub mod mocks;

pub use log_capture::{capture_logs, CapturedLogs};
pub use mocks::*;
