//! Periodic publishing of sensor readings
//!
//! [`PublishLoop`] drives the [`LoopState`] machine: connect, read, publish,
//! sleep for the fixed interval, and back off after failures.

pub mod backoff;
pub mod publish_loop;
pub mod state;

pub use backoff::Backoff;
pub use publish_loop::{interruptible_sleep, wait_for_shutdown, LoopStats, PublishLoop};
pub use state::{LoopEvent, LoopState};
